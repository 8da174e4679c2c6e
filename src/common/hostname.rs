#![allow(unsafe_code)]

use std::io;

/// Hostname the engine falls back to when no source in the precedence ladder
/// yields a usable name.
pub const FALLBACK_HOSTNAME: &str = "localhost.localdomain";

const HOSTNAME_BUF_LEN: usize = 256;

/// Access to the kernel's notion of the system hostname.
///
/// The hostname controller reads the current kernel hostname to skip no-op
/// updates and writes it directly only when the settings layer's transient
/// hostname proxy reports that it could not apply the name.
pub trait SystemHostname: Send + Sync {
    /// Read the current kernel hostname.
    ///
    /// # Errors
    /// Returns the underlying `errno` as an [`io::Error`] when the syscall
    /// fails.
    fn get(&self) -> io::Result<String>;

    /// Set the kernel hostname.
    ///
    /// # Errors
    /// Returns the underlying `errno` as an [`io::Error`] when the syscall
    /// fails; `EPERM` is common under systemd hardening.
    fn set(&self, name: &str) -> io::Result<()>;
}

/// [`SystemHostname`] backed by the `gethostname`/`sethostname` syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelHostname;

impl SystemHostname for KernelHostname {
    fn get(&self) -> io::Result<String> {
        let mut buf = [0u8; HOSTNAME_BUF_LEN];
        let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len() - 1) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    fn set(&self, name: &str) -> io::Result<()> {
        let ret = unsafe { libc::sethostname(name.as_ptr().cast(), name.len()) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Whether `name` actually identifies this host, as opposed to being empty or
/// one of the generic localhost spellings various installers leave behind.
pub fn is_specific_hostname(name: &str) -> bool {
    !name.is_empty()
        && !matches!(
            name,
            "(none)" | "localhost" | "localhost6" | "localhost.localdomain" | "localhost6.localdomain6"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_names_are_not_specific() {
        for name in [
            "",
            "(none)",
            "localhost",
            "localhost6",
            "localhost.localdomain",
            "localhost6.localdomain6",
        ] {
            assert!(!is_specific_hostname(name), "{name:?}");
        }
    }

    #[test]
    fn real_names_are_specific() {
        assert!(is_specific_hostname("workstation"));
        assert!(is_specific_hostname("web42.corp.example.com"));
    }
}
