//! The hostname controller: the four-step precedence ladder, the transient
//! setter handshake and the reverse-DNS last resort.

use std::net::IpAddr;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use tracing::{debug, info, warn};

use crate::common::hostname::{FALLBACK_HOSTNAME, is_specific_hostname};
use crate::model::Device;
use crate::policy::events::Event;
use crate::resolver::LookupError;

use super::Policy;

impl Policy {
    /// Decides the system hostname.
    ///
    /// Precedence:
    /// 1. an administrator-configured hostname from settings
    /// 2. the DHCP-provided hostname of the best device (v4, then v6)
    /// 3. the hostname captured at startup
    /// 4. reverse DNS of the best device's first address
    ///
    /// `best4`/`best6` let callers that just elected defaults pass them in;
    /// otherwise the fully-activated best devices are looked up fresh.
    pub(super) fn update_system_hostname(
        &mut self,
        best4: Option<Arc<Device>>,
        best6: Option<Arc<Device>>,
    ) {
        self.cancel_lookup();

        if let Some(configured) = self.manager.hostname()
            && is_specific_hostname(&configured)
        {
            self.set_hostname(Some(&configured), "from system configuration");
            return;
        }

        let best4 = best4.or_else(|| self.best_ip4_device(true));
        let best6 = best6.or_else(|| self.best_ip6_device(true));

        if best4.is_none() && best6.is_none() {
            // No best device; fall back to the startup hostname, or the
            // localhost literal if there was none.
            let orig = self.orig_hostname.clone();
            self.set_hostname(orig.as_deref(), "no default device");
            return;
        }

        if let Some(best4) = &best4 {
            if let Some(dhcp) = best4.dhcp4_config.get()
                && let Some(dhcp_hostname) = dhcp.option("host_name")
                && !dhcp_hostname.is_empty()
            {
                let trimmed = dhcp_hostname.trim_start();
                if trimmed.is_empty() {
                    warn!(
                        target: "netpolicy::dns",
                        "DHCPv4-provided hostname '{dhcp_hostname}' looks invalid; ignoring it"
                    );
                } else {
                    self.set_hostname(Some(trimmed), "from DHCPv4");
                    return;
                }
            }
        } else if let Some(best6) = &best6
            && let Some(dhcp) = best6.dhcp6_config.get()
            && let Some(dhcp_hostname) = dhcp.option("host_name")
            && !dhcp_hostname.is_empty()
        {
            let trimmed = dhcp_hostname.trim_start();
            if trimmed.is_empty() {
                warn!(
                    target: "netpolicy::dns",
                    "DHCPv6-provided hostname '{dhcp_hostname}' looks invalid; ignoring it"
                );
            } else {
                self.set_hostname(Some(trimmed), "from DHCPv6");
                return;
            }
        }

        if let Some(orig) = self.orig_hostname.clone() {
            self.set_hostname(Some(&orig), "from system startup");
            return;
        }

        // Nothing configured, nothing from DHCP, nothing from startup.
        // Reverse-resolve the best device's first address.
        let addr4 = best4
            .and_then(|device| device.ip4_config.get())
            .and_then(|config| config.addresses.get().first().copied())
            .map(IpAddr::V4);
        let addr6 = best6
            .and_then(|device| device.ip6_config.get())
            .and_then(|config| config.addresses.get().first().copied())
            .map(IpAddr::V6);

        let Some(addr) = addr4.or(addr6) else {
            self.set_hostname(None, "no IP config");
            return;
        };

        self.lookup_addr = Some(addr);
        self.start_lookup(addr);
    }

    /// Applies a hostname decision: updates the engine's bookkeeping and the
    /// DNS search list, then pushes the effective name to the transient
    /// hostname setter unless the kernel already carries it.
    ///
    /// `new_hostname` may be empty-in-the-ladder (`None`); the effective name
    /// then becomes the localhost literal while `cur_hostname` stays `None`,
    /// recording that no source yielded a real name.
    pub(super) fn set_hostname(&mut self, new_hostname: Option<&str>, msg: &str) {
        // A hostname from a better source means the reverse lookup must not
        // be restarted later.
        if new_hostname.is_some() {
            self.lookup_addr = None;
        }

        if self.orig_hostname.is_some()
            && !self.hostname_changed
            && self.orig_hostname.as_deref() == new_hostname
        {
            // First attempt ever and the name is not actually changing;
            // leave everything untouched.
        } else if self.cur_hostname.as_deref() == new_hostname {
            // Not actually changing.
        } else {
            self.cur_hostname = new_hostname.map(str::to_owned);
            self.hostname_changed = true;

            // The DNS manager picks a domain part out of the hostname for
            // the search list.
            self.dns.set_hostname(self.cur_hostname.as_deref());
        }

        let name = match new_hostname {
            None => FALLBACK_HOSTNAME,
            Some("") => {
                debug_assert!(false, "empty hostname candidate");
                FALLBACK_HOSTNAME
            }
            Some(name) => name,
        };

        match self.system_hostname.get() {
            Err(err) => {
                warn!(
                    target: "netpolicy::dns",
                    "couldn't get the system hostname: {err}"
                );
            }
            Ok(old_hostname) => {
                if old_hostname == name {
                    return;
                }
            }
        }

        info!(
            target: "netpolicy::dns",
            "setting system hostname to '{name}' ({msg})"
        );

        let settings = Arc::clone(&self.settings);
        let events = self.events.clone();
        let name = name.to_owned();
        tokio::spawn(async move {
            let applied = settings.set_transient_hostname(&name).await;
            events.send(Event::TransientHostnameResult { name, applied });
        });
    }

    /// Completion of the transient-hostname setter. When the hostname
    /// service could not apply the name, fall back to setting the kernel
    /// hostname directly; announce the change to the dispatcher either way
    /// unless the fallback failed too.
    pub(super) fn transient_hostname_result(&mut self, name: &str, applied: bool) {
        let mut ok = true;

        if !applied && let Err(err) = self.system_hostname.set(name) {
            ok = false;
            warn!(
                target: "netpolicy::dns",
                "couldn't set the system hostname to '{name}': {err}"
            );
            if err.raw_os_error() == Some(libc::EPERM) {
                warn!(
                    target: "netpolicy::dns",
                    "you should use hostnamed when systemd hardening is in effect!"
                );
            }
        }

        if ok {
            self.dispatcher.call(crate::dispatcher::DispatcherAction::Hostname);
        }
    }

    /// Completion of a reverse-DNS lookup.
    pub(super) fn hostname_lookup_finished(&mut self, result: Result<String, LookupError>) {
        match result {
            Err(LookupError::Cancelled) => return,
            Ok(hostname) => self.set_hostname(Some(&hostname), "from address lookup"),
            Err(err) => {
                let msg = err.to_string();
                self.set_hostname(None, &msg);
            }
        }

        self.lookup_abort = None;
    }

    /// The DNS configuration was rewritten: a lookup answered by the old
    /// resolver configuration may be wrong, so restart any lookup still
    /// wanted.
    pub(super) fn dns_config_changed(&mut self) {
        self.cancel_lookup();

        if let Some(addr) = self.lookup_addr {
            debug!(
                target: "netpolicy::dns",
                "restarting reverse-lookup for address {addr}"
            );
            self.start_lookup(addr);
        }
    }

    /// Starts the one permitted in-flight reverse lookup for `addr`.
    fn start_lookup(&mut self, addr: IpAddr) {
        let (handle, registration) = AbortHandle::new_pair();
        self.lookup_abort = Some(handle);

        let resolver = Arc::clone(&self.resolver);
        let events = self.events.clone();
        let lookup = Abortable::new(
            async move {
                let result = resolver.lookup_by_address(addr).await;
                events.send(Event::HostnameLookupFinished { result });
            },
            registration,
        );
        tokio::spawn(lookup);
    }

    /// Aborts the in-flight lookup, if any. The aborted task never reports
    /// back, matching the "don't touch policy after cancellation" rule.
    pub(super) fn cancel_lookup(&mut self) {
        if let Some(handle) = self.lookup_abort.take() {
            handle.abort();
        }
    }
}
