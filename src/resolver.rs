use std::net::IpAddr;

use async_trait::async_trait;

/// Reverse-lookup failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The lookup was cancelled; the engine must not act on it.
    #[error("lookup cancelled")]
    Cancelled,
    /// The resolver failed or the address has no name.
    #[error("{0}")]
    Failed(String),
}

/// The system name resolver.
///
/// Only reverse lookups are consumed, as the last rung of the hostname
/// precedence ladder. Cancellation is handled by the engine (it aborts the
/// task driving the future), but resolvers that cancel internally may also
/// report [`LookupError::Cancelled`], which the engine ignores.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `addr` back to a hostname.
    ///
    /// # Errors
    /// Returns [`LookupError::Failed`] when the address has no usable name.
    async fn lookup_by_address(&self, addr: IpAddr) -> Result<String, LookupError>;
}
