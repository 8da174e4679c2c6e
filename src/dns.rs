use std::sync::Arc;

use crate::model::{Ip4Config, Ip6Config};
use crate::types::DnsIpConfigType;

/// The DNS manager, owner of the resolver configuration.
///
/// All engine-driven mutations happen between [`DnsManager::begin_updates`]
/// and [`DnsManager::end_updates`], tagged by the calling handler so the DNS
/// manager can batch writes. Brackets nest: handlers bracket their own work
/// and shared helpers bracket again inside.
///
/// Failures stay inside the DNS manager; none of these operations report
/// errors back to the engine.
pub trait DnsManager: Send + Sync {
    /// Opens an update bracket tagged with the caller's name.
    fn begin_updates(&self, tag: &str);

    /// Closes the update bracket opened with the same tag.
    fn end_updates(&self, tag: &str);

    /// Adds (or re-ranks) an IPv4 configuration for `ip_iface`.
    fn add_ip4_config(&self, ip_iface: &str, config: &Arc<Ip4Config>, config_type: DnsIpConfigType);

    /// Drops a previously added IPv4 configuration.
    fn remove_ip4_config(&self, config: &Arc<Ip4Config>);

    /// Adds (or re-ranks) an IPv6 configuration for `ip_iface`.
    fn add_ip6_config(&self, ip_iface: &str, config: &Arc<Ip6Config>, config_type: DnsIpConfigType);

    /// Drops a previously added IPv6 configuration.
    fn remove_ip6_config(&self, config: &Arc<Ip6Config>);

    /// Publishes the hostname the engine decided on, so a domain part can
    /// join the search list.
    fn set_hostname(&self, hostname: Option<&str>);

    /// Records the hostname present before the engine ever changed it.
    fn set_initial_hostname(&self, hostname: Option<&str>);
}
