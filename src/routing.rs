use std::sync::Arc;

use crate::model::{ActiveConnection, Device, Ip4Config, Ip6Config};

/// The best IPv4 configuration for default routing and DNS, as reported by
/// the default-route manager.
///
/// `device` can be empty while `vpn` is set: an IPv4 VPN may be tunneled
/// over an IPv6-only device.
#[derive(Debug, Clone)]
pub struct BestIp4Config {
    /// The winning configuration.
    pub config: Arc<Ip4Config>,
    /// Interface the configuration applies to.
    pub ip_iface: String,
    /// The session that owns the configuration.
    pub active: Arc<ActiveConnection>,
    /// The best device for the family, when one exists.
    pub device: Option<Arc<Device>>,
    /// The VPN session supplying the configuration, when one does.
    pub vpn: Option<Arc<ActiveConnection>>,
}

/// The best IPv6 configuration for default routing and DNS.
#[derive(Debug, Clone)]
pub struct BestIp6Config {
    /// The winning configuration.
    pub config: Arc<Ip6Config>,
    /// Interface the configuration applies to.
    pub ip_iface: String,
    /// The session that owns the configuration.
    pub active: Arc<ActiveConnection>,
    /// The best device for the family, when one exists.
    pub device: Option<Arc<Device>>,
    /// The VPN session supplying the configuration, when one does.
    pub vpn: Option<Arc<ActiveConnection>>,
}

/// The default-route manager: ranks devices and configurations per address
/// family. The engine treats its answers as authoritative and only layers
/// the default-flag bookkeeping and VPN attribution on top.
pub trait DefaultRouteManager: Send + Sync {
    /// The best IPv4 device among `devices`. With `fully_activated` only
    /// activated devices are considered; otherwise activating devices
    /// compete too. `preferred` supplies hysteresis: the current default
    /// wins ties.
    fn best_ip4_device(
        &self,
        devices: &[Arc<Device>],
        fully_activated: bool,
        preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>>;

    /// The best IPv6 device among `devices`.
    fn best_ip6_device(
        &self,
        devices: &[Arc<Device>],
        fully_activated: bool,
        preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>>;

    /// The best IPv4 configuration overall, VPNs included.
    fn best_ip4_config(&self, ignore_never_default: bool) -> Option<BestIp4Config>;

    /// The best IPv6 configuration overall, VPNs included.
    fn best_ip6_config(&self, ignore_never_default: bool) -> Option<BestIp6Config>;
}
