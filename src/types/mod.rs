/// Device, connection and VPN state machines.
pub mod states;

pub use states::{
    ActiveConnectionState, DeviceState, DeviceStateReason, VpnConnectionState,
    VpnConnectionStateReason,
};

/// How the manager should bring a connection up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    /// Configure the link from scratch.
    Full,
    /// Adopt an already-configured link without touching it.
    Assume,
}

/// The principal on whose behalf an activation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSubject {
    /// The daemon itself (auto-activation, internal bookkeeping).
    Internal,
    /// A local user identified by uid.
    Unix(u32),
}

impl AuthSubject {
    /// Whether this subject is the daemon itself rather than a user request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

/// How an IP configuration handed to the DNS manager should be ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsIpConfigType {
    /// Configuration of an activated device, not currently preferred.
    Default,
    /// Configuration of the best device for its address family.
    BestDevice,
    /// Configuration sourced from a VPN, preferred over any device.
    Vpn,
}

/// The general type of a network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// Wired ethernet interface.
    Ethernet,
    /// 802.11 Wi-Fi interface.
    Wifi,
    /// Software bridge.
    Bridge,
    /// Bonding master.
    Bond,
    /// 802.1Q VLAN interface.
    Vlan,
    /// Userspace tunnel interface.
    Tun,
    /// Dummy interface.
    Dummy,
}

impl DeviceType {
    /// Software devices are created and destroyed by the daemon; hardware
    /// devices exist independently of it. The distinction matters when
    /// blocking autoconnect, since a software device's own flags die with it.
    pub fn is_software(self) -> bool {
        matches!(
            self,
            Self::Bridge | Self::Bond | Self::Vlan | Self::Tun | Self::Dummy
        )
    }
}

/// The type of a connection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Wired ethernet profile.
    Ethernet,
    /// Wi-Fi profile.
    Wifi,
    /// Bridge master profile.
    Bridge,
    /// Bond master profile.
    Bond,
    /// VLAN profile.
    Vlan,
    /// Tunnel profile.
    Tun,
    /// VPN profile. Never directly compatible with a device; VPNs attach to
    /// an underlying active connection instead.
    Vpn,
}

impl ConnectionType {
    /// Whether a profile of this type can be activated on `device`.
    pub fn matches_device(self, device: DeviceType) -> bool {
        match self {
            Self::Ethernet => device == DeviceType::Ethernet,
            Self::Wifi => device == DeviceType::Wifi,
            Self::Bridge => device == DeviceType::Bridge,
            Self::Bond => device == DeviceType::Bond,
            Self::Vlan => device == DeviceType::Vlan,
            Self::Tun => device == DeviceType::Tun,
            Self::Vpn => false,
        }
    }
}
