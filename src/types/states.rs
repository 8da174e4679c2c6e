//! State machines observed by the policy engine.

/// Device-specific states.
///
/// The discriminants keep the wire spacing of the D-Bus interface so that
/// range comparisons ("was the device in the active range?") read the same
/// as they do elsewhere in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
    /// The device's state is unknown.
    Unknown = 0,
    /// The device is recognized, but not managed by the daemon.
    Unmanaged = 10,
    /// The device is managed, but not available for use (no carrier,
    /// missing firmware, radio switched off, ...).
    Unavailable = 20,
    /// The device can be activated, but is currently idle.
    Disconnected = 30,
    /// The device is preparing the connection to the network.
    Prepare = 40,
    /// The device is connecting to the requested network.
    Config = 50,
    /// The device requires more information (secrets) to continue.
    NeedAuth = 60,
    /// The device is requesting addresses and routing information.
    IpConfig = 70,
    /// The device is checking whether further action is required.
    IpCheck = 80,
    /// The device is waiting for secondary connections (like a VPN) which
    /// must be activated before the device itself counts as activated.
    Secondaries = 90,
    /// The device has a network connection.
    Activated = 100,
    /// A disconnection was requested and the device is cleaning up.
    Deactivating = 110,
    /// The device failed to connect and is cleaning up.
    Failed = 120,
}

/// Device state change reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStateReason {
    /// No reason given.
    None,
    /// Unknown error.
    Unknown,
    /// Device is now managed.
    NowManaged,
    /// Device is now unmanaged.
    NowUnmanaged,
    /// The device could not be readied for configuration.
    ConfigFailed,
    /// IP configuration could not be reserved.
    IpConfigUnavailable,
    /// Secrets were required, but not provided.
    NoSecrets,
    /// DHCP client failed.
    DhcpFailed,
    /// The device was removed.
    Removed,
    /// The daemon went to sleep.
    Sleeping,
    /// The device's connection was removed from settings.
    ConnectionRemoved,
    /// Device disconnected by user or client.
    UserRequested,
    /// Carrier/link changed.
    Carrier,
    /// The device's existing connection was assumed.
    ConnectionAssumed,
    /// A dependency of the connection failed.
    DependencyFailed,
    /// A secondary connection of the base connection failed.
    SecondaryConnectionFailed,
    /// New connection activation was enqueued.
    NewActivation,
}

/// States of an active connection while it is starting, connected, or
/// disconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActiveConnectionState {
    /// The state of the connection is unknown.
    Unknown = 0,
    /// A network connection is being prepared.
    Activating = 1,
    /// There is a connection to the network.
    Activated = 2,
    /// The network connection is being torn down.
    Deactivating = 3,
    /// The network connection is disconnected and will be removed.
    Deactivated = 4,
}

/// VPN connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VpnConnectionState {
    /// The state of the VPN connection is unknown.
    Unknown = 0,
    /// The VPN connection is preparing to connect.
    Prepare = 1,
    /// The VPN connection needs authorization credentials.
    NeedAuth = 2,
    /// The VPN connection is being established.
    Connect = 3,
    /// The VPN connection is getting an IP address.
    IpConfigGet = 4,
    /// The VPN connection is active.
    Activated = 5,
    /// The VPN connection failed.
    Failed = 6,
    /// The VPN connection is disconnected.
    Disconnected = 7,
}

/// VPN state change reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpnConnectionStateReason {
    /// The reason for the state change is unknown.
    Unknown,
    /// No reason was given.
    None,
    /// The user disconnected the VPN.
    UserDisconnected,
    /// The underlying device was disconnected.
    DeviceDisconnected,
    /// The service providing the VPN stopped.
    ServiceStopped,
    /// The IP config of the VPN was invalid.
    IpConfigInvalid,
    /// The connection attempt timed out.
    ConnectTimeout,
    /// Starting the VPN service timed out.
    ServiceStartTimeout,
    /// Starting the VPN service failed.
    ServiceStartFailed,
    /// Necessary secrets were not provided.
    NoSecrets,
    /// Authentication to the server failed.
    LoginFailed,
    /// The connection was deleted from settings.
    ConnectionRemoved,
}
