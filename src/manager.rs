use std::sync::Arc;

use crate::common::ObjectPath;
use crate::error::Result;
use crate::model::{ActiveConnection, Device, SettingsConnection};
use crate::types::{ActivationType, AuthSubject, DeviceStateReason};

/// Parameters of one activation request handed to the manager.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    /// The profile to bring up.
    pub connection: Arc<SettingsConnection>,
    /// The device to bring it up on; empty for VPN re-activations where the
    /// manager picks the parent itself.
    pub device: Option<Arc<Device>>,
    /// Opaque hint identifying e.g. the specific access point, or the base
    /// session a secondary activation belongs to.
    pub specific_object: Option<ObjectPath>,
    /// Principal the activation runs as.
    pub subject: AuthSubject,
    /// Whether to configure the link from scratch or adopt it as-is.
    pub activation_type: ActivationType,
}

/// The connection manager, owner of the device and active-session
/// inventories.
///
/// The engine is a pure consumer of this interface: it reads the inventories
/// and global flags, and requests activations and deactivations. Inventory
/// changes are delivered separately as [`Event`](crate::policy::Event)s.
pub trait Manager: Send + Sync {
    /// All devices currently known to the manager.
    fn devices(&self) -> Vec<Arc<Device>>;

    /// All active sessions, in creation order.
    fn active_connections(&self) -> Vec<Arc<ActiveConnection>>;

    /// Whether the system is suspended or about to suspend.
    fn sleeping(&self) -> bool;

    /// Whether networking is administratively enabled.
    fn networking_enabled(&self) -> bool;

    /// The administrator-configured hostname, if any.
    fn hostname(&self) -> Option<String>;

    /// Profiles eligible for activation right now (visible to some session
    /// and not filtered by permission checks).
    fn activatable_connections(&self) -> Vec<Arc<SettingsConnection>>;

    /// The device `connection` is already active on, if any.
    fn device_for_connection(&self, connection: &Arc<SettingsConnection>) -> Option<Arc<Device>>;

    /// Starts activating a connection, returning the new session.
    ///
    /// # Errors
    /// Returns [`PolicyError::ActivationFailed`](crate::PolicyError) when the
    /// request is refused; the engine logs and forgets such refusals.
    fn activate_connection(&self, request: ActivationRequest) -> Result<Arc<ActiveConnection>>;

    /// Tears down the session exported at `path`.
    ///
    /// # Errors
    /// Returns [`PolicyError::DeactivationFailed`](crate::PolicyError) when
    /// the session is unknown or refuses to stop.
    fn deactivate_connection(&self, path: &ObjectPath, reason: DeviceStateReason) -> Result<()>;
}
