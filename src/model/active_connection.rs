use std::sync::Arc;

use crate::common::{ObjectPath, Property, Uuid};
use crate::model::device::Device;
use crate::model::ip_config::{Ip4Config, Ip6Config};
use crate::model::settings_connection::SettingsConnection;
use crate::types::{ActiveConnectionState, AuthSubject};

/// A running instance of a connection profile, usually attached to a device.
///
/// Owned by the connection manager. The engine writes the `default4`/
/// `default6` flags during default selection and fills in `device` when
/// attributing a floating VPN session to its underlying device; everything
/// else it only reads.
#[derive(Debug)]
pub struct ActiveConnection {
    /// Exported path of this session; also its identity.
    pub object_path: ObjectPath,
    /// The profile this session was activated from.
    pub settings_connection: Arc<SettingsConnection>,
    /// Principal that requested the activation.
    pub subject: AuthSubject,
    /// Whether this session is a VPN.
    pub vpn: bool,
    /// UUID of the applied (possibly re-applied) profile snapshot. Starts
    /// out equal to the settings profile's UUID.
    pub applied_uuid: Property<Option<Uuid>>,
    /// Hint passed at activation time (e.g. the chosen access point).
    pub specific_object: Property<Option<ObjectPath>>,
    /// Session state.
    pub state: Property<ActiveConnectionState>,
    /// Device this session runs on. Empty for VPN sessions until default
    /// selection attributes them to the best underlying device.
    pub device: Property<Option<Arc<Device>>>,
    /// Whether this session currently owns the default IPv4 route.
    pub default4: Property<bool>,
    /// Whether this session currently owns the default IPv6 route.
    pub default6: Property<bool>,
    /// IPv4 configuration, once the session has one. For VPNs this is the
    /// tunnel configuration.
    pub ip4_config: Property<Option<Arc<Ip4Config>>>,
    /// IPv6 configuration, once the session has one.
    pub ip6_config: Property<Option<Arc<Ip6Config>>>,
    /// Tunnel interface name for VPN sessions.
    pub ip_iface: Property<Option<String>>,
}

impl ActiveConnection {
    /// Creates a session for `settings_connection` in the `Activating` state.
    pub fn new(
        object_path: impl Into<ObjectPath>,
        settings_connection: Arc<SettingsConnection>,
        subject: AuthSubject,
    ) -> Arc<Self> {
        let vpn = settings_connection.is_vpn();
        let applied = settings_connection.uuid.clone();
        Arc::new(Self {
            object_path: object_path.into(),
            settings_connection,
            subject,
            vpn,
            applied_uuid: Property::new(Some(applied)),
            specific_object: Property::new(None),
            state: Property::new(ActiveConnectionState::Activating),
            device: Property::new(None),
            default4: Property::new(false),
            default6: Property::new(false),
            ip4_config: Property::new(None),
            ip6_config: Property::new(None),
            ip_iface: Property::new(None),
        })
    }

    /// The profile name, for log messages.
    pub fn id(&self) -> String {
        self.settings_connection.id.clone()
    }

    /// The profile UUID.
    pub fn uuid(&self) -> Uuid {
        self.settings_connection.uuid.clone()
    }

    /// The interface traffic for this session flows through: the tunnel
    /// interface for VPNs, otherwise the attributed device's IP interface.
    pub fn ip_iface_or_device(&self) -> Option<String> {
        self.ip_iface
            .get()
            .or_else(|| self.device.get().map(|device| device.ip_iface()))
    }
}

impl PartialEq for ActiveConnection {
    fn eq(&self, other: &Self) -> bool {
        self.object_path == other.object_path
    }
}

impl Eq for ActiveConnection {}
