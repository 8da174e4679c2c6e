use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::{ObjectPath, Property, Uuid};
use crate::model::active_connection::ActiveConnection;
use crate::model::ip_config::{Dhcp4Config, Dhcp6Config, Ip4Config, Ip6Config};
use crate::model::settings_connection::SettingsConnection;
use crate::types::{DeviceState, DeviceStateReason, DeviceType};

bitflags! {
    /// Kernel interface flags the engine cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LinkFlags: u32 {
        /// Interface is administratively up.
        const UP = 0x1;
        /// Interface has carrier.
        const RUNNING = 0x2;
    }
}

/// Snapshot of the kernel link behind a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    /// ifindex of the controlling master, if the link is enslaved.
    pub master: Option<u32>,
    /// Current interface flags.
    pub flags: LinkFlags,
}

/// Operations the engine requests from the device subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Re-apply the (user-edited) settings profile without a reactivation.
    ReapplySettings,
    /// Re-assert the device's firewall zone membership.
    UpdateFirewallZone,
}

/// A network device tracked by the device inventory.
///
/// The inventory owns the cells and keeps them current; the engine reads
/// them, requests state transitions through [`Device::queue_state`], and
/// sends the remaining operations down the command channel handed out by
/// [`Device::new`].
#[derive(Debug)]
pub struct Device {
    /// Exported path of this device; also its identity.
    pub object_path: ObjectPath,
    /// Control interface name.
    pub interface: String,
    /// Data interface name, when it differs from `interface` (e.g. PPP).
    pub ip_interface: Property<Option<String>>,
    /// The general type of the device.
    pub device_type: DeviceType,
    /// Current state.
    pub state: Property<DeviceState>,
    /// Whether the device is allowed to auto-activate connections.
    pub autoconnect: Property<bool>,
    /// Whether the device's radio/medium is enabled.
    pub enabled: Property<bool>,
    /// Current IPv4 configuration.
    pub ip4_config: Property<Option<Arc<Ip4Config>>>,
    /// Current IPv6 configuration.
    pub ip6_config: Property<Option<Arc<Ip6Config>>>,
    /// Options from the most recent DHCPv4 lease.
    pub dhcp4_config: Property<Option<Arc<Dhcp4Config>>>,
    /// Options from the most recent DHCPv6 lease.
    pub dhcp6_config: Property<Option<Arc<Dhcp6Config>>>,
    /// The activation request currently owning this device.
    pub act_request: Property<Option<Arc<ActiveConnection>>>,
    /// UUIDs of profiles currently available through this device.
    pub available_connections: Property<Vec<Uuid>>,
    /// Kernel link state, absent once the link is gone.
    pub link: Property<Option<LinkState>>,
    /// State transition the engine asked for; the inventory consumes it and
    /// re-emits the resulting state change.
    pub queued_state: Property<Option<(DeviceState, DeviceStateReason)>>,

    connection_uuid_to_assume: Mutex<Option<Uuid>>,
    specific_objects: Mutex<HashMap<Uuid, ObjectPath>>,
    pending_actions: Mutex<BTreeSet<String>>,
    commands: mpsc::UnboundedSender<DeviceCommand>,
}

impl Device {
    /// Creates a device handle plus the command receiver the device
    /// subsystem drains.
    pub fn new(
        object_path: impl Into<ObjectPath>,
        interface: impl Into<String>,
        device_type: DeviceType,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DeviceCommand>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let device = Arc::new(Self {
            object_path: object_path.into(),
            interface: interface.into(),
            ip_interface: Property::new(None),
            device_type,
            state: Property::new(DeviceState::Unmanaged),
            autoconnect: Property::new(true),
            enabled: Property::new(true),
            ip4_config: Property::new(None),
            ip6_config: Property::new(None),
            dhcp4_config: Property::new(None),
            dhcp6_config: Property::new(None),
            act_request: Property::new(None),
            available_connections: Property::new(Vec::new()),
            link: Property::new(None),
            queued_state: Property::new(None),
            connection_uuid_to_assume: Mutex::new(None),
            specific_objects: Mutex::new(HashMap::new()),
            pending_actions: Mutex::new(BTreeSet::new()),
            commands,
        });
        (device, command_rx)
    }

    /// The interface traffic flows through: the data interface when set,
    /// the control interface otherwise.
    pub fn ip_iface(&self) -> String {
        self.ip_interface
            .get()
            .filter(|iface| !iface.is_empty())
            .unwrap_or_else(|| self.interface.clone())
    }

    /// Whether the device is created and destroyed by the daemon rather than
    /// existing as hardware.
    pub fn is_software(&self) -> bool {
        self.device_type.is_software()
    }

    /// Whether the device is between starting an activation and finishing it.
    pub fn is_activating(&self) -> bool {
        let state = self.state.get();
        state >= DeviceState::Prepare && state <= DeviceState::Secondaries
    }

    /// Whether auto-activation may currently be considered for this device.
    pub fn autoconnect_allowed(&self) -> bool {
        self.autoconnect.get() && self.state.get() >= DeviceState::Disconnected
    }

    /// Whether a profile of `connection`'s type can run on this device.
    pub fn compatible_with(&self, connection: &SettingsConnection) -> bool {
        connection.connection_type.matches_device(self.device_type)
    }

    /// Whether `connection` is compatible and currently offered by this
    /// device.
    pub fn available_for(&self, connection: &SettingsConnection) -> bool {
        self.compatible_with(connection)
            && self
                .available_connections
                .get()
                .iter()
                .any(|uuid| *uuid == connection.uuid)
    }

    /// Whether the device would accept `connection` for auto-activation.
    ///
    /// `None` means refused. `Some(hint)` means accepted, with an optional
    /// specific object (e.g. the access point to join) to pass along with
    /// the activation request.
    pub fn can_auto_connect(&self, connection: &SettingsConnection) -> Option<Option<ObjectPath>> {
        if !self.autoconnect.get() {
            return None;
        }
        if self.state.get() != DeviceState::Disconnected {
            return None;
        }
        if !self.available_for(connection) {
            return None;
        }
        let hints = self.specific_objects.lock().ok()?;
        Some(hints.get(&connection.uuid).cloned())
    }

    /// Publishes a specific-object hint for auto-activating `uuid` on this
    /// device.
    pub fn set_specific_object_hint(&self, uuid: impl Into<Uuid>, path: impl Into<ObjectPath>) {
        if let Ok(mut hints) = self.specific_objects.lock() {
            hints.insert(uuid.into(), path.into());
        }
    }

    /// Stores the UUID of a connection this device should adopt rather than
    /// re-activate. Consumed by [`Device::take_connection_uuid_to_assume`].
    pub fn set_connection_uuid_to_assume(&self, uuid: impl Into<Uuid>) {
        if let Ok(mut hint) = self.connection_uuid_to_assume.lock() {
            *hint = Some(uuid.into());
        }
    }

    /// Moves the assume hint out of the device. Reading clears it, so a
    /// failed assumption is not retried forever.
    pub fn take_connection_uuid_to_assume(&self) -> Option<Uuid> {
        self.connection_uuid_to_assume.lock().ok()?.take()
    }

    /// Requests a state transition from the device subsystem.
    pub fn queue_state(&self, state: DeviceState, reason: DeviceStateReason) {
        self.queued_state.set(Some((state, reason)));
    }

    /// Takes a named pending-action slot, visible to observers wondering why
    /// the device is busy.
    pub fn add_pending_action(&self, action: &str) {
        if let Ok(mut actions) = self.pending_actions.lock()
            && !actions.insert(action.to_string())
        {
            debug!("pending action '{action}' already present on {}", self.interface);
        }
    }

    /// Releases a pending-action slot.
    pub fn remove_pending_action(&self, action: &str) {
        if let Ok(mut actions) = self.pending_actions.lock()
            && !actions.remove(action)
        {
            debug!("pending action '{action}' not present on {}", self.interface);
        }
    }

    /// Whether the named pending-action slot is held.
    pub fn has_pending_action(&self, action: &str) -> bool {
        self.pending_actions
            .lock()
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }

    /// Asks the device subsystem to re-apply edited settings in place.
    pub fn reapply_settings_immediately(&self) {
        let _ = self.commands.send(DeviceCommand::ReapplySettings);
    }

    /// Asks the device subsystem to re-assert firewall zone membership.
    pub fn update_firewall_zone(&self) {
        let _ = self.commands.send(DeviceCommand::UpdateFirewallZone);
    }

    /// The settings profile behind the current activation request, if any.
    pub fn settings_connection(&self) -> Option<Arc<SettingsConnection>> {
        self.act_request
            .get()
            .map(|request| request.settings_connection.clone())
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.object_path == other.object_path
    }
}

impl Eq for Device {}
