use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::model::{ActiveConnection, Device, Ip4Config, Ip6Config, SettingsConnection};
use crate::resolver::LookupError;
use crate::types::{
    DeviceState, DeviceStateReason, VpnConnectionState, VpnConnectionStateReason,
};

/// Everything the policy engine reacts to, as one tagged variant per source.
///
/// Subsystems update their model cells first and emit the event second, so a
/// handler always observes the source's own bookkeeping as already applied.
/// Events referencing a device the engine was never told about via
/// [`Event::DeviceAdded`] are ignored.
#[derive(Debug)]
pub enum Event {
    /// A device joined the inventory.
    DeviceAdded {
        /// The new device.
        device: Arc<Device>,
    },
    /// A device left the inventory.
    DeviceRemoved {
        /// The departing device.
        device: Arc<Device>,
    },
    /// A device's state machine moved.
    DeviceStateChanged {
        /// The device that changed.
        device: Arc<Device>,
        /// State entered.
        new_state: DeviceState,
        /// State left.
        old_state: DeviceState,
        /// Why the transition happened.
        reason: DeviceStateReason,
    },
    /// A device's IPv4 configuration was replaced.
    DeviceIp4ConfigChanged {
        /// The device that changed.
        device: Arc<Device>,
        /// The new configuration, if any.
        new: Option<Arc<Ip4Config>>,
        /// The previous configuration, if any.
        old: Option<Arc<Ip4Config>>,
    },
    /// A device's IPv6 configuration was replaced.
    DeviceIp6ConfigChanged {
        /// The device that changed.
        device: Arc<Device>,
        /// The new configuration, if any.
        new: Option<Arc<Ip6Config>>,
        /// The previous configuration, if any.
        old: Option<Arc<Ip6Config>>,
    },
    /// A device's autoconnect flag flipped.
    DeviceAutoconnectChanged {
        /// The device that changed.
        device: Arc<Device>,
    },
    /// A device asked for its auto-activation candidacy to be re-evaluated.
    DeviceRecheckAutoActivate {
        /// The requesting device.
        device: Arc<Device>,
    },
    /// The administrator-configured hostname changed.
    HostnameChanged,
    /// The manager's sleeping or networking-enabled flag flipped.
    SleepingChanged,
    /// A session joined the manager's active-connection list.
    ActiveConnectionAdded {
        /// The new session.
        active: Arc<ActiveConnection>,
    },
    /// A session left the manager's active-connection list.
    ActiveConnectionRemoved {
        /// The removed session.
        active: Arc<ActiveConnection>,
    },
    /// A session's state cell changed.
    ActiveConnectionStateChanged {
        /// The session that changed; read its current state from the model.
        active: Arc<ActiveConnection>,
    },
    /// A VPN session's internal state machine moved.
    VpnStateChanged {
        /// The VPN session.
        active: Arc<ActiveConnection>,
        /// State entered.
        new_state: VpnConnectionState,
        /// State left.
        old_state: VpnConnectionState,
        /// Why the transition happened.
        reason: VpnConnectionStateReason,
    },
    /// A VPN that had been connected wants to be brought up again.
    VpnRetryAfterFailure {
        /// The VPN session.
        active: Arc<ActiveConnection>,
    },
    /// A profile was added to the settings store.
    ConnectionAdded {
        /// The new profile.
        connection: Arc<SettingsConnection>,
    },
    /// A profile was updated.
    ConnectionUpdated {
        /// The updated profile.
        connection: Arc<SettingsConnection>,
        /// Whether a user edit caused the update.
        by_user: bool,
    },
    /// A profile was deleted from the settings store.
    ConnectionRemoved {
        /// The deleted profile.
        connection: Arc<SettingsConnection>,
    },
    /// A profile's visibility changed.
    ConnectionVisibilityChanged {
        /// The profile; read its visibility from the model.
        connection: Arc<SettingsConnection>,
    },
    /// A secret agent registered with the settings service.
    AgentRegistered,
    /// The firewall service (re)started.
    FirewallStarted,
    /// The DNS manager rewrote the resolver configuration.
    DnsConfigChanged,
    /// A reverse-DNS lookup started by the hostname controller finished.
    HostnameLookupFinished {
        /// The resolved name, or why there is none.
        result: Result<String, LookupError>,
    },
    /// The transient-hostname setter completed.
    TransientHostnameResult {
        /// The hostname that was pushed.
        name: String,
        /// Whether the hostname service applied it.
        applied: bool,
    },
}

/// Cloneable handle collaborator subsystems use to feed events to the
/// engine.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    /// Enqueues an event. Silently drops it when the engine has shut down.
    pub fn send(&self, event: Event) {
        if self.0.send(event).is_err() {
            debug!("policy event loop gone; dropping event");
        }
    }
}

/// Receiving half handed to [`Policy::run`](crate::Policy::run).
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Creates the event channel connecting collaborators to the engine.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}
