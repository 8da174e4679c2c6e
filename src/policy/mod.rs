//! The policy engine.
//!
//! A single [`Policy`] instance owns all cross-subsystem bookkeeping: the
//! default-device slots, the pending auto-activation queue, the
//! secondary-connection waits, the retry-reset timer and the hostname state.
//! Every external happening arrives as an [`Event`]; [`Policy::handle_event`]
//! is the only place engine state changes, which keeps transitions reviewable
//! in one place and lets tests replay event sequences against the reducer.
//!
//! The engine runs single-threaded with run-to-completion handlers. Deferred
//! work (the per-device activation checks and the activate-all scan) is
//! coalesced and drained by [`Policy::run_pending`] once the event queue is
//! empty; [`Policy::run`] wires the pieces together for production use.

mod activation;
mod events;
mod hostname;
mod retries;
mod routing;
mod secondaries;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

use crate::common::hostname::is_specific_hostname;
use crate::common::{ObjectPath, Property, SystemHostname};
use crate::dispatcher::Dispatcher;
use crate::dns::DnsManager;
use crate::manager::{ActivationRequest, Manager};
use crate::model::{ActiveConnection, Device, SettingsConnection};
use crate::resolver::Resolver;
use crate::routing::DefaultRouteManager;
use crate::settings::SettingsStore;
use crate::types::{
    ActivationType, ActiveConnectionState, DeviceState, DeviceStateReason, DnsIpConfigType,
    VpnConnectionState,
};

pub use events::{Event, EventReceiver, EventSender, event_channel};

use activation::ActivationCheck;
use secondaries::SecondaryWait;

/// The collaborators a [`Policy`] works against. All of them must outlive
/// the engine; the engine never takes ownership of the subsystems behind
/// them.
#[derive(Clone)]
pub struct PolicyDeps {
    /// The connection manager.
    pub manager: Arc<dyn Manager>,
    /// The settings store.
    pub settings: Arc<dyn SettingsStore>,
    /// The DNS manager.
    pub dns: Arc<dyn DnsManager>,
    /// The default-route manager.
    pub routes: Arc<dyn DefaultRouteManager>,
    /// The system name resolver.
    pub resolver: Arc<dyn Resolver>,
    /// The dispatcher script runner.
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Kernel hostname access.
    pub system_hostname: Arc<dyn SystemHostname>,
}

/// The network policy engine.
///
/// Construct with [`Policy::new`], feed it the [`EventSender`] half of
/// [`event_channel`], and either drive it with [`Policy::run`] or call
/// [`Policy::handle_event`] / [`Policy::run_pending`] directly.
pub struct Policy {
    manager: Arc<dyn Manager>,
    settings: Arc<dyn SettingsStore>,
    dns: Arc<dyn DnsManager>,
    routes: Arc<dyn DefaultRouteManager>,
    resolver: Arc<dyn Resolver>,
    dispatcher: Arc<dyn Dispatcher>,
    system_hostname: Arc<dyn SystemHostname>,
    events: EventSender,

    devices: HashMap<ObjectPath, Arc<Device>>,
    pending_activation_checks: Vec<ActivationCheck>,
    pending_secondaries: Vec<SecondaryWait>,
    activate_all_pending: bool,
    reset_retries_at: Option<Instant>,

    default4: Property<Option<Arc<Device>>>,
    default6: Property<Option<Arc<Device>>>,
    activating4: Property<Option<Arc<Device>>>,
    activating6: Property<Option<Arc<Device>>>,

    orig_hostname: Option<String>,
    cur_hostname: Option<String>,
    hostname_changed: bool,
    lookup_addr: Option<std::net::IpAddr>,
    lookup_abort: Option<AbortHandle>,
}

impl Policy {
    /// Creates an engine, capturing the kernel hostname as the startup
    /// fallback for the hostname precedence ladder.
    pub fn new(deps: PolicyDeps, events: EventSender) -> Self {
        let captured = deps
            .system_hostname
            .get()
            .ok()
            .filter(|name| is_specific_hostname(name));
        Self::with_startup_hostname(deps, events, captured)
    }

    /// Creates an engine with an explicit startup hostname instead of
    /// querying the kernel. `None` means the host had no usable name at
    /// startup.
    pub fn with_startup_hostname(
        deps: PolicyDeps,
        events: EventSender,
        orig_hostname: Option<String>,
    ) -> Self {
        deps.dns.set_initial_hostname(orig_hostname.as_deref());
        Self {
            manager: deps.manager,
            settings: deps.settings,
            dns: deps.dns,
            routes: deps.routes,
            resolver: deps.resolver,
            dispatcher: deps.dispatcher,
            system_hostname: deps.system_hostname,
            events,
            devices: HashMap::new(),
            pending_activation_checks: Vec::new(),
            pending_secondaries: Vec::new(),
            activate_all_pending: false,
            reset_retries_at: None,
            default4: Property::new(None),
            default6: Property::new(None),
            activating4: Property::new(None),
            activating6: Property::new(None),
            orig_hostname,
            cur_hostname: None,
            hostname_changed: false,
            lookup_addr: None,
            lookup_abort: None,
        }
    }

    /// The current default IPv4 device. Watch the property for change
    /// notifications.
    pub fn default_ip4_device(&self) -> &Property<Option<Arc<Device>>> {
        &self.default4
    }

    /// The current default IPv6 device.
    pub fn default_ip6_device(&self) -> &Property<Option<Arc<Device>>> {
        &self.default6
    }

    /// The device about to become the IPv4 default once activation
    /// completes.
    pub fn activating_ip4_device(&self) -> &Property<Option<Arc<Device>>> {
        &self.activating4
    }

    /// The device about to become the IPv6 default.
    pub fn activating_ip6_device(&self) -> &Property<Option<Arc<Device>>> {
        &self.activating6
    }

    /// When the retry-reset timer is due, if it is armed.
    pub fn reset_retries_at(&self) -> Option<Instant> {
        self.reset_retries_at
    }

    /// Drives the engine: applies every queued event, drains the coalesced
    /// idle work, and sleeps until the next event or the retry-reset timer.
    /// Returns when the event channel closes.
    #[instrument(name = "policy", skip_all)]
    pub async fn run(mut self, mut rx: EventReceiver) {
        loop {
            let deadline = self.reset_retries_at;
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(event) = maybe else { break };
                    self.handle_event(event);
                    while let Ok(event) = rx.try_recv() {
                        self.handle_event(event);
                    }
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.reset_connections_retries();
                }
            }
            self.run_pending();
        }
        self.shutdown();
    }

    /// Applies one event to the engine state.
    ///
    /// Handlers run to completion; anything deferred lands in the coalesced
    /// queues drained by [`Policy::run_pending`].
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::DeviceAdded { device } => self.device_added(device),
            Event::DeviceRemoved { device } => self.device_removed(&device),
            Event::DeviceStateChanged {
                device,
                new_state,
                old_state,
                reason,
            } => {
                if self.tracks(&device) {
                    self.device_state_changed(&device, new_state, old_state, reason);
                }
            }
            Event::DeviceIp4ConfigChanged { device, new, old } => {
                if self.tracks(&device) {
                    self.device_ip4_config_changed(&device, new.as_ref(), old.as_ref());
                }
            }
            Event::DeviceIp6ConfigChanged { device, new, old } => {
                if self.tracks(&device) {
                    self.device_ip6_config_changed(&device, new.as_ref(), old.as_ref());
                }
            }
            Event::DeviceAutoconnectChanged { device } => {
                if self.tracks(&device) && device.autoconnect_allowed() {
                    self.schedule_activate_check(&device);
                }
            }
            Event::DeviceRecheckAutoActivate { device } => {
                if self.tracks(&device) {
                    self.schedule_activate_check(&device);
                }
            }
            Event::HostnameChanged => self.update_system_hostname(None, None),
            Event::SleepingChanged => self.sleeping_changed(),
            Event::ActiveConnectionAdded { active } => {
                debug!(
                    target: "netpolicy::device",
                    "watching active connection '{}'", active.id()
                );
            }
            Event::ActiveConnectionRemoved { active } => {
                debug!(
                    target: "netpolicy::device",
                    "done watching active connection '{}'", active.id()
                );
            }
            Event::ActiveConnectionStateChanged { active } => {
                self.active_connection_state_changed(&active);
            }
            Event::VpnStateChanged {
                active,
                new_state,
                old_state,
                reason,
            } => self.vpn_state_changed(&active, new_state, old_state, reason),
            Event::VpnRetryAfterFailure { active } => self.vpn_retry_after_failure(&active),
            Event::ConnectionAdded { connection: _ } => self.schedule_activate_all(),
            Event::ConnectionUpdated {
                connection,
                by_user,
            } => self.connection_updated(&connection, by_user),
            Event::ConnectionRemoved { connection } => self.deactivate_if_active(&connection),
            Event::ConnectionVisibilityChanged { connection } => {
                if connection.visible.get() {
                    self.schedule_activate_all();
                } else {
                    self.deactivate_if_active(&connection);
                }
            }
            Event::AgentRegistered => self.secret_agent_registered(),
            Event::FirewallStarted => self.firewall_started(),
            Event::DnsConfigChanged => self.dns_config_changed(),
            Event::HostnameLookupFinished { result } => self.hostname_lookup_finished(result),
            Event::TransientHostnameResult { name, applied } => {
                self.transient_hostname_result(&name, applied);
            }
        }
    }

    /// Releases every resource the engine holds on its collaborators:
    /// pending-action slots, the in-flight lookup, the timers. [`Policy::run`]
    /// calls this when the event channel closes.
    pub fn shutdown(&mut self) {
        self.cancel_lookup();
        self.lookup_addr = None;
        for check in std::mem::take(&mut self.pending_activation_checks) {
            check
                .device
                .remove_pending_action(activation::PENDING_ACTION_AUTOACTIVATE);
        }
        self.pending_secondaries.clear();
        self.reset_retries_at = None;
        self.activate_all_pending = false;
        self.devices.clear();
    }

    fn tracks(&self, device: &Arc<Device>) -> bool {
        self.devices.contains_key(&device.object_path)
    }

    fn device_added(&mut self, device: Arc<Device>) {
        if self
            .devices
            .insert(device.object_path.clone(), device.clone())
            .is_some()
        {
            warn!(
                target: "netpolicy::core",
                "device {} added twice", device.interface
            );
        }
    }

    fn device_removed(&mut self, device: &Arc<Device>) {
        self.clear_pending_activate_check(device);
        self.devices.remove(&device.object_path);

        // Routing and DNS were already recomputed when the device hit
        // UNMANAGED on its way out.
    }

    #[allow(clippy::too_many_lines)]
    fn device_state_changed(
        &mut self,
        device: &Arc<Device>,
        new_state: DeviceState,
        old_state: DeviceState,
        reason: DeviceStateReason,
    ) {
        let connection = device.settings_connection();
        let ip_iface = device.ip_iface();

        match new_state {
            DeviceState::Failed => {
                // A connection that failed during activation must not be
                // re-chosen over and over; account the failure.
                if let Some(connection) = &connection
                    && old_state >= DeviceState::Prepare
                    && old_state <= DeviceState::Activated
                {
                    let tries = connection.autoconnect_retries();

                    if reason == DeviceStateReason::NoSecrets {
                        debug!(
                            target: "netpolicy::device",
                            "connection '{}' now blocked from autoconnect due to no secrets",
                            connection.id
                        );
                        connection.set_autoconnect_blocked_reason(DeviceStateReason::NoSecrets);
                    } else if tries > 0 {
                        debug!(
                            target: "netpolicy::device",
                            "connection '{}' failed to autoconnect; {} tries left",
                            connection.id, tries
                        );
                        connection.set_autoconnect_retries(tries - 1);
                    }

                    if connection.autoconnect_retries() == 0 {
                        info!(
                            target: "netpolicy::device",
                            "disabling autoconnect for connection '{}'", connection.id
                        );
                        self.arm_reset_retries_timer(connection);
                    }
                    connection.clear_secrets();
                }
            }
            DeviceState::Activated => {
                if let Some(connection) = &connection {
                    // The attempt succeeded; give the connection a fresh
                    // retry budget and make the next activation re-request
                    // secrets.
                    connection.reset_autoconnect_retries();
                    connection.clear_secrets();
                }

                self.dns.begin_updates("device_state_changed");
                if let Some(config) = device.ip4_config.get() {
                    self.dns
                        .add_ip4_config(&ip_iface, &config, DnsIpConfigType::Default);
                }
                if let Some(config) = device.ip6_config.get() {
                    self.dns
                        .add_ip6_config(&ip_iface, &config, DnsIpConfigType::Default);
                }
                self.update_routing_and_dns(false);
                self.dns.end_updates("device_state_changed");
            }
            DeviceState::Unmanaged | DeviceState::Unavailable => {
                if old_state > DeviceState::Disconnected {
                    self.update_routing_and_dns(false);
                }
            }
            DeviceState::Deactivating => {
                if reason == DeviceStateReason::UserRequested {
                    if !device.autoconnect.get() {
                        // The whole device was disconnected; block every
                        // connection on it.
                        self.block_autoconnect_for_device(device);
                    } else if let Some(connection) = &connection {
                        debug!(
                            target: "netpolicy::device",
                            "blocking autoconnect of connection '{}' by user request",
                            connection.id
                        );
                        connection
                            .set_autoconnect_blocked_reason(DeviceStateReason::UserRequested);
                    }
                }
            }
            DeviceState::Disconnected => {
                // Carrier came back after an unplug; the device's
                // connections deserve a fresh chance.
                if reason == DeviceStateReason::Carrier && old_state == DeviceState::Unavailable {
                    self.reset_autoconnect_all(Some(device));
                }

                if old_state > DeviceState::Disconnected {
                    self.update_routing_and_dns(false);
                }

                self.schedule_activate_check(device);
            }
            DeviceState::Prepare => {
                self.activate_slave_connections(device);
            }
            DeviceState::IpConfig => {
                // Reaching IP configuration means secrets were obtained.
                if let Some(connection) = &connection {
                    connection.set_autoconnect_blocked_reason(DeviceStateReason::None);
                }
            }
            DeviceState::Secondaries => {
                let secondaries = connection
                    .as_ref()
                    .map(|c| c.secondaries.get())
                    .unwrap_or_default();
                if let Some(connection) = &connection
                    && !secondaries.is_empty()
                {
                    // Make routes and DNS current before the dependent
                    // connections come up.
                    self.update_routing_and_dns(false);

                    if !self.activate_secondary_connections(connection, device) {
                        device.queue_state(
                            DeviceState::Failed,
                            DeviceStateReason::SecondaryConnectionFailed,
                        );
                    }
                } else {
                    device.queue_state(DeviceState::Activated, DeviceStateReason::None);
                }
            }
            _ => {}
        }

        self.check_activating_devices();
    }

    fn sleeping_changed(&mut self) {
        // Going to sleep (or disabling networking) gives every connection a
        // clean slate; waking re-examines every device.
        if self.manager.sleeping() || !self.manager.networking_enabled() {
            self.reset_autoconnect_all(None);
        } else {
            self.schedule_activate_all();
        }
    }

    fn active_connection_state_changed(&mut self, active: &Arc<ActiveConnection>) {
        match active.state.get() {
            ActiveConnectionState::Activated => self.process_secondaries(active, true),
            ActiveConnectionState::Deactivated => self.process_secondaries(active, false),
            _ => {}
        }
    }

    fn vpn_state_changed(
        &mut self,
        active: &Arc<ActiveConnection>,
        new_state: VpnConnectionState,
        old_state: VpnConnectionState,
        reason: crate::types::VpnConnectionStateReason,
    ) {
        debug!(
            target: "netpolicy::device",
            "VPN '{}': {old_state:?} -> {new_state:?} ({reason:?})", active.id()
        );

        if new_state == VpnConnectionState::Activated {
            self.vpn_connection_activated(active);
        } else if new_state >= VpnConnectionState::Failed {
            // Only clean up IP and DNS if the connection ever got past
            // fetching its IP configuration.
            if old_state >= VpnConnectionState::IpConfigGet
                && old_state <= VpnConnectionState::Activated
            {
                self.vpn_connection_deactivated(active);
            }
        }
    }

    fn vpn_connection_activated(&mut self, active: &Arc<ActiveConnection>) {
        self.dns.begin_updates("vpn_connection_activated");

        let ip_iface = active.ip_iface_or_device().unwrap_or_default();
        if let Some(config) = active.ip4_config.get() {
            self.dns
                .add_ip4_config(&ip_iface, &config, DnsIpConfigType::Vpn);
        }
        if let Some(config) = active.ip6_config.get() {
            self.dns
                .add_ip6_config(&ip_iface, &config, DnsIpConfigType::Vpn);
        }
        self.update_routing_and_dns(true);

        self.dns.end_updates("vpn_connection_activated");
    }

    fn vpn_connection_deactivated(&mut self, active: &Arc<ActiveConnection>) {
        self.dns.begin_updates("vpn_connection_deactivated");

        if let Some(config) = active.ip4_config.get() {
            self.dns.remove_ip4_config(&config);
        }
        if let Some(config) = active.ip6_config.get() {
            self.dns.remove_ip6_config(&config);
        }
        self.update_routing_and_dns(true);

        self.dns.end_updates("vpn_connection_deactivated");
    }

    fn vpn_retry_after_failure(&mut self, active: &Arc<ActiveConnection>) {
        // Reconnect VPNs that dropped after having been connected.
        let request = ActivationRequest {
            connection: active.settings_connection.clone(),
            device: None,
            specific_object: None,
            subject: active.subject.clone(),
            activation_type: ActivationType::Full,
        };
        if let Err(err) = self.manager.activate_connection(request) {
            warn!(
                target: "netpolicy::device",
                "VPN '{}' reconnect failed: {err}", active.id()
            );
        }
    }

    fn connection_updated(&mut self, connection: &Arc<SettingsConnection>, by_user: bool) {
        if by_user {
            let device = self
                .manager
                .devices()
                .into_iter()
                .find(|device| device.settings_connection().is_some_and(|c| c == *connection));

            if let Some(device) = device {
                device.reapply_settings_immediately();
            }

            // A user edit means the connection deserves a fresh retry budget.
            connection.reset_autoconnect_retries();
        }

        self.schedule_activate_all();
    }

    fn deactivate_if_active(&mut self, connection: &Arc<SettingsConnection>) {
        for active in self.manager.active_connections() {
            if active.settings_connection == *connection
                && active.state.get() <= ActiveConnectionState::Activated
                && let Err(err) = self
                    .manager
                    .deactivate_connection(&active.object_path, DeviceStateReason::ConnectionRemoved)
            {
                warn!(
                    target: "netpolicy::device",
                    "connection '{}' disappeared, but error deactivating it: {err}",
                    connection.id
                );
            }
        }
    }

    fn secret_agent_registered(&mut self) {
        // The new agent may provide the secrets earlier attempts were
        // missing; let those connections try again.
        self.reset_autoconnect_for_failed_secrets();
        self.schedule_activate_all();
    }

    fn firewall_started(&mut self) {
        // Put the interface of every device back into its zone.
        for device in self.manager.devices() {
            device.update_firewall_zone();
        }
    }
}

impl Drop for Policy {
    fn drop(&mut self) {
        if let Some(handle) = self.lookup_abort.take() {
            handle.abort();
        }
    }
}
