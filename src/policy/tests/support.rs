#![allow(clippy::unwrap_used)]
//! In-memory fakes for every collaborator the engine talks to.

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::{ObjectPath, SystemHostname, Uuid};
use crate::dispatcher::{Dispatcher, DispatcherAction};
use crate::dns::DnsManager;
use crate::error::{PolicyError, Result};
use crate::manager::{ActivationRequest, Manager};
use crate::model::{
    ActiveConnection, Device, DeviceCommand, Ip4Config, Ip6Config, SettingsConnection,
};
use crate::policy::{Policy, PolicyDeps, event_channel};
use crate::resolver::{LookupError, Resolver};
use crate::routing::{BestIp4Config, BestIp6Config, DefaultRouteManager};
use crate::settings::SettingsStore;
use crate::types::{ConnectionType, DeviceStateReason, DeviceType, DnsIpConfigType};

pub struct FakeManager {
    pub devices: Mutex<Vec<Arc<Device>>>,
    pub active: Mutex<Vec<Arc<ActiveConnection>>>,
    pub sleeping: AtomicBool,
    pub enabled: AtomicBool,
    pub hostname: Mutex<Option<String>>,
    pub activatable: Mutex<Vec<Arc<SettingsConnection>>>,
    pub activations: Mutex<Vec<ActivationRequest>>,
    pub deactivations: Mutex<Vec<(ObjectPath, DeviceStateReason)>>,
    pub refuse_activations: AtomicBool,
    next_active: AtomicU32,
}

impl FakeManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(Vec::new()),
            active: Mutex::new(Vec::new()),
            sleeping: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            hostname: Mutex::new(None),
            activatable: Mutex::new(Vec::new()),
            activations: Mutex::new(Vec::new()),
            deactivations: Mutex::new(Vec::new()),
            refuse_activations: AtomicBool::new(false),
            next_active: AtomicU32::new(100),
        })
    }

    pub fn add_device(&self, device: &Arc<Device>) {
        self.devices.lock().unwrap().push(device.clone());
    }

    pub fn add_active(&self, active: &Arc<ActiveConnection>) {
        self.active.lock().unwrap().push(active.clone());
    }

    pub fn activation_count(&self) -> usize {
        self.activations.lock().unwrap().len()
    }
}

impl Manager for FakeManager {
    fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().unwrap().clone()
    }

    fn active_connections(&self) -> Vec<Arc<ActiveConnection>> {
        self.active.lock().unwrap().clone()
    }

    fn sleeping(&self) -> bool {
        self.sleeping.load(Ordering::SeqCst)
    }

    fn networking_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn hostname(&self) -> Option<String> {
        self.hostname.lock().unwrap().clone()
    }

    fn activatable_connections(&self) -> Vec<Arc<SettingsConnection>> {
        self.activatable.lock().unwrap().clone()
    }

    fn device_for_connection(&self, connection: &Arc<SettingsConnection>) -> Option<Arc<Device>> {
        self.active
            .lock()
            .unwrap()
            .iter()
            .find(|active| active.settings_connection == *connection)
            .and_then(|active| active.device.get())
    }

    fn activate_connection(&self, request: ActivationRequest) -> Result<Arc<ActiveConnection>> {
        self.activations.lock().unwrap().push(request.clone());
        if self.refuse_activations.load(Ordering::SeqCst) {
            return Err(PolicyError::ActivationFailed("refused by test".into()));
        }

        let n = self.next_active.fetch_add(1, Ordering::SeqCst);
        let active = ActiveConnection::new(
            format!("/active/{n}"),
            request.connection,
            request.subject,
        );
        active.specific_object.set(request.specific_object);
        if let Some(device) = request.device {
            active.device.set(Some(device.clone()));
            if !active.vpn {
                device.act_request.set(Some(active.clone()));
            }
        }
        self.active.lock().unwrap().push(active.clone());
        Ok(active)
    }

    fn deactivate_connection(&self, path: &ObjectPath, reason: DeviceStateReason) -> Result<()> {
        self.deactivations.lock().unwrap().push((path.clone(), reason));
        Ok(())
    }
}

pub struct FakeHostname {
    pub name: Mutex<String>,
    pub sets: Mutex<Vec<String>>,
    pub fail_set_with: Mutex<Option<i32>>,
}

impl FakeHostname {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name.to_string()),
            sets: Mutex::new(Vec::new()),
            fail_set_with: Mutex::new(None),
        })
    }

    pub fn get_name(&self) -> String {
        self.name.lock().unwrap().clone()
    }
}

impl SystemHostname for FakeHostname {
    fn get(&self) -> io::Result<String> {
        Ok(self.name.lock().unwrap().clone())
    }

    fn set(&self, name: &str) -> io::Result<()> {
        if let Some(errno) = *self.fail_set_with.lock().unwrap() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.sets.lock().unwrap().push(name.to_string());
        *self.name.lock().unwrap() = name.to_string();
        Ok(())
    }
}

pub struct FakeSettings {
    pub connections: Mutex<Vec<Arc<SettingsConnection>>>,
    pub transient_sets: Mutex<Vec<String>>,
    pub apply_transient: AtomicBool,
    pub kernel: Arc<FakeHostname>,
}

impl FakeSettings {
    pub fn new(kernel: Arc<FakeHostname>) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(Vec::new()),
            transient_sets: Mutex::new(Vec::new()),
            apply_transient: AtomicBool::new(true),
            kernel,
        })
    }

    pub fn add(&self, connection: &Arc<SettingsConnection>) {
        self.connections.lock().unwrap().push(connection.clone());
    }
}

#[async_trait]
impl SettingsStore for FakeSettings {
    fn connection_by_uuid(&self, uuid: &Uuid) -> Option<Arc<SettingsConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .find(|connection| connection.uuid == *uuid)
            .cloned()
    }

    fn connections_sorted(&self) -> Vec<Arc<SettingsConnection>> {
        self.connections.lock().unwrap().clone()
    }

    async fn set_transient_hostname(&self, name: &str) -> bool {
        self.transient_sets.lock().unwrap().push(name.to_string());
        let applied = self.apply_transient.load(Ordering::SeqCst);
        if applied {
            // hostnamed makes the kernel agree.
            *self.kernel.name.lock().unwrap() = name.to_string();
        }
        applied
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOp {
    Begin(String),
    End(String),
    AddIp4(String, ObjectPath, DnsIpConfigType),
    RemoveIp4(ObjectPath),
    AddIp6(String, ObjectPath, DnsIpConfigType),
    RemoveIp6(ObjectPath),
    SetHostname(Option<String>),
    SetInitialHostname(Option<String>),
}

pub struct FakeDns {
    pub ops: Mutex<Vec<DnsOp>>,
}

impl FakeDns {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
        })
    }

    pub fn contains(&self, op: &DnsOp) -> bool {
        self.ops.lock().unwrap().iter().any(|o| o == op)
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }
}

impl DnsManager for FakeDns {
    fn begin_updates(&self, tag: &str) {
        self.ops.lock().unwrap().push(DnsOp::Begin(tag.to_string()));
    }

    fn end_updates(&self, tag: &str) {
        self.ops.lock().unwrap().push(DnsOp::End(tag.to_string()));
    }

    fn add_ip4_config(&self, ip_iface: &str, config: &Arc<Ip4Config>, config_type: DnsIpConfigType) {
        self.ops.lock().unwrap().push(DnsOp::AddIp4(
            ip_iface.to_string(),
            config.object_path.clone(),
            config_type,
        ));
    }

    fn remove_ip4_config(&self, config: &Arc<Ip4Config>) {
        self.ops
            .lock()
            .unwrap()
            .push(DnsOp::RemoveIp4(config.object_path.clone()));
    }

    fn add_ip6_config(&self, ip_iface: &str, config: &Arc<Ip6Config>, config_type: DnsIpConfigType) {
        self.ops.lock().unwrap().push(DnsOp::AddIp6(
            ip_iface.to_string(),
            config.object_path.clone(),
            config_type,
        ));
    }

    fn remove_ip6_config(&self, config: &Arc<Ip6Config>) {
        self.ops
            .lock()
            .unwrap()
            .push(DnsOp::RemoveIp6(config.object_path.clone()));
    }

    fn set_hostname(&self, hostname: Option<&str>) {
        self.ops
            .lock()
            .unwrap()
            .push(DnsOp::SetHostname(hostname.map(str::to_owned)));
    }

    fn set_initial_hostname(&self, hostname: Option<&str>) {
        self.ops
            .lock()
            .unwrap()
            .push(DnsOp::SetInitialHostname(hostname.map(str::to_owned)));
    }
}

#[derive(Default)]
pub struct FakeRoutes {
    pub best4_device: Mutex<Option<Arc<Device>>>,
    pub best4_device_activating: Mutex<Option<Arc<Device>>>,
    pub best6_device: Mutex<Option<Arc<Device>>>,
    pub best6_device_activating: Mutex<Option<Arc<Device>>>,
    pub best4_config: Mutex<Option<BestIp4Config>>,
    pub best6_config: Mutex<Option<BestIp6Config>>,
}

impl FakeRoutes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl DefaultRouteManager for FakeRoutes {
    fn best_ip4_device(
        &self,
        _devices: &[Arc<Device>],
        fully_activated: bool,
        _preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>> {
        if fully_activated {
            self.best4_device.lock().unwrap().clone()
        } else {
            self.best4_device_activating
                .lock()
                .unwrap()
                .clone()
                .or_else(|| self.best4_device.lock().unwrap().clone())
        }
    }

    fn best_ip6_device(
        &self,
        _devices: &[Arc<Device>],
        fully_activated: bool,
        _preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>> {
        if fully_activated {
            self.best6_device.lock().unwrap().clone()
        } else {
            self.best6_device_activating
                .lock()
                .unwrap()
                .clone()
                .or_else(|| self.best6_device.lock().unwrap().clone())
        }
    }

    fn best_ip4_config(&self, _ignore_never_default: bool) -> Option<BestIp4Config> {
        self.best4_config.lock().unwrap().clone()
    }

    fn best_ip6_config(&self, _ignore_never_default: bool) -> Option<BestIp6Config> {
        self.best6_config.lock().unwrap().clone()
    }
}

pub struct FakeResolver {
    pub result: Mutex<std::result::Result<String, LookupError>>,
    pub lookups: Mutex<Vec<IpAddr>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err(LookupError::Failed("no fake result".into()))),
            lookups: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn lookup_by_address(&self, addr: IpAddr) -> std::result::Result<String, LookupError> {
        self.lookups.lock().unwrap().push(addr);
        self.result.lock().unwrap().clone()
    }
}

pub struct FakeDispatcher {
    pub calls: Mutex<Vec<DispatcherAction>>,
}

impl FakeDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl Dispatcher for FakeDispatcher {
    fn call(&self, action: DispatcherAction) {
        self.calls.lock().unwrap().push(action);
    }
}

/// One engine wired to a full set of fakes.
pub struct Harness {
    pub manager: Arc<FakeManager>,
    pub settings: Arc<FakeSettings>,
    pub dns: Arc<FakeDns>,
    pub routes: Arc<FakeRoutes>,
    pub resolver: Arc<FakeResolver>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub kernel: Arc<FakeHostname>,
    pub policy: Policy,
    pub rx: crate::policy::EventReceiver,
}

impl Harness {
    /// Applies one event and drains the coalesced idle work, the way the
    /// production loop does.
    pub fn handle(&mut self, event: crate::policy::Event) {
        self.policy.handle_event(event);
        self.policy.run_pending();
    }

    /// Feeds events produced by async completions back into the engine
    /// until none arrive for a short while.
    pub async fn pump(&mut self) {
        use std::time::Duration;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await
        {
            self.policy.handle_event(event);
            self.policy.run_pending();
        }
    }
}

/// A harness whose host booted with the (specific) hostname "testhost".
pub fn harness() -> Harness {
    harness_with_orig(Some("testhost".to_string()))
}

pub fn harness_with_orig(orig: Option<String>) -> Harness {
    let kernel = FakeHostname::new(orig.as_deref().unwrap_or("localhost"));
    let manager = FakeManager::new();
    let settings = FakeSettings::new(kernel.clone());
    let dns = FakeDns::new();
    let routes = FakeRoutes::new();
    let resolver = FakeResolver::new();
    let dispatcher = FakeDispatcher::new();

    let deps = PolicyDeps {
        manager: manager.clone(),
        settings: settings.clone(),
        dns: dns.clone(),
        routes: routes.clone(),
        resolver: resolver.clone(),
        dispatcher: dispatcher.clone(),
        system_hostname: kernel.clone(),
    };
    let (events, rx) = event_channel();
    let policy = Policy::with_startup_hostname(deps, events, orig);

    Harness {
        manager,
        settings,
        dns,
        routes,
        resolver,
        dispatcher,
        kernel,
        policy,
        rx,
    }
}

/// An ethernet device in the given state, registered with nothing.
pub fn ethernet(
    path: &str,
    iface: &str,
) -> (Arc<Device>, tokio::sync::mpsc::UnboundedReceiver<DeviceCommand>) {
    Device::new(path, iface, DeviceType::Ethernet)
}

pub fn profile(uuid: &str, id: &str) -> Arc<SettingsConnection> {
    SettingsConnection::new(uuid, id, format!("/settings/{uuid}"), ConnectionType::Ethernet)
}

pub fn vpn_profile(uuid: &str, id: &str) -> Arc<SettingsConnection> {
    SettingsConnection::new(uuid, id, format!("/settings/{uuid}"), ConnectionType::Vpn)
}
