//! Integration tests driving the production event loop end to end: events go
//! in through the channel, [`Policy::run`] schedules everything, and the
//! effects surface on in-memory collaborator fakes.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netpolicy::common::{ObjectPath, SystemHostname, Uuid};
use netpolicy::dispatcher::{Dispatcher, DispatcherAction};
use netpolicy::dns::DnsManager;
use netpolicy::error::Result;
use netpolicy::manager::{ActivationRequest, Manager};
use netpolicy::model::{
    ActiveConnection, Device, Ip4Config, Ip6Config, SettingsConnection,
};
use netpolicy::policy::{Event, EventSender, Policy, PolicyDeps, event_channel};
use netpolicy::resolver::{LookupError, Resolver};
use netpolicy::routing::{BestIp4Config, BestIp6Config, DefaultRouteManager};
use netpolicy::settings::SettingsStore;
use netpolicy::types::{
    ActivationType, ConnectionType, DeviceState, DeviceStateReason, DnsIpConfigType, DeviceType,
};

#[derive(Default)]
struct TestManager {
    devices: Mutex<Vec<Arc<Device>>>,
    active: Mutex<Vec<Arc<ActiveConnection>>>,
    sleeping: AtomicBool,
    activatable: Mutex<Vec<Arc<SettingsConnection>>>,
    activations: Mutex<Vec<ActivationRequest>>,
}

impl Manager for TestManager {
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
        true
    }

    fn hostname(&self) -> Option<String> {
        None
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
        let n = self.activations.lock().unwrap().len();
        let active = ActiveConnection::new(
            format!("/active/{n}"),
            request.connection,
            request.subject,
        );
        if let Some(device) = request.device {
            active.device.set(Some(device.clone()));
            device.act_request.set(Some(active.clone()));
        }
        self.active.lock().unwrap().push(active.clone());
        Ok(active)
    }

    fn deactivate_connection(&self, _path: &ObjectPath, _reason: DeviceStateReason) -> Result<()> {
        Ok(())
    }
}

struct TestSettings {
    connections: Mutex<Vec<Arc<SettingsConnection>>>,
}

#[async_trait]
impl SettingsStore for TestSettings {
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

    async fn set_transient_hostname(&self, _name: &str) -> bool {
        true
    }
}

#[derive(Default)]
struct TestDns {
    adds4: Mutex<Vec<(String, ObjectPath, DnsIpConfigType)>>,
}

impl DnsManager for TestDns {
    fn begin_updates(&self, _tag: &str) {}
    fn end_updates(&self, _tag: &str) {}

    fn add_ip4_config(&self, ip_iface: &str, config: &Arc<Ip4Config>, config_type: DnsIpConfigType) {
        self.adds4.lock().unwrap().push((
            ip_iface.to_string(),
            config.object_path.clone(),
            config_type,
        ));
    }

    fn remove_ip4_config(&self, _config: &Arc<Ip4Config>) {}
    fn add_ip6_config(&self, _ip_iface: &str, _config: &Arc<Ip6Config>, _t: DnsIpConfigType) {}
    fn remove_ip6_config(&self, _config: &Arc<Ip6Config>) {}
    fn set_hostname(&self, _hostname: Option<&str>) {}
    fn set_initial_hostname(&self, _hostname: Option<&str>) {}
}

#[derive(Default)]
struct TestRoutes {
    best4: Mutex<Option<BestIp4Config>>,
}

impl DefaultRouteManager for TestRoutes {
    fn best_ip4_device(
        &self,
        _devices: &[Arc<Device>],
        _fully_activated: bool,
        _preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>> {
        self.best4
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|best| best.device.clone())
    }

    fn best_ip6_device(
        &self,
        _devices: &[Arc<Device>],
        _fully_activated: bool,
        _preferred: Option<&Arc<Device>>,
    ) -> Option<Arc<Device>> {
        None
    }

    fn best_ip4_config(&self, _ignore_never_default: bool) -> Option<BestIp4Config> {
        self.best4.lock().unwrap().clone()
    }

    fn best_ip6_config(&self, _ignore_never_default: bool) -> Option<BestIp6Config> {
        None
    }
}

struct TestResolver;

#[async_trait]
impl Resolver for TestResolver {
    async fn lookup_by_address(&self, _addr: IpAddr) -> std::result::Result<String, LookupError> {
        Err(LookupError::Failed("no fake result".into()))
    }
}

struct TestDispatcher;

impl Dispatcher for TestDispatcher {
    fn call(&self, _action: DispatcherAction) {}
}

struct TestHostname;

impl SystemHostname for TestHostname {
    fn get(&self) -> io::Result<String> {
        Ok("testhost".to_string())
    }

    fn set(&self, _name: &str) -> io::Result<()> {
        Ok(())
    }
}

struct Loop {
    manager: Arc<TestManager>,
    settings: Arc<TestSettings>,
    dns: Arc<TestDns>,
    routes: Arc<TestRoutes>,
    events: EventSender,
    task: tokio::task::JoinHandle<()>,
}

impl Loop {
    fn start() -> Self {
        let manager = Arc::new(TestManager::default());
        let settings = Arc::new(TestSettings {
            connections: Mutex::new(Vec::new()),
        });
        let dns = Arc::new(TestDns::default());
        let routes = Arc::new(TestRoutes::default());

        let deps = PolicyDeps {
            manager: manager.clone(),
            settings: settings.clone(),
            dns: dns.clone(),
            routes: routes.clone(),
            resolver: Arc::new(TestResolver),
            dispatcher: Arc::new(TestDispatcher),
            system_hostname: Arc::new(TestHostname),
        };
        let (events, rx) = event_channel();
        let policy = Policy::with_startup_hostname(deps, events.clone(), Some("testhost".into()));
        let task = tokio::spawn(policy.run(rx));

        Self {
            manager,
            settings,
            dns,
            routes,
            events,
            task,
        }
    }

    async fn wait_until(&self, what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }
}

fn ethernet_profile(uuid: &str, id: &str) -> Arc<SettingsConnection> {
    SettingsConnection::new(uuid, id, format!("/settings/{uuid}"), ConnectionType::Ethernet)
}

#[tokio::test]
async fn boot_flow_activates_and_elects_default() {
    let env = Loop::start();

    let (eth0, _cmds) = Device::new("/devices/1", "eth0", DeviceType::Ethernet);
    eth0.state.set(DeviceState::Unavailable);
    env.manager.devices.lock().unwrap().push(eth0.clone());

    let office = ethernet_profile("uuid-office", "office");
    eth0.available_connections.set(vec![office.uuid.clone()]);
    env.settings.connections.lock().unwrap().push(office.clone());
    env.manager.activatable.lock().unwrap().push(office.clone());

    env.events.send(Event::DeviceAdded {
        device: eth0.clone(),
    });
    eth0.state.set(DeviceState::Disconnected);
    env.events.send(Event::DeviceStateChanged {
        device: eth0.clone(),
        new_state: DeviceState::Disconnected,
        old_state: DeviceState::Unavailable,
        reason: DeviceStateReason::Carrier,
    });

    env.wait_until("auto-activation", || {
        env.manager.activations.lock().unwrap().len() == 1
    })
    .await;
    let request = env.manager.activations.lock().unwrap()[0].clone();
    assert_eq!(request.connection.uuid, "uuid-office");
    assert_eq!(request.activation_type, ActivationType::Full);

    // The link comes up; the engine adds its config to DNS.
    let active = eth0.act_request.get().unwrap();
    let ip4 = Ip4Config::new("/ip4/1", vec!["192.0.2.10".parse().unwrap()]);
    eth0.ip4_config.set(Some(ip4.clone()));
    eth0.state.set(DeviceState::Activated);
    *env.routes.best4.lock().unwrap() = Some(BestIp4Config {
        config: ip4,
        ip_iface: "eth0".into(),
        active: active.clone(),
        device: Some(eth0.clone()),
        vpn: None,
    });
    env.events.send(Event::DeviceStateChanged {
        device: eth0.clone(),
        new_state: DeviceState::Activated,
        old_state: DeviceState::IpCheck,
        reason: DeviceStateReason::None,
    });

    env.wait_until("default flag", || active.default4.get()).await;
    assert!(env.dns.adds4.lock().unwrap().iter().any(|(iface, path, t)| {
        iface == "eth0" && path == "/ip4/1" && *t == DnsIpConfigType::Default
    }));

    env.task.abort();
}

#[tokio::test]
async fn reset_timer_fires_inside_the_loop() {
    let env = Loop::start();

    let (eth0, _cmds) = Device::new("/devices/1", "eth0", DeviceType::Ethernet);
    eth0.state.set(DeviceState::Disconnected);
    env.manager.devices.lock().unwrap().push(eth0.clone());

    let flaky = SettingsConnection::with_retry_reset_interval(
        "uuid-flaky",
        "flaky",
        "/settings/uuid-flaky",
        ConnectionType::Ethernet,
        Duration::from_millis(150),
    );
    eth0.available_connections.set(vec![flaky.uuid.clone()]);
    env.settings.connections.lock().unwrap().push(flaky.clone());
    env.manager.activatable.lock().unwrap().push(flaky.clone());

    // Burn through the whole retry budget.
    let active = ActiveConnection::new(
        "/active/manual",
        flaky.clone(),
        netpolicy::types::AuthSubject::Internal,
    );
    eth0.act_request.set(Some(active));
    for _ in 0..4 {
        env.events.send(Event::DeviceStateChanged {
            device: eth0.clone(),
            new_state: DeviceState::Failed,
            old_state: DeviceState::Prepare,
            reason: DeviceStateReason::ConfigFailed,
        });
    }
    env.wait_until("retries exhausted", || flaky.autoconnect_retries() == 0)
        .await;

    // Once the deadline passes, the loop's timer restores the budget and
    // the connection is retried without any further events.
    eth0.act_request.set(None);
    eth0.state.set(DeviceState::Disconnected);
    env.wait_until("timed retry", || {
        env.manager.activations.lock().unwrap().len() == 1
    })
    .await;
    assert_eq!(flaky.autoconnect_retries(), 4);

    env.task.abort();
}

#[tokio::test]
async fn sleeping_suppresses_candidacy() {
    let env = Loop::start();

    let (eth0, _cmds) = Device::new("/devices/1", "eth0", DeviceType::Ethernet);
    eth0.state.set(DeviceState::Disconnected);
    env.manager.devices.lock().unwrap().push(eth0.clone());

    let office = ethernet_profile("uuid-office", "office");
    eth0.available_connections.set(vec![office.uuid.clone()]);
    env.settings.connections.lock().unwrap().push(office.clone());
    env.manager.activatable.lock().unwrap().push(office.clone());
    env.manager.sleeping.store(true, Ordering::SeqCst);

    env.events.send(Event::DeviceAdded {
        device: eth0.clone(),
    });
    env.events.send(Event::DeviceRecheckAutoActivate {
        device: eth0.clone(),
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(env.manager.activations.lock().unwrap().is_empty());

    // Waking up rescans every device.
    env.manager.sleeping.store(false, Ordering::SeqCst);
    env.events.send(Event::SleepingChanged);
    env.wait_until("post-wake activation", || {
        env.manager.activations.lock().unwrap().len() == 1
    })
    .await;

    env.task.abort();
}
