use crate::mapping::{
    query_status, render_status, GatewayClient, LifecycleState, MappingLifecycleManager, PortSet,
    Protocol, RefreshPolicy, ServerHooks,
};
use crate::Error;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DESCRIPTION: &str = "Dedicated Server (portkeeper)";

/// Scriptable in-memory gateway that records every call
struct FakeGateway {
    available: AtomicBool,
    external: Option<IpAddr>,
    mapped: Mutex<HashSet<(Protocol, u16)>>,
    open_result: bool,
    close_result: bool,
    /// When set, open() on an already-mapped port fails the test
    forbid_open_when_mapped: bool,
    open_calls: Mutex<Vec<(Protocol, u16)>>,
    close_calls: Mutex<Vec<(Protocol, u16)>>,
}

impl FakeGateway {
    fn available() -> Self {
        Self {
            available: AtomicBool::new(true),
            external: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10))),
            mapped: Mutex::new(HashSet::new()),
            open_result: true,
            close_result: true,
            forbid_open_when_mapped: false,
            open_calls: Mutex::new(Vec::new()),
            close_calls: Mutex::new(Vec::new()),
        }
    }

    fn unavailable() -> Self {
        let gateway = Self::available();
        gateway.available.store(false, Ordering::SeqCst);
        gateway
    }

    fn with_mapped(self, specs: &[(Protocol, u16)]) -> Self {
        self.mapped.lock().unwrap().extend(specs.iter().copied());
        self
    }

    fn with_open_result(mut self, result: bool) -> Self {
        self.open_result = result;
        self
    }

    fn with_close_result(mut self, result: bool) -> Self {
        self.close_result = result;
        self
    }

    fn forbidding_open_when_mapped(mut self) -> Self {
        self.forbid_open_when_mapped = true;
        self
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn open_calls(&self) -> Vec<(Protocol, u16)> {
        self.open_calls.lock().unwrap().clone()
    }

    fn close_calls(&self) -> Vec<(Protocol, u16)> {
        self.close_calls.lock().unwrap().clone()
    }
}

impl GatewayClient for FakeGateway {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn external_address(&self) -> Option<IpAddr> {
        self.external
    }

    fn is_mapped(&self, protocol: Protocol, port: u16) -> bool {
        self.mapped.lock().unwrap().contains(&(protocol, port))
    }

    fn open(&self, protocol: Protocol, port: u16, _description: &str) -> bool {
        if self.forbid_open_when_mapped {
            assert!(
                !self.is_mapped(protocol, port),
                "open() invoked for already-mapped port {} {}",
                protocol,
                port
            );
        }
        self.open_calls.lock().unwrap().push((protocol, port));
        if self.open_result {
            self.mapped.lock().unwrap().insert((protocol, port));
        }
        self.open_result
    }

    fn close(&self, protocol: Protocol, port: u16) -> bool {
        self.close_calls.lock().unwrap().push((protocol, port));
        if self.close_result {
            self.mapped.lock().unwrap().remove(&(protocol, port));
        }
        self.close_result
    }
}

fn manager_for(
    gateway: Arc<FakeGateway>,
    ports: PortSet,
    policy: RefreshPolicy,
) -> MappingLifecycleManager {
    MappingLifecycleManager::new(gateway, ports, policy, DESCRIPTION)
}

#[tokio::test]
async fn start_visits_every_configured_port_in_order() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565, 25566], vec![19132]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    let outcomes = manager.start().await.unwrap();

    assert_eq!(outcomes.len(), 3);
    let visited: Vec<_> = outcomes.iter().map(|o| (o.spec.protocol, o.spec.port)).collect();
    assert_eq!(
        visited,
        vec![
            (Protocol::Tcp, 25565),
            (Protocol::Tcp, 25566),
            (Protocol::Udp, 19132),
        ],
        "TCP group must come first, each group in configured order"
    );
    assert!(outcomes.iter().all(|o| o.succeeded && !o.already_mapped));
    assert_eq!(manager.state(), LifecycleState::Active);
}

#[tokio::test]
async fn start_with_unavailable_gateway_goes_stopped() {
    let gateway = Arc::new(FakeGateway::unavailable());
    let ports = PortSet::new(vec![25565], vec![19132]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::new(5));

    let outcomes = manager.start().await.unwrap();

    assert!(outcomes.is_empty());
    assert!(gateway.open_calls().is_empty(), "no open attempts expected");
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert!(!manager.has_schedule());
}

#[tokio::test]
async fn start_does_not_reopen_already_mapped_port() {
    let gateway = Arc::new(
        FakeGateway::available()
            .with_mapped(&[(Protocol::Tcp, 25565)])
            .forbidding_open_when_mapped(),
    );
    let ports = PortSet::new(vec![25565, 25566], vec![]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    let outcomes = manager.start().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].already_mapped);
    assert!(!outcomes[0].succeeded);
    assert!(outcomes[1].succeeded);
    assert_eq!(gateway.open_calls(), vec![(Protocol::Tcp, 25566)]);
}

#[tokio::test]
async fn start_records_per_port_failures_without_aborting() {
    let gateway = Arc::new(FakeGateway::available().with_open_result(false));
    let ports = PortSet::new(vec![25565], vec![19132, 24454]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    let outcomes = manager.start().await.unwrap();

    assert_eq!(outcomes.len(), 3, "a failed open must not abort the pass");
    assert!(outcomes.iter().all(|o| !o.succeeded && !o.already_mapped));
    assert_eq!(gateway.open_calls().len(), 3);
    assert_eq!(manager.state(), LifecycleState::Active);
}

#[tokio::test]
async fn start_twice_is_an_invalid_state() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565], vec![]);
    let mut manager = manager_for(gateway, ports, RefreshPolicy::DISABLED);

    manager.start().await.unwrap();
    let second = manager.start().await;

    assert!(matches!(second, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn refresh_reasserts_every_port_even_when_mapped() {
    let gateway = Arc::new(FakeGateway::available().with_mapped(&[
        (Protocol::Tcp, 25565),
        (Protocol::Udp, 19132),
    ]));
    let ports = PortSet::new(vec![25565], vec![19132]);
    let manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    let outcomes = manager.refresh_pass().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.succeeded && !o.already_mapped));
    assert_eq!(
        gateway.open_calls().len(),
        2,
        "refresh is a blind re-assert: open is called for every port"
    );
}

#[tokio::test]
async fn refresh_with_unavailable_gateway_is_nonfatal() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565], vec![19132]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);
    manager.start().await.unwrap();

    gateway.set_available(false);
    let outcomes = manager.refresh_pass().await.unwrap();

    assert_eq!(outcomes.len(), 2, "one all-failed outcome per configured port");
    assert!(outcomes.iter().all(|o| !o.succeeded));
    assert_eq!(
        manager.state(),
        LifecycleState::Active,
        "a failed refresh must not change lifecycle state"
    );
}

#[tokio::test]
async fn stop_reaches_stopped_even_when_every_close_fails() {
    let gateway = Arc::new(FakeGateway::available().with_close_result(false));
    let ports = PortSet::new(vec![25565], vec![19132]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    manager.start().await.unwrap();
    manager.stop().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(gateway.close_calls().len(), 2);
}

#[tokio::test]
async fn stop_twice_is_a_noop() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565], vec![]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    manager.start().await.unwrap();
    manager.stop().await.unwrap();
    let closes_after_first = gateway.close_calls().len();

    manager.stop().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert_eq!(
        gateway.close_calls().len(),
        closes_after_first,
        "second stop must not issue additional close attempts"
    );
}

#[tokio::test]
async fn single_tcp_port_full_lifecycle() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565], vec![]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::new(0));

    let outcomes = manager.start().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].spec.protocol, Protocol::Tcp);
    assert_eq!(outcomes[0].spec.port, 25565);
    assert!(outcomes[0].succeeded);
    assert!(!outcomes[0].already_mapped);
    assert!(!manager.has_schedule(), "interval 0 must not arm a schedule");

    manager.stop().await.unwrap();
    assert_eq!(gateway.close_calls(), vec![(Protocol::Tcp, 25565)]);
}

#[tokio::test(start_paused = true)]
async fn refresh_schedule_armed_and_disarmed() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565], vec![]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::new(5));

    manager.start().await.unwrap();
    assert!(manager.has_schedule(), "exactly one schedule after start");
    assert_eq!(manager.state(), LifecycleState::Active);

    manager.stop().await.unwrap();
    assert!(!manager.has_schedule(), "zero schedules after stop");

    // Let several refresh periods elapse; nothing may fire post-stop.
    let opens_after_stop = gateway.open_calls().len();
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(
        gateway.open_calls().len(),
        opens_after_stop,
        "no open calls may occur after stop"
    );
}

#[tokio::test]
async fn duplicate_ports_are_visited_independently() {
    let gateway = Arc::new(FakeGateway::available());
    let ports = PortSet::new(vec![25565, 25565], vec![25565]);
    let mut manager = manager_for(gateway.clone(), ports, RefreshPolicy::DISABLED);

    let outcomes = manager.start().await.unwrap();

    assert_eq!(outcomes.len(), 3, "duplicates are not deduplicated");
    // The second TCP 25565 sees the mapping left by the first and is skipped;
    // UDP 25565 is a distinct entry.
    assert!(outcomes[0].succeeded);
    assert!(outcomes[1].already_mapped);
    assert!(outcomes[2].succeeded);
}

#[tokio::test]
async fn query_status_is_read_only_and_order_stable() {
    let gateway = Arc::new(FakeGateway::available().with_mapped(&[
        (Protocol::Tcp, 25565),
        (Protocol::Udp, 19132),
    ]));
    let ports = PortSet::new(vec![25565, 25566], vec![19132]);

    let snapshot = query_status(gateway.as_ref(), &ports);

    assert!(snapshot.gateway_available);
    assert_eq!(
        snapshot.external_address,
        Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10)))
    );
    let reported: Vec<_> = snapshot
        .ports
        .iter()
        .map(|p| (p.spec.protocol, p.spec.port, p.mapped))
        .collect();
    assert_eq!(
        reported,
        vec![
            (Protocol::Tcp, 25565, true),
            (Protocol::Tcp, 25566, false),
            (Protocol::Udp, 19132, true),
        ]
    );
    assert_eq!(snapshot.mapped_count(), 2);
    assert!(gateway.open_calls().is_empty(), "status must not open ports");
    assert!(gateway.close_calls().is_empty(), "status must not close ports");
}

#[tokio::test]
async fn unavailable_gateway_status_renders_unavailable() {
    let gateway = Arc::new(FakeGateway::unavailable());
    let ports = PortSet::new(vec![25565], vec![19132]);
    let mut manager = manager_for(gateway.clone(), ports.clone(), RefreshPolicy::DISABLED);

    let outcomes = manager.start().await.unwrap();
    assert!(outcomes.is_empty());

    let snapshot = query_status(gateway.as_ref(), &ports);
    let lines = render_status(&snapshot);
    assert_eq!(lines, vec!["UPnP is not available on this network."]);
}

// ========================================================================
// Server hook tests
// ========================================================================

#[tokio::test]
async fn hooks_are_noops_outside_dedicated_mode() {
    let gateway = Arc::new(FakeGateway::available());
    let mut hooks = ServerHooks::with_gateway("does-not-exist.json", false, gateway.clone());

    hooks.on_start().await.unwrap();
    hooks.on_stopping().await.unwrap();

    assert!(gateway.open_calls().is_empty());
    assert!(gateway.close_calls().is_empty());
}

#[tokio::test]
async fn hooks_drive_the_full_lifecycle() {
    use crate::config::PortsConfig;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portkeeper.json");
    let config = PortsConfig {
        tcp_ports: vec![25565],
        udp_ports: vec![19132],
        refresh_interval_minutes: 0,
        mapping_description: DESCRIPTION.to_string(),
    };
    config.save(&path).unwrap();

    let gateway = Arc::new(FakeGateway::available());
    let mut hooks = ServerHooks::with_gateway(&path, true, gateway.clone());

    hooks.on_start().await.unwrap();
    assert_eq!(
        gateway.open_calls(),
        vec![(Protocol::Tcp, 25565), (Protocol::Udp, 19132)]
    );

    let lines = hooks.status_lines().await.unwrap();
    assert!(lines.contains(&"TCP 25565".to_string()));
    assert!(lines.contains(&"UDP 19132".to_string()));

    hooks.on_stopping().await.unwrap();
    assert_eq!(
        gateway.close_calls(),
        vec![(Protocol::Tcp, 25565), (Protocol::Udp, 19132)]
    );
}

#[tokio::test]
async fn hooks_status_before_start_reports_not_running() {
    let gateway = Arc::new(FakeGateway::available());
    let hooks = ServerHooks::with_gateway("does-not-exist.json", true, gateway);

    let lines = hooks.status_lines().await.unwrap();
    assert_eq!(lines, vec!["UPnP port mapping is not running."]);
}
