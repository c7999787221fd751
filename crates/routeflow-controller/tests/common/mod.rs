use async_trait::async_trait;
use routeflow_cloud::InMemoryCloud;
use routeflow_config::ControllerConfig;
use routeflow_controller::{
    AddressKind, Backend, BackendPort, Collaborators, Controller, Error, EventType, NodeAddress,
    NodeInfo, NodeLister, NodeSetTracker, PollConfig, RateLimit, Reconciler, ReconcilerSettings,
    Result, RouteKey, RouteSpec, SecretReader, ServicePortResolver, StatusSink, TlsMaterial,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SUBNET_ID: &str = "subnet-1";
pub const SUBNET_CIDR: &str = "10.0.0.0/24";

pub const CERT_PEM: &[u8] = include_bytes!("../fixtures/tls.crt");
pub const KEY_PEM: &[u8] = include_bytes!("../fixtures/pkcs1.key");

#[derive(Default)]
pub struct StaticNodes {
    nodes: Mutex<Vec<NodeInfo>>,
    failing: AtomicBool,
}

impl StaticNodes {
    pub fn set(&self, nodes: Vec<NodeInfo>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    #[allow(dead_code)]
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeLister for StaticNodes {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Collaborator("node list unavailable".into()));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct StaticServices {
    ports: Mutex<HashMap<(String, String, BackendPort), u16>>,
}

impl StaticServices {
    pub fn set(&self, namespace: &str, service: &str, port: BackendPort, node_port: u16) {
        self.ports
            .lock()
            .unwrap()
            .insert((namespace.into(), service.into(), port), node_port);
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        self.ports.lock().unwrap().clear();
    }
}

#[async_trait]
impl ServicePortResolver for StaticServices {
    async fn node_port(&self, namespace: &str, service: &str, port: &BackendPort) -> Result<u16> {
        self.ports
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), service.to_string(), port.clone()))
            .copied()
            .ok_or_else(|| Error::ServiceResolution {
                namespace: namespace.into(),
                service: service.into(),
                port: port.to_string(),
                reason: "service not found".into(),
            })
    }
}

#[derive(Default)]
pub struct StaticSecrets {
    secrets: Mutex<HashMap<(String, String), TlsMaterial>>,
}

impl StaticSecrets {
    #[allow(dead_code)]
    pub fn set(&self, namespace: &str, name: &str) {
        self.secrets.lock().unwrap().insert(
            (namespace.into(), name.into()),
            TlsMaterial {
                certificate: CERT_PEM.to_vec(),
                private_key: KEY_PEM.to_vec(),
            },
        );
    }
}

#[async_trait]
impl SecretReader for StaticSecrets {
    async fn read_tls(&self, namespace: &str, name: &str) -> Result<TlsMaterial> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::SecretNotFound {
                namespace: namespace.into(),
                name: name.into(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingStatus {
    addresses: Mutex<HashMap<RouteKey, String>>,
    events: Mutex<Vec<RecordedEvent>>,
    failing: AtomicBool,
}

impl RecordingStatus {
    #[allow(dead_code)]
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn address(&self, key: &RouteKey) -> Option<String> {
        self.addresses.lock().unwrap().get(key).cloned()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }

    #[allow(dead_code)]
    pub fn last_event(&self) -> Option<RecordedEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StatusSink for RecordingStatus {
    async fn record_address(&self, route: &RouteSpec, address: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Collaborator("status update rejected".into()));
        }
        self.addresses
            .lock()
            .unwrap()
            .insert(route.key.clone(), address.to_string());
        Ok(())
    }

    async fn record_event(
        &self,
        _route: &RouteSpec,
        event_type: EventType,
        reason: &str,
        message: String,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            event_type,
            reason: reason.to_string(),
            message,
        });
    }
}

pub fn node(name: &str, ip: &str) -> NodeInfo {
    NodeInfo {
        name: name.into(),
        addresses: vec![NodeAddress {
            kind: AddressKind::InternalIp,
            address: ip.into(),
        }],
        instance_id: Some(format!("i-{}", name)),
        ready: true,
        ..Default::default()
    }
}

/// shop/web: `shop.example.com/api` to service api:80
pub fn shop_route(version: &str) -> RouteSpec {
    RouteSpec::new(RouteKey::new("shop", "web"), "prod", version).with_rule(
        "shop.example.com",
        "/api",
        Backend::new("api", BackendPort::Number(80)),
    )
}

/// shop/web: `shop.example.com/api` to service backend, port named `http`
#[allow(dead_code)]
pub fn backend_route(version: &str) -> RouteSpec {
    RouteSpec::new(RouteKey::new("shop", "web"), "prod", version).with_rule(
        "shop.example.com",
        "/api",
        Backend::new("backend", BackendPort::Name("http".into())),
    )
}

/// In-memory cloud plus fake cluster collaborators
pub struct TestEnv {
    pub cloud: Arc<InMemoryCloud>,
    pub nodes: Arc<StaticNodes>,
    pub services: Arc<StaticServices>,
    pub secrets: Arc<StaticSecrets>,
    pub status: Arc<RecordingStatus>,
    pub settings: ReconcilerSettings,
}

impl TestEnv {
    /// Two ready workers and service shop/api:80 on node port 30080
    pub fn new() -> Self {
        let cloud = Arc::new(InMemoryCloud::new().with_settle_polls(2));
        cloud.add_subnet(SUBNET_ID, SUBNET_CIDR);
        cloud.add_port("i-n1", "port-n1");
        cloud.add_port("i-n2", "port-n2");

        let nodes = Arc::new(StaticNodes::default());
        nodes.set(vec![node("n1", "10.0.0.11"), node("n2", "10.0.0.12")]);

        let services = Arc::new(StaticServices::default());
        services.set("shop", "api", BackendPort::Number(80), 30080);

        Self {
            cloud,
            nodes,
            services,
            secrets: Arc::new(StaticSecrets::default()),
            status: Arc::new(RecordingStatus::default()),
            settings: ReconcilerSettings {
                subnet_id: SUBNET_ID.into(),
                ..Default::default()
            },
        }
    }

    /// Ready nodes 10.0.0.5 and 10.0.0.6, shop/backend port `http` on 30080
    #[allow(dead_code)]
    pub fn with_named_port_backend(self) -> Self {
        self.nodes.set(vec![node("n1", "10.0.0.5"), node("n2", "10.0.0.6")]);
        self.services
            .set("shop", "backend", BackendPort::Name("http".into()), 30080);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            nodes: self.nodes.clone(),
            services: self.services.clone(),
            secrets: self.secrets.clone(),
            status: self.status.clone(),
        }
    }

    pub fn poll_config() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_secs(1),
            factor: 1.0,
            steps: 20,
        }
    }

    /// Reconciler over a tracker that has seen the current nodes once
    #[allow(dead_code)]
    pub async fn reconciler(&self) -> (Reconciler, NodeSetTracker) {
        let tracker = NodeSetTracker::new(self.nodes.clone());
        tracker.refresh().await.unwrap();
        let reconciler = Reconciler::new(
            self.cloud.clone(),
            self.collaborators(),
            tracker.subscribe(),
            self.settings.clone(),
            Self::poll_config(),
        );
        (reconciler, tracker)
    }

    #[allow(dead_code)]
    pub fn controller(&self, max_retries: u32) -> Controller {
        let config = ControllerConfig {
            max_retries,
            poll_initial_delay_secs: 1,
            poll_steps: 20,
            ..Default::default()
        };
        Controller::new(
            self.cloud.clone(),
            self.collaborators(),
            self.settings.clone(),
            &config,
        )
        .with_rate_limit(RateLimit {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
        })
    }
}
