//! Reconciler: converges one route onto the cloud
//!
//! ```text
//! ensure_route                              delete_route
//!   1. load balancer (version cache)          7. security group
//!   2. TLS bundles                            8. floating IP
//!   3. listener                             5-6. policies, pools
//!   4. default pool                           3. listeners
//!   5. drop policies + shared pools           2. TLS bundles
//!   6. shared pools + policies                1. load balancer
//!   7. security group
//!   8. floating IP
//!   9. status + version stamp
//! ```

use crate::collaborators::{Collaborators, EventType, reasons};
use crate::error::Result;
use crate::managers::{
    FloatingIpManager, L7Manager, ListenerManager, LoadBalancerManager, Membership, PolicyTarget,
    PoolManager, SecretManager, SecurityGroupManager, TlsRefs,
};
use crate::nodes::{NodeSnapshot, ReadyNode};
use crate::poller::{PollConfig, StatusPoller};
use crate::route::{Backend, RouteSpec, TlsSource, version_marker};
use routeflow_cloud::{CloudApi, LoadBalancer};
use routeflow_config::OpenStackConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Where new load balancers go and how they are exposed
#[derive(Debug, Clone, Default)]
pub struct ReconcilerSettings {
    pub subnet_id: String,
    /// Network floating IPs are allocated from; `None` exposes the VIP
    pub floating_network_id: Option<String>,
    pub provider: Option<String>,
    /// Default for routes without the security-group annotation
    pub manage_security_groups: bool,
}

impl From<&OpenStackConfig> for ReconcilerSettings {
    fn from(config: &OpenStackConfig) -> Self {
        Self {
            subnet_id: config.subnet_id.clone(),
            floating_network_id: config.floating_network_id.clone(),
            provider: config.provider.clone(),
            manage_security_groups: config.manage_security_groups,
        }
    }
}

/// Result of a successful `ensure_route`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The load balancer already carried this version
    Unchanged,
    Created { address: String },
    Updated { address: String },
}

impl EnsureOutcome {
    pub fn address(&self) -> Option<&str> {
        match self {
            EnsureOutcome::Unchanged => None,
            EnsureOutcome::Created { address } | EnsureOutcome::Updated { address } => {
                Some(address)
            }
        }
    }
}

pub struct Reconciler {
    api: Arc<dyn CloudApi>,
    collaborators: Collaborators,
    nodes: NodeSnapshot,
    settings: ReconcilerSettings,
    loadbalancers: LoadBalancerManager,
    listeners: ListenerManager,
    pools: PoolManager,
    l7: L7Manager,
    security_groups: SecurityGroupManager,
    floating_ips: FloatingIpManager,
    secrets: SecretManager,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn CloudApi>,
        collaborators: Collaborators,
        nodes: NodeSnapshot,
        settings: ReconcilerSettings,
        poll: PollConfig,
    ) -> Self {
        let poller = StatusPoller::new(api.clone(), poll);
        Self {
            loadbalancers: LoadBalancerManager::new(api.clone(), poller.clone()),
            listeners: ListenerManager::new(api.clone(), poller.clone()),
            pools: PoolManager::new(api.clone(), poller.clone()),
            l7: L7Manager::new(api.clone(), poller),
            security_groups: SecurityGroupManager::new(api.clone()),
            floating_ips: FloatingIpManager::new(api.clone()),
            secrets: SecretManager::new(api.clone()),
            api,
            collaborators,
            nodes,
            settings,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    async fn event(&self, spec: &RouteSpec, event_type: EventType, reason: &str, message: String) {
        self.collaborators
            .status
            .record_event(spec, event_type, reason, message)
            .await;
    }

    /// Drives the cloud to the state `spec` describes
    pub async fn ensure_route(&self, spec: &RouteSpec) -> Result<EnsureOutcome> {
        let result = self.converge(spec).await;
        match &result {
            Ok(EnsureOutcome::Unchanged) => {}
            Ok(EnsureOutcome::Created { address }) => {
                self.event(
                    spec,
                    EventType::Normal,
                    reasons::CREATED,
                    format!("Load balancer ready at {}", address),
                )
                .await;
            }
            Ok(EnsureOutcome::Updated { address }) => {
                self.event(
                    spec,
                    EventType::Normal,
                    reasons::UPDATED,
                    format!("Load balancer updated, address {}", address),
                )
                .await;
            }
            Err(e) => {
                self.event(spec, EventType::Warning, reasons::FAILED, e.to_string())
                    .await;
            }
        }
        result
    }

    async fn converge(&self, spec: &RouteSpec) -> Result<EnsureOutcome> {
        spec.validate()?;
        let name = spec.loadbalancer_name();

        // 1. Load balancer
        let ensured = self
            .loadbalancers
            .ensure(
                &name,
                &spec.base_description(),
                &self.settings.subnet_id,
                self.settings.provider.as_deref(),
            )
            .await?;
        let lb = ensured.loadbalancer;
        if !ensured.created && version_marker(&lb.description) == Some(spec.version.as_str()) {
            tracing::debug!(route = %spec.key, loadbalancer = %lb.id, version = %spec.version, "Route up to date");
            // The pass that stamped the version may have failed to publish it
            let address = match self.floating_ips.find(&lb.vip_port_id).await? {
                Some(fip) => fip.floating_ip_address,
                None => lb.vip_address.clone(),
            };
            self.record_address(spec, &address).await;
            return Ok(EnsureOutcome::Unchanged);
        }
        let (reason, verb) = if ensured.created {
            (reasons::CREATING, "Creating")
        } else {
            (reasons::UPDATING, "Updating")
        };
        self.event(
            spec,
            EventType::Normal,
            reason,
            format!("{} load balancer {}", verb, name),
        )
        .await;
        tracing::info!(route = %spec.key, loadbalancer = %lb.id, version = %spec.version, "{} route", verb);

        // 2. TLS bundles
        let tls = self.tls_refs(spec).await?;

        // 3. Listener
        let listener = self.listeners.ensure(&lb.id, &name, &tls).await?;

        let nodes = self.nodes.current();
        let mut node_ports: HashMap<&Backend, u16> = HashMap::new();

        // 4. Default pool
        let default_pool = spec.default_pool_name();
        match &spec.default_backend {
            Some(backend) => {
                let port = self.node_port(spec, backend, &mut node_ports).await?;
                self.pools
                    .ensure(&lb.id, &default_pool, Some(&listener.id), port, &nodes)
                    .await?;
            }
            None => self.pools.delete(&lb.id, &default_pool).await?,
        }

        // 5. Replace L7 routing wholesale
        self.l7.delete_all(&lb.id, &listener.id).await?;
        self.pools.delete_shared(&lb.id).await?;

        // 6. Shared pools and policies
        let mut shared: HashMap<&Backend, String> = HashMap::new();
        for (index, rule) in spec.rules.iter().enumerate() {
            let pool_id = match shared.get(&rule.backend) {
                Some(id) => id.clone(),
                None => {
                    let port = self.node_port(spec, &rule.backend, &mut node_ports).await?;
                    let pool = self
                        .pools
                        .ensure(&lb.id, &spec.shared_pool_name(&rule.backend), None, port, &nodes)
                        .await?;
                    shared.insert(&rule.backend, pool.id.clone());
                    pool.id
                }
            };
            let position = index as u32 + 1;
            let policy_name = format!("{}_{}", name, position);
            self.l7
                .create_policy_rule(
                    &lb.id,
                    &listener.id,
                    &PolicyTarget {
                        name: &policy_name,
                        pool_id: &pool_id,
                        host: &rule.host,
                        path: &rule.path,
                        port: listener.protocol_port,
                        position,
                    },
                )
                .await?;
        }

        // 7. Security group
        let mut ports: Vec<u16> = node_ports.values().copied().collect();
        ports.sort_unstable();
        self.converge_security_group(spec, &lb, &nodes, &ports).await?;

        // 8. Floating IP
        let address = self.expose(spec, &lb).await?;

        // 9. Status and version stamp
        self.record_address(spec, &address).await;
        self.loadbalancers.stamp(&lb.id, &spec.description()).await?;

        tracing::info!(route = %spec.key, loadbalancer = %lb.id, address = %address, "Route reconciled");
        Ok(if ensured.created {
            EnsureOutcome::Created { address }
        } else {
            EnsureOutcome::Updated { address }
        })
    }

    async fn record_address(&self, spec: &RouteSpec, address: &str) {
        if let Err(e) = self
            .collaborators
            .status
            .record_address(spec, address)
            .await
        {
            tracing::warn!(route = %spec.key, error = %e, "Failed to record route address");
        }
    }

    async fn tls_refs(&self, spec: &RouteSpec) -> Result<TlsRefs> {
        let mut refs: Vec<String> = Vec::new();
        for entry in &spec.tls {
            let secret_ref = match &entry.source {
                TlsSource::ContainerRef(r) => r.clone(),
                TlsSource::Secret { name } => {
                    let material = self
                        .collaborators
                        .secrets
                        .read_tls(&spec.key.namespace, name)
                        .await?;
                    self.secrets
                        .ensure(&spec.secret_name(name), &material)
                        .await?
                }
            };
            if !refs.contains(&secret_ref) {
                refs.push(secret_ref);
            }
        }
        Ok(TlsRefs::new(refs))
    }

    async fn node_port<'a>(
        &self,
        spec: &RouteSpec,
        backend: &'a Backend,
        cache: &mut HashMap<&'a Backend, u16>,
    ) -> Result<u16> {
        if let Some(port) = cache.get(backend) {
            return Ok(*port);
        }
        let port = self
            .collaborators
            .services
            .node_port(&spec.key.namespace, &backend.service, &backend.port)
            .await?;
        cache.insert(backend, port);
        Ok(port)
    }

    fn manages_security_groups(&self, spec: &RouteSpec) -> bool {
        spec.manage_security_groups
            .unwrap_or(self.settings.manage_security_groups)
    }

    async fn converge_security_group(
        &self,
        spec: &RouteSpec,
        lb: &LoadBalancer,
        nodes: &[ReadyNode],
        ports: &[u16],
    ) -> Result<()> {
        let tags = spec.security_group_tags();
        let instances = instance_ids(nodes);

        if !self.manages_security_groups(spec) {
            if self.security_groups.delete(&tags, &instances).await? {
                tracing::info!(route = %spec.key, "Security group management disabled, removed group");
            }
            return Ok(());
        }

        let subnet = self.api.get_subnet(&lb.vip_subnet_id).await?;
        let group = self
            .security_groups
            .ensure(
                &spec.loadbalancer_name(),
                &format!("Security group for {}", spec.base_description()),
                &tags,
            )
            .await?;
        self.security_groups
            .ensure_rules(&group.id, &subnet.cidr, ports)
            .await?;
        self.security_groups
            .ensure_port_membership(&group.id, Membership::Attach, &instances)
            .await?;
        Ok(())
    }

    /// Returns the address clients use, allocating or releasing the
    /// floating IP
    async fn expose(&self, spec: &RouteSpec, lb: &LoadBalancer) -> Result<String> {
        match (&self.settings.floating_network_id, spec.internal) {
            (Some(network), false) => {
                let fip = self.floating_ips.ensure(&lb.vip_port_id, network).await?;
                Ok(fip.floating_ip_address)
            }
            _ => {
                self.floating_ips.release(&lb.vip_port_id).await?;
                Ok(lb.vip_address.clone())
            }
        }
    }

    /// Tears down everything `ensure_route` built, children first
    ///
    /// Every step tolerates resources that are already gone.
    pub async fn delete_route(&self, spec: &RouteSpec) -> Result<()> {
        let name = spec.loadbalancer_name();
        let instances = instance_ids(&self.nodes.current());

        // 7. Security group
        self.security_groups
            .delete(&spec.security_group_tags(), &instances)
            .await?;

        if let Some(lb) = self.loadbalancers.find(&name).await? {
            // 8. Floating IP
            self.floating_ips.release(&lb.vip_port_id).await?;

            // 6-5. Policies before the pools they redirect to
            for listener in self.api.list_listeners(&lb.id).await? {
                self.l7.delete_all(&lb.id, &listener.id).await?;
            }
            self.pools.delete_all(&lb.id).await?;

            // 3. Listeners
            self.listeners.delete_all(&lb.id).await?;
        }

        // 2. TLS bundles
        for secret in spec.tls_secret_names() {
            self.secrets.delete(&spec.secret_name(secret)).await?;
        }

        // 1. Load balancer
        self.loadbalancers.delete(&name).await?;

        tracing::info!(route = %spec.key, loadbalancer = %name, "Route deleted");
        self.event(
            spec,
            EventType::Normal,
            reasons::DELETED,
            format!("Load balancer {} deleted", name),
        )
        .await;
        Ok(())
    }

    /// Re-applies pool membership of a managed route from `nodes`
    ///
    /// Pools that do not exist are skipped; nothing else is touched.
    pub async fn refresh_members(&self, spec: &RouteSpec, nodes: &[ReadyNode]) -> Result<()> {
        let Some(lb) = self.loadbalancers.find(&spec.loadbalancer_name()).await? else {
            tracing::debug!(route = %spec.key, "No load balancer, skipping member refresh");
            return Ok(());
        };

        let mut node_ports: HashMap<&Backend, u16> = HashMap::new();
        let mut pools: Vec<(String, &Backend)> = spec
            .rule_backends()
            .into_iter()
            .map(|backend| (spec.shared_pool_name(backend), backend))
            .collect();
        if let Some(backend) = &spec.default_backend {
            pools.push((spec.default_pool_name(), backend));
        }

        for (pool, backend) in pools {
            let port = self.node_port(spec, backend, &mut node_ports).await?;
            if self
                .pools
                .update_members(&lb.id, &pool, port, nodes)
                .await?
            {
                tracing::info!(route = %spec.key, pool = %pool, "Refreshed pool members");
            }
        }
        Ok(())
    }
}

fn instance_ids(nodes: &[ReadyNode]) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| node.instance_id.clone())
        .collect()
}
