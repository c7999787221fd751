//! In-memory implementation of [`CloudApi`]
//!
//! Behaves like the real load-balancing service where the controller relies on
//! it: every mutation puts the owning load balancer into a pending state for
//! a configurable number of status polls, children cannot be mutated while
//! their load balancer is pending, and parents cannot be deleted while they
//! still have children. Every mutation is recorded in a [`Journal`].

use crate::action::{ActionType, Journal};
use crate::api::CloudApi;
use crate::error::{CloudError, ResourceKind, Result};
use crate::model::{
    FloatingIp, L7Policy, L7PolicyCreate, L7Rule, L7RuleCreate, Listener, ListenerCreate,
    ListenerTlsUpdate, LoadBalancer, LoadBalancerCreate, Member, MemberSpec, NetworkPort, Pool,
    PoolCreate, ProvisioningStatus, SecretCreate, SecurityGroup, SecurityGroupRule,
    SecurityGroupRuleCreate, StoredSecret, Subnet,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct LbEntry {
    lb: LoadBalancer,
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    settle_polls: u32,
    load_balancers: BTreeMap<String, LbEntry>,
    listeners: BTreeMap<String, Listener>,
    pools: BTreeMap<String, Pool>,
    members: HashMap<String, Vec<Member>>,
    policies: BTreeMap<String, L7Policy>,
    rules: HashMap<String, Vec<L7Rule>>,
    security_groups: BTreeMap<String, SecurityGroup>,
    security_group_rules: BTreeMap<String, SecurityGroupRule>,
    ports: BTreeMap<String, NetworkPort>,
    floating_ips: BTreeMap<String, FloatingIp>,
    subnets: HashMap<String, Subnet>,
    secrets: BTreeMap<String, StoredSecret>,
    failures: HashMap<String, u32>,
    journal: Journal,
}

impl MemoryState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn take_failure(&mut self, op: &str) -> Result<()> {
        if let Some(remaining) = self.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                tracing::debug!(op, remaining = *remaining, "Injecting failure");
                return Err(CloudError::Api {
                    status: Some(503),
                    message: format!("injected failure in {}", op),
                });
            }
        }
        Ok(())
    }

    /// Fails unless the load balancer exists and is not pending
    fn require_mutable(&self, lb_id: &str) -> Result<()> {
        let entry = self
            .load_balancers
            .get(lb_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::LoadBalancer, lb_id))?;
        if entry.lb.provisioning_status.is_pending() {
            return Err(CloudError::Conflict {
                kind: ResourceKind::LoadBalancer,
                id: lb_id.to_string(),
                message: format!("provisioning status is {}", entry.lb.provisioning_status),
            });
        }
        Ok(())
    }

    fn mark_pending(&mut self, lb_id: &str, status: ProvisioningStatus) {
        let settle = self.settle_polls;
        if let Some(entry) = self.load_balancers.get_mut(lb_id) {
            if settle > 0 {
                entry.lb.provisioning_status = status;
                entry.pending_polls = settle;
            }
        }
    }

    fn listener_lb(&self, listener_id: &str) -> Result<String> {
        self.listeners
            .get(listener_id)
            .map(|l| l.loadbalancer_id.clone())
            .ok_or_else(|| CloudError::not_found(ResourceKind::Listener, listener_id))
    }

    fn pool_lb(&self, pool_id: &str) -> Result<String> {
        self.pools
            .get(pool_id)
            .map(|p| p.loadbalancer_id.clone())
            .ok_or_else(|| CloudError::not_found(ResourceKind::Pool, pool_id))
    }

    fn policy_lb(&self, policy_id: &str) -> Result<String> {
        let policy = self
            .policies
            .get(policy_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::L7Policy, policy_id))?;
        self.listener_lb(&policy.listener_id)
    }

    /// Guards a mutation of a child of `lb_id` and records it
    fn mutate_child(
        &mut self,
        op: &str,
        lb_id: &str,
        action: ActionType,
        kind: ResourceKind,
        id: &str,
    ) -> Result<()> {
        self.take_failure(op)?;
        self.require_mutable(lb_id)?;
        self.journal.record(action, kind, id);
        self.mark_pending(lb_id, ProvisioningStatus::PendingUpdate);
        Ok(())
    }
}

/// In-memory cloud for tests
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<MemoryState>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of status polls a load balancer stays pending after a mutation
    pub fn with_settle_polls(self, polls: u32) -> Self {
        self.state().settle_polls = polls;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `times` calls of `op` (a `CloudApi` method name) fail
    pub fn fail_next(&self, op: &str, times: u32) {
        self.state().failures.insert(op.to_string(), times);
    }

    pub fn add_subnet(&self, id: &str, cidr: &str) {
        self.state().subnets.insert(
            id.to_string(),
            Subnet {
                id: id.to_string(),
                cidr: cidr.to_string(),
            },
        );
    }

    /// Registers a network port on a compute instance
    pub fn add_port(&self, device_id: &str, port_id: &str) {
        self.state().ports.insert(
            port_id.to_string(),
            NetworkPort {
                id: port_id.to_string(),
                device_id: device_id.to_string(),
                security_groups: Vec::new(),
            },
        );
    }

    /// Inserts a load balancer directly, bypassing the journal
    pub fn insert_load_balancer(&self, name: &str) -> LoadBalancer {
        let mut state = self.state();
        let id = state.next("lb");
        let lb = LoadBalancer {
            id: id.clone(),
            name: name.to_string(),
            description: String::new(),
            vip_address: format!("192.168.100.{}", state.next_id % 250 + 1),
            vip_port_id: format!("vip-{}", id),
            vip_subnet_id: "subnet-seed".to_string(),
            provisioning_status: ProvisioningStatus::Active,
        };
        state.load_balancers.insert(
            id,
            LbEntry {
                lb: lb.clone(),
                pending_polls: 0,
            },
        );
        lb
    }

    /// Inserts a security group rule directly, bypassing the journal
    pub fn insert_security_group_rule(&self, req: &SecurityGroupRuleCreate) -> SecurityGroupRule {
        let mut state = self.state();
        let rule = SecurityGroupRule {
            id: state.next("sgr"),
            security_group_id: req.security_group_id.clone(),
            direction: req.direction.clone(),
            protocol: Some(req.protocol.clone()),
            port_range_min: Some(req.port_range_min),
            port_range_max: Some(req.port_range_max),
            remote_ip_prefix: Some(req.remote_ip_prefix.clone()),
        };
        state
            .security_group_rules
            .insert(rule.id.clone(), rule.clone());
        rule
    }

    /// Forces a load balancer into `status` until the next mutation
    pub fn force_status(&self, lb_id: &str, status: ProvisioningStatus) {
        if let Some(entry) = self.state().load_balancers.get_mut(lb_id) {
            entry.lb.provisioning_status = status;
            entry.pending_polls = u32::MAX;
        }
    }

    pub fn journal(&self) -> Journal {
        self.state().journal.clone()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> {
        self.state()
            .load_balancers
            .values()
            .map(|e| e.lb.clone())
            .collect()
    }

    pub fn listeners(&self) -> Vec<Listener> {
        self.state().listeners.values().cloned().collect()
    }

    pub fn pools(&self) -> Vec<Pool> {
        self.state().pools.values().cloned().collect()
    }

    pub fn members(&self, pool_id: &str) -> Vec<Member> {
        self.state()
            .members
            .get(pool_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn policies(&self) -> Vec<L7Policy> {
        self.state().policies.values().cloned().collect()
    }

    pub fn rules(&self, policy_id: &str) -> Vec<L7Rule> {
        self.state()
            .rules
            .get(policy_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn security_groups(&self) -> Vec<SecurityGroup> {
        self.state().security_groups.values().cloned().collect()
    }

    pub fn security_group_rules(&self, security_group_id: &str) -> Vec<SecurityGroupRule> {
        self.state()
            .security_group_rules
            .values()
            .filter(|r| r.security_group_id == security_group_id)
            .cloned()
            .collect()
    }

    pub fn port(&self, port_id: &str) -> Option<NetworkPort> {
        self.state().ports.get(port_id).cloned()
    }

    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.state().floating_ips.values().cloned().collect()
    }

    pub fn secrets(&self) -> Vec<StoredSecret> {
        self.state().secrets.values().cloned().collect()
    }
}

#[async_trait]
impl CloudApi for InMemoryCloud {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn list_load_balancers(&self, name: &str) -> Result<Vec<LoadBalancer>> {
        let mut state = self.state();
        state.take_failure("list_load_balancers")?;
        Ok(state
            .load_balancers
            .values()
            .filter(|e| e.lb.name == name)
            .map(|e| e.lb.clone())
            .collect())
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        let mut state = self.state();
        state.take_failure("get_load_balancer")?;
        let entry = state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::LoadBalancer, id))?;
        if entry.lb.provisioning_status.is_pending() {
            entry.pending_polls = entry.pending_polls.saturating_sub(1);
            if entry.pending_polls == 0 {
                entry.lb.provisioning_status = ProvisioningStatus::Active;
            }
        }
        Ok(entry.lb.clone())
    }

    async fn create_load_balancer(&self, req: &LoadBalancerCreate) -> Result<LoadBalancer> {
        let mut state = self.state();
        state.take_failure("create_load_balancer")?;
        let id = state.next("lb");
        let octet = state.next_id % 250 + 1;
        let lb = LoadBalancer {
            id: id.clone(),
            name: req.name.clone(),
            description: req.description.clone(),
            vip_address: format!("192.168.100.{}", octet),
            vip_port_id: format!("vip-{}", id),
            vip_subnet_id: req.vip_subnet_id.clone(),
            provisioning_status: ProvisioningStatus::Active,
        };
        state.load_balancers.insert(
            id.clone(),
            LbEntry {
                lb,
                pending_polls: 0,
            },
        );
        state
            .journal
            .record(ActionType::Create, ResourceKind::LoadBalancer, &id);
        state.mark_pending(&id, ProvisioningStatus::PendingCreate);
        Ok(state.load_balancers[&id].lb.clone())
    }

    async fn update_load_balancer_description(&self, id: &str, description: &str) -> Result<()> {
        let mut state = self.state();
        state.mutate_child(
            "update_load_balancer_description",
            id,
            ActionType::Update,
            ResourceKind::LoadBalancer,
            id,
        )?;
        if let Some(entry) = state.load_balancers.get_mut(id) {
            entry.lb.description = description.to_string();
        }
        Ok(())
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("delete_load_balancer")?;
        state.require_mutable(id)?;
        let has_children = state.listeners.values().any(|l| l.loadbalancer_id == id)
            || state.pools.values().any(|p| p.loadbalancer_id == id);
        if has_children {
            return Err(CloudError::Conflict {
                kind: ResourceKind::LoadBalancer,
                id: id.to_string(),
                message: "load balancer still has listeners or pools".to_string(),
            });
        }
        state.load_balancers.remove(id);
        state
            .journal
            .record(ActionType::Delete, ResourceKind::LoadBalancer, id);
        Ok(())
    }

    async fn list_listeners(&self, loadbalancer_id: &str) -> Result<Vec<Listener>> {
        let mut state = self.state();
        state.take_failure("list_listeners")?;
        Ok(state
            .listeners
            .values()
            .filter(|l| l.loadbalancer_id == loadbalancer_id)
            .cloned()
            .collect())
    }

    async fn create_listener(&self, req: &ListenerCreate) -> Result<Listener> {
        let mut state = self.state();
        let id = state.next("listener");
        state.mutate_child(
            "create_listener",
            &req.loadbalancer_id,
            ActionType::Create,
            ResourceKind::Listener,
            &id,
        )?;
        let listener = Listener {
            id: id.clone(),
            name: req.name.clone(),
            loadbalancer_id: req.loadbalancer_id.clone(),
            protocol: req.protocol,
            protocol_port: req.protocol_port,
            default_pool_id: None,
            default_tls_container_ref: req.default_tls_container_ref.clone(),
            sni_container_refs: req.sni_container_refs.clone(),
        };
        state.listeners.insert(id, listener.clone());
        Ok(listener)
    }

    async fn update_listener_tls(&self, id: &str, update: &ListenerTlsUpdate) -> Result<()> {
        let mut state = self.state();
        let lb_id = state.listener_lb(id)?;
        state.mutate_child(
            "update_listener_tls",
            &lb_id,
            ActionType::Update,
            ResourceKind::Listener,
            id,
        )?;
        if let Some(listener) = state.listeners.get_mut(id) {
            listener.default_tls_container_ref = update.default_tls_container_ref.clone();
            listener.sni_container_refs = update.sni_container_refs.clone();
        }
        Ok(())
    }

    async fn delete_listener(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let lb_id = state.listener_lb(id)?;
        state.mutate_child(
            "delete_listener",
            &lb_id,
            ActionType::Delete,
            ResourceKind::Listener,
            id,
        )?;
        state.listeners.remove(id);
        let policy_ids: Vec<String> = state
            .policies
            .values()
            .filter(|p| p.listener_id == id)
            .map(|p| p.id.clone())
            .collect();
        for policy_id in policy_ids {
            state.policies.remove(&policy_id);
            state.rules.remove(&policy_id);
        }
        for pool in state.pools.values_mut() {
            if pool.listener_id.as_deref() == Some(id) {
                pool.listener_id = None;
            }
        }
        Ok(())
    }

    async fn list_pools(&self, loadbalancer_id: &str) -> Result<Vec<Pool>> {
        let mut state = self.state();
        state.take_failure("list_pools")?;
        Ok(state
            .pools
            .values()
            .filter(|p| p.loadbalancer_id == loadbalancer_id)
            .cloned()
            .collect())
    }

    async fn create_pool(&self, req: &PoolCreate) -> Result<Pool> {
        let mut state = self.state();
        let id = state.next("pool");
        state.mutate_child(
            "create_pool",
            &req.loadbalancer_id,
            ActionType::Create,
            ResourceKind::Pool,
            &id,
        )?;
        let pool = Pool {
            id: id.clone(),
            name: req.name.clone(),
            loadbalancer_id: req.loadbalancer_id.clone(),
            listener_id: req.listener_id.clone(),
        };
        if let Some(listener_id) = &req.listener_id {
            if let Some(listener) = state.listeners.get_mut(listener_id) {
                listener.default_pool_id = Some(id.clone());
            }
        }
        state.pools.insert(id.clone(), pool.clone());
        state.members.insert(id, Vec::new());
        Ok(pool)
    }

    async fn delete_pool(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let lb_id = state.pool_lb(id)?;
        if state
            .policies
            .values()
            .any(|p| p.redirect_pool_id.as_deref() == Some(id))
        {
            return Err(CloudError::Conflict {
                kind: ResourceKind::Pool,
                id: id.to_string(),
                message: "pool is referenced by an l7 policy".to_string(),
            });
        }
        state.mutate_child("delete_pool", &lb_id, ActionType::Delete, ResourceKind::Pool, id)?;
        state.pools.remove(id);
        state.members.remove(id);
        for listener in state.listeners.values_mut() {
            if listener.default_pool_id.as_deref() == Some(id) {
                listener.default_pool_id = None;
            }
        }
        Ok(())
    }

    async fn list_members(&self, pool_id: &str) -> Result<Vec<Member>> {
        let mut state = self.state();
        state.take_failure("list_members")?;
        state
            .members
            .get(pool_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ResourceKind::Pool, pool_id))
    }

    async fn replace_members(&self, pool_id: &str, members: &[MemberSpec]) -> Result<()> {
        let mut state = self.state();
        let lb_id = state.pool_lb(pool_id)?;
        state.mutate_child(
            "replace_members",
            &lb_id,
            ActionType::Update,
            ResourceKind::Member,
            pool_id,
        )?;
        let replaced: Vec<Member> = members
            .iter()
            .map(|m| Member {
                id: state.next("member"),
                name: m.name.clone(),
                address: m.address.clone(),
                protocol_port: m.protocol_port,
            })
            .collect();
        state.members.insert(pool_id.to_string(), replaced);
        Ok(())
    }

    async fn list_l7_policies(&self, listener_id: &str) -> Result<Vec<L7Policy>> {
        let mut state = self.state();
        state.take_failure("list_l7_policies")?;
        Ok(state
            .policies
            .values()
            .filter(|p| p.listener_id == listener_id)
            .cloned()
            .collect())
    }

    async fn create_l7_policy(&self, req: &L7PolicyCreate) -> Result<L7Policy> {
        let mut state = self.state();
        let lb_id = state.listener_lb(&req.listener_id)?;
        if !state.pools.contains_key(&req.redirect_pool_id) {
            return Err(CloudError::not_found(ResourceKind::Pool, &req.redirect_pool_id));
        }
        let id = state.next("l7policy");
        state.mutate_child(
            "create_l7_policy",
            &lb_id,
            ActionType::Create,
            ResourceKind::L7Policy,
            &id,
        )?;
        let policy = L7Policy {
            id: id.clone(),
            name: req.name.clone(),
            listener_id: req.listener_id.clone(),
            redirect_pool_id: Some(req.redirect_pool_id.clone()),
            position: req.position,
        };
        state.policies.insert(id.clone(), policy.clone());
        state.rules.insert(id, Vec::new());
        Ok(policy)
    }

    async fn delete_l7_policy(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let lb_id = state.policy_lb(id)?;
        state.mutate_child(
            "delete_l7_policy",
            &lb_id,
            ActionType::Delete,
            ResourceKind::L7Policy,
            id,
        )?;
        state.policies.remove(id);
        state.rules.remove(id);
        Ok(())
    }

    async fn list_l7_rules(&self, policy_id: &str) -> Result<Vec<L7Rule>> {
        let mut state = self.state();
        state.take_failure("list_l7_rules")?;
        state
            .rules
            .get(policy_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ResourceKind::L7Policy, policy_id))
    }

    async fn create_l7_rule(&self, policy_id: &str, req: &L7RuleCreate) -> Result<L7Rule> {
        let mut state = self.state();
        let lb_id = state.policy_lb(policy_id)?;
        let id = state.next("l7rule");
        state.mutate_child(
            "create_l7_rule",
            &lb_id,
            ActionType::Create,
            ResourceKind::L7Rule,
            &id,
        )?;
        let rule = L7Rule {
            id,
            rule_type: req.rule_type,
            compare_type: req.compare_type,
            value: req.value.clone(),
        };
        state
            .rules
            .entry(policy_id.to_string())
            .or_default()
            .push(rule.clone());
        Ok(rule)
    }

    async fn list_security_groups(&self, tags: &[String]) -> Result<Vec<SecurityGroup>> {
        let mut state = self.state();
        state.take_failure("list_security_groups")?;
        Ok(state
            .security_groups
            .values()
            .filter(|g| tags.iter().all(|t| g.tags.contains(t)))
            .cloned()
            .collect())
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        let mut state = self.state();
        state.take_failure("create_security_group")?;
        let group = SecurityGroup {
            id: state.next("sg"),
            name: name.to_string(),
            description: description.to_string(),
            tags: Vec::new(),
        };
        state
            .journal
            .record(ActionType::Create, ResourceKind::SecurityGroup, &group.id);
        state.security_groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn add_security_group_tag(&self, id: &str, tag: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("add_security_group_tag")?;
        let group = state
            .security_groups
            .get_mut(id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::SecurityGroup, id))?;
        if !group.tags.iter().any(|t| t == tag) {
            group.tags.push(tag.to_string());
        }
        state
            .journal
            .record(ActionType::Update, ResourceKind::SecurityGroup, id);
        Ok(())
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("delete_security_group")?;
        if state.security_groups.remove(id).is_none() {
            return Err(CloudError::not_found(ResourceKind::SecurityGroup, id));
        }
        state.security_group_rules.retain(|_, r| r.security_group_id != id);
        state
            .journal
            .record(ActionType::Delete, ResourceKind::SecurityGroup, id);
        Ok(())
    }

    async fn list_security_group_rules(
        &self,
        security_group_id: &str,
    ) -> Result<Vec<SecurityGroupRule>> {
        let mut state = self.state();
        state.take_failure("list_security_group_rules")?;
        Ok(state
            .security_group_rules
            .values()
            .filter(|r| r.security_group_id == security_group_id)
            .cloned()
            .collect())
    }

    async fn create_security_group_rule(
        &self,
        req: &SecurityGroupRuleCreate,
    ) -> Result<SecurityGroupRule> {
        let mut state = self.state();
        state.take_failure("create_security_group_rule")?;
        if !state.security_groups.contains_key(&req.security_group_id) {
            return Err(CloudError::not_found(
                ResourceKind::SecurityGroup,
                &req.security_group_id,
            ));
        }
        let rule = SecurityGroupRule {
            id: state.next("sgr"),
            security_group_id: req.security_group_id.clone(),
            direction: req.direction.clone(),
            protocol: Some(req.protocol.clone()),
            port_range_min: Some(req.port_range_min),
            port_range_max: Some(req.port_range_max),
            remote_ip_prefix: Some(req.remote_ip_prefix.clone()),
        };
        state
            .journal
            .record(ActionType::Create, ResourceKind::SecurityGroupRule, &rule.id);
        state
            .security_group_rules
            .insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn delete_security_group_rule(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("delete_security_group_rule")?;
        if state.security_group_rules.remove(id).is_none() {
            return Err(CloudError::not_found(ResourceKind::SecurityGroupRule, id));
        }
        state
            .journal
            .record(ActionType::Delete, ResourceKind::SecurityGroupRule, id);
        Ok(())
    }

    async fn list_ports(&self, device_id: &str) -> Result<Vec<NetworkPort>> {
        let mut state = self.state();
        state.take_failure("list_ports")?;
        Ok(state
            .ports
            .values()
            .filter(|p| p.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn update_port_security_groups(&self, port_id: &str, groups: &[String]) -> Result<()> {
        let mut state = self.state();
        state.take_failure("update_port_security_groups")?;
        let port = state
            .ports
            .get_mut(port_id)
            .ok_or_else(|| CloudError::not_found(ResourceKind::Port, port_id))?;
        port.security_groups = groups.to_vec();
        state
            .journal
            .record(ActionType::Update, ResourceKind::Port, port_id);
        Ok(())
    }

    async fn list_floating_ips(&self, port_id: &str) -> Result<Vec<FloatingIp>> {
        let mut state = self.state();
        state.take_failure("list_floating_ips")?;
        Ok(state
            .floating_ips
            .values()
            .filter(|f| f.port_id.as_deref() == Some(port_id))
            .cloned()
            .collect())
    }

    async fn create_floating_ip(
        &self,
        floating_network_id: &str,
        port_id: &str,
    ) -> Result<FloatingIp> {
        let mut state = self.state();
        state.take_failure("create_floating_ip")?;
        let id = state.next("fip");
        let fip = FloatingIp {
            floating_ip_address: format!("172.24.4.{}", state.next_id % 250 + 1),
            id: id.clone(),
            floating_network_id: floating_network_id.to_string(),
            port_id: Some(port_id.to_string()),
        };
        state
            .journal
            .record(ActionType::Create, ResourceKind::FloatingIp, &id);
        state.floating_ips.insert(id, fip.clone());
        Ok(fip)
    }

    async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("delete_floating_ip")?;
        if state.floating_ips.remove(id).is_none() {
            return Err(CloudError::not_found(ResourceKind::FloatingIp, id));
        }
        state
            .journal
            .record(ActionType::Delete, ResourceKind::FloatingIp, id);
        Ok(())
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet> {
        let mut state = self.state();
        state.take_failure("get_subnet")?;
        state
            .subnets
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ResourceKind::Subnet, id))
    }

    async fn list_secrets(&self, name: &str) -> Result<Vec<StoredSecret>> {
        let mut state = self.state();
        state.take_failure("list_secrets")?;
        Ok(state
            .secrets
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn create_secret(&self, req: &SecretCreate) -> Result<StoredSecret> {
        let mut state = self.state();
        state.take_failure("create_secret")?;
        let id = state.next("secret");
        let secret = StoredSecret {
            secret_ref: format!("https://key-manager.test/v1/secrets/{}", id),
            name: req.name.clone(),
        };
        state
            .journal
            .record(ActionType::Create, ResourceKind::Secret, &secret.secret_ref);
        state
            .secrets
            .insert(secret.secret_ref.clone(), secret.clone());
        Ok(secret)
    }

    async fn delete_secret(&self, secret_ref: &str) -> Result<()> {
        let mut state = self.state();
        state.take_failure("delete_secret")?;
        if state.secrets.remove(secret_ref).is_none() {
            return Err(CloudError::not_found(ResourceKind::Secret, secret_ref));
        }
        state
            .journal
            .record(ActionType::Delete, ResourceKind::Secret, secret_ref);
        Ok(())
    }
}
