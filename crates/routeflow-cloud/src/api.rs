//! Cloud resource API trait definition

use crate::error::Result;
use crate::model::{
    FloatingIp, L7Policy, L7PolicyCreate, L7Rule, L7RuleCreate, Listener, ListenerCreate,
    ListenerTlsUpdate, LoadBalancer, LoadBalancerCreate, Member, MemberSpec, NetworkPort, Pool,
    PoolCreate, SecretCreate, SecurityGroup, SecurityGroupRule, SecurityGroupRuleCreate,
    StoredSecret, Subnet,
};
use async_trait::async_trait;

/// Surface of the load-balancing, network and credential-store services
///
/// Every operation maps onto a single remote call. Lookups by name return
/// all matches so callers can detect duplicates; `get_*` and `delete_*`
/// report an absent resource as [`CloudError::NotFound`](crate::CloudError).
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Returns the backend name (e.g. "openstack", "in-memory")
    fn name(&self) -> &str;

    // Load balancers

    async fn list_load_balancers(&self, name: &str) -> Result<Vec<LoadBalancer>>;

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer>;

    async fn create_load_balancer(&self, req: &LoadBalancerCreate) -> Result<LoadBalancer>;

    async fn update_load_balancer_description(&self, id: &str, description: &str) -> Result<()>;

    async fn delete_load_balancer(&self, id: &str) -> Result<()>;

    // Listeners

    async fn list_listeners(&self, loadbalancer_id: &str) -> Result<Vec<Listener>>;

    async fn create_listener(&self, req: &ListenerCreate) -> Result<Listener>;

    async fn update_listener_tls(&self, id: &str, update: &ListenerTlsUpdate) -> Result<()>;

    async fn delete_listener(&self, id: &str) -> Result<()>;

    // Pools and members

    async fn list_pools(&self, loadbalancer_id: &str) -> Result<Vec<Pool>>;

    async fn create_pool(&self, req: &PoolCreate) -> Result<Pool>;

    async fn delete_pool(&self, id: &str) -> Result<()>;

    async fn list_members(&self, pool_id: &str) -> Result<Vec<Member>>;

    /// Replaces the full member list of a pool in one call
    async fn replace_members(&self, pool_id: &str, members: &[MemberSpec]) -> Result<()>;

    // L7 routing

    async fn list_l7_policies(&self, listener_id: &str) -> Result<Vec<L7Policy>>;

    async fn create_l7_policy(&self, req: &L7PolicyCreate) -> Result<L7Policy>;

    async fn delete_l7_policy(&self, id: &str) -> Result<()>;

    async fn list_l7_rules(&self, policy_id: &str) -> Result<Vec<L7Rule>>;

    async fn create_l7_rule(&self, policy_id: &str, req: &L7RuleCreate) -> Result<L7Rule>;

    // Security groups

    /// Groups carrying every tag in `tags`
    async fn list_security_groups(&self, tags: &[String]) -> Result<Vec<SecurityGroup>>;

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    async fn add_security_group_tag(&self, id: &str, tag: &str) -> Result<()>;

    async fn delete_security_group(&self, id: &str) -> Result<()>;

    async fn list_security_group_rules(&self, security_group_id: &str)
    -> Result<Vec<SecurityGroupRule>>;

    async fn create_security_group_rule(
        &self,
        req: &SecurityGroupRuleCreate,
    ) -> Result<SecurityGroupRule>;

    async fn delete_security_group_rule(&self, id: &str) -> Result<()>;

    // Network ports and addresses

    /// Ports attached to a compute instance
    async fn list_ports(&self, device_id: &str) -> Result<Vec<NetworkPort>>;

    async fn update_port_security_groups(&self, port_id: &str, groups: &[String]) -> Result<()>;

    /// Floating IPs bound to a port
    async fn list_floating_ips(&self, port_id: &str) -> Result<Vec<FloatingIp>>;

    async fn create_floating_ip(&self, floating_network_id: &str, port_id: &str)
    -> Result<FloatingIp>;

    async fn delete_floating_ip(&self, id: &str) -> Result<()>;

    async fn get_subnet(&self, id: &str) -> Result<Subnet>;

    // Credential store

    async fn list_secrets(&self, name: &str) -> Result<Vec<StoredSecret>>;

    async fn create_secret(&self, req: &SecretCreate) -> Result<StoredSecret>;

    async fn delete_secret(&self, secret_ref: &str) -> Result<()>;
}
