//! Request and response bodies of the Octavia, Neutron and Barbican APIs

use routeflow_cloud::{
    FloatingIp, L7CompareType, L7Policy, L7Rule, L7RuleType, Listener, ListenerProtocol,
    LoadBalancer, Member, NetworkPort, Pool, ProvisioningStatus, SecurityGroup,
    SecurityGroupRule, StoredSecret, Subnet,
};
use serde::{Deserialize, Serialize};

// ============ Octavia ============

#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerList {
    pub loadbalancers: Vec<ApiLoadBalancer>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerBody {
    pub loadbalancer: ApiLoadBalancer,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiLoadBalancer {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    vip_address: Option<String>,
    #[serde(default)]
    vip_port_id: Option<String>,
    #[serde(default)]
    vip_subnet_id: Option<String>,
    provisioning_status: ProvisioningStatus,
}

impl From<ApiLoadBalancer> for LoadBalancer {
    fn from(lb: ApiLoadBalancer) -> Self {
        LoadBalancer {
            id: lb.id,
            name: lb.name,
            description: lb.description.unwrap_or_default(),
            vip_address: lb.vip_address.unwrap_or_default(),
            vip_port_id: lb.vip_port_id.unwrap_or_default(),
            vip_subnet_id: lb.vip_subnet_id.unwrap_or_default(),
            provisioning_status: lb.provisioning_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateLoadBalancer<'a> {
    pub loadbalancer: CreateLoadBalancerBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateLoadBalancerBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub vip_subnet_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateLoadBalancer<'a> {
    pub loadbalancer: UpdateDescription<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateDescription<'a> {
    pub description: &'a str,
}

/// `{"id": ...}` reference used in Octavia relationship arrays
#[derive(Debug, Deserialize)]
pub(crate) struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListenerList {
    pub listeners: Vec<ApiListener>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListenerBody {
    pub listener: ApiListener,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiListener {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    loadbalancers: Vec<IdRef>,
    protocol: String,
    protocol_port: u16,
    #[serde(default)]
    default_pool_id: Option<String>,
    #[serde(default)]
    default_tls_container_ref: Option<String>,
    #[serde(default)]
    sni_container_refs: Vec<String>,
}

impl ApiListener {
    /// Converts listeners speaking a protocol routeflow manages; others yield `None`
    pub fn into_model(self) -> Option<Listener> {
        let protocol = match self.protocol.as_str() {
            "HTTP" => ListenerProtocol::Http,
            "TERMINATED_HTTPS" => ListenerProtocol::TerminatedHttps,
            other => {
                tracing::debug!(listener = %self.id, protocol = other, "Skipping unmanaged listener");
                return None;
            }
        };
        Some(Listener {
            loadbalancer_id: self
                .loadbalancers
                .into_iter()
                .next()
                .map(|r| r.id)
                .unwrap_or_default(),
            id: self.id,
            name: self.name,
            protocol,
            protocol_port: self.protocol_port,
            default_pool_id: self.default_pool_id,
            default_tls_container_ref: self.default_tls_container_ref,
            sni_container_refs: self.sni_container_refs,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateListener<'a> {
    pub listener: CreateListenerBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateListenerBody<'a> {
    pub name: &'a str,
    pub loadbalancer_id: &'a str,
    pub protocol: &'static str,
    pub protocol_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tls_container_ref: Option<&'a str>,
    #[serde(skip_serializing_if = "no_refs")]
    pub sni_container_refs: &'a [String],
}

fn no_refs(refs: &&[String]) -> bool {
    refs.is_empty()
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateListener<'a> {
    pub listener: UpdateListenerTls<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateListenerTls<'a> {
    pub default_tls_container_ref: Option<&'a str>,
    pub sni_container_refs: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct PoolList {
    pub pools: Vec<ApiPool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PoolBody {
    pub pool: ApiPool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPool {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    loadbalancers: Vec<IdRef>,
    #[serde(default)]
    listeners: Vec<IdRef>,
}

impl From<ApiPool> for Pool {
    fn from(pool: ApiPool) -> Self {
        Pool {
            id: pool.id,
            name: pool.name,
            loadbalancer_id: pool
                .loadbalancers
                .into_iter()
                .next()
                .map(|r| r.id)
                .unwrap_or_default(),
            listener_id: pool.listeners.into_iter().next().map(|r| r.id),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePool<'a> {
    pub pool: CreatePoolBody<'a>,
}

/// Octavia takes exactly one of `loadbalancer_id` or `listener_id`
#[derive(Debug, Serialize)]
pub(crate) struct CreatePoolBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loadbalancer_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener_id: Option<&'a str>,
    pub protocol: &'static str,
    pub lb_algorithm: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberList {
    pub members: Vec<ApiMember>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMember {
    id: String,
    #[serde(default)]
    name: String,
    address: String,
    protocol_port: u16,
}

impl From<ApiMember> for Member {
    fn from(m: ApiMember) -> Self {
        Member {
            id: m.id,
            name: m.name,
            address: m.address,
            protocol_port: m.protocol_port,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplaceMembers<'a> {
    pub members: Vec<MemberBody<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MemberBody<'a> {
    pub name: &'a str,
    pub address: &'a str,
    pub protocol_port: u16,
}

#[derive(Debug, Deserialize)]
pub(crate) struct L7PolicyList {
    pub l7policies: Vec<ApiL7Policy>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct L7PolicyBody {
    pub l7policy: ApiL7Policy,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiL7Policy {
    id: String,
    #[serde(default)]
    name: String,
    listener_id: String,
    #[serde(default)]
    redirect_pool_id: Option<String>,
    #[serde(default)]
    position: u32,
}

impl From<ApiL7Policy> for L7Policy {
    fn from(p: ApiL7Policy) -> Self {
        L7Policy {
            id: p.id,
            name: p.name,
            listener_id: p.listener_id,
            redirect_pool_id: p.redirect_pool_id,
            position: p.position,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateL7Policy<'a> {
    pub l7policy: CreateL7PolicyBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateL7PolicyBody<'a> {
    pub name: &'a str,
    pub listener_id: &'a str,
    pub action: &'static str,
    pub redirect_pool_id: &'a str,
    pub position: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct L7RuleList {
    pub rules: Vec<ApiL7Rule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct L7RuleBody {
    pub rule: ApiL7Rule,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiL7Rule {
    id: String,
    #[serde(rename = "type")]
    rule_type: L7RuleType,
    compare_type: L7CompareType,
    value: String,
}

impl From<ApiL7Rule> for L7Rule {
    fn from(r: ApiL7Rule) -> Self {
        L7Rule {
            id: r.id,
            rule_type: r.rule_type,
            compare_type: r.compare_type,
            value: r.value,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateL7Rule<'a> {
    pub rule: CreateL7RuleBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateL7RuleBody<'a> {
    #[serde(rename = "type")]
    pub rule_type: &'static str,
    pub compare_type: &'static str,
    pub value: &'a str,
}

// ============ Neutron ============

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityGroupList {
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityGroupBody {
    pub security_group: SecurityGroup,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSecurityGroup<'a> {
    pub security_group: CreateSecurityGroupBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSecurityGroupBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityGroupRuleList {
    pub security_group_rules: Vec<SecurityGroupRule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityGroupRuleBody {
    pub security_group_rule: SecurityGroupRule,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSecurityGroupRule<'a> {
    pub security_group_rule: &'a routeflow_cloud::SecurityGroupRuleCreate,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortList {
    pub ports: Vec<NetworkPort>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdatePort<'a> {
    pub port: UpdatePortGroups<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdatePortGroups<'a> {
    pub security_groups: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct FloatingIpList {
    pub floatingips: Vec<FloatingIp>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FloatingIpBody {
    pub floatingip: FloatingIp,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateFloatingIp<'a> {
    pub floatingip: CreateFloatingIpBody<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateFloatingIpBody<'a> {
    pub floating_network_id: &'a str,
    pub port_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubnetBody {
    pub subnet: Subnet,
}

// ============ Barbican ============

#[derive(Debug, Deserialize)]
pub(crate) struct SecretList {
    #[serde(default)]
    pub secrets: Vec<ApiSecret>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiSecret {
    secret_ref: String,
    #[serde(default)]
    name: Option<String>,
}

impl From<ApiSecret> for StoredSecret {
    fn from(s: ApiSecret) -> Self {
        StoredSecret {
            secret_ref: s.secret_ref,
            name: s.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecretRef {
    pub secret_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_takes_first_load_balancer() {
        let body = r#"{
            "listener": {
                "id": "l-1",
                "name": "kube_ingress_c_ns_web",
                "loadbalancers": [{"id": "lb-9"}],
                "protocol": "TERMINATED_HTTPS",
                "protocol_port": 443,
                "default_pool_id": null,
                "default_tls_container_ref": "https://kms/v1/secrets/a",
                "sni_container_refs": ["https://kms/v1/secrets/a"]
            }
        }"#;
        let parsed: ListenerBody = serde_json::from_str(body).unwrap();
        let listener = parsed.listener.into_model().unwrap();

        assert_eq!(listener.loadbalancer_id, "lb-9");
        assert_eq!(listener.protocol, ListenerProtocol::TerminatedHttps);
        assert_eq!(listener.sni_container_refs.len(), 1);
    }

    #[test]
    fn test_foreign_listener_protocol_is_skipped() {
        let body = r#"{"listeners": [
            {"id": "l-1", "protocol": "TCP", "protocol_port": 22, "loadbalancers": []},
            {"id": "l-2", "protocol": "HTTP", "protocol_port": 80, "loadbalancers": []}
        ]}"#;
        let parsed: ListenerList = serde_json::from_str(body).unwrap();
        let listeners: Vec<Listener> = parsed
            .listeners
            .into_iter()
            .filter_map(ApiListener::into_model)
            .collect();

        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].id, "l-2");
    }

    #[test]
    fn test_pool_without_listener_is_shared() {
        let body = r#"{"pool": {"id": "p-1", "name": "shared", "loadbalancers": [{"id": "lb-1"}], "listeners": []}}"#;
        let pool: Pool = serde_json::from_str::<PoolBody>(body).unwrap().pool.into();

        assert_eq!(pool.loadbalancer_id, "lb-1");
        assert!(pool.listener_id.is_none());
    }

    #[test]
    fn test_load_balancer_null_description() {
        let body = r#"{"loadbalancer": {
            "id": "lb-1", "name": "n", "description": null,
            "vip_address": "10.0.0.5", "vip_port_id": "port-1", "vip_subnet_id": "sub-1",
            "provisioning_status": "PENDING_CREATE"
        }}"#;
        let lb: LoadBalancer = serde_json::from_str::<LoadBalancerBody>(body)
            .unwrap()
            .loadbalancer
            .into();

        assert_eq!(lb.description, "");
        assert_eq!(lb.provisioning_status, ProvisioningStatus::PendingCreate);
    }

    #[test]
    fn test_create_pool_sends_one_parent() {
        let body = CreatePool {
            pool: CreatePoolBody {
                name: "p",
                loadbalancer_id: None,
                listener_id: Some("l-1"),
                protocol: "HTTP",
                lb_algorithm: "ROUND_ROBIN",
            },
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["pool"]["listener_id"], "l-1");
        assert!(json["pool"].get("loadbalancer_id").is_none());
    }

    #[test]
    fn test_l7_rule_wire_names() {
        let body = r#"{"rules": [{"id": "r-1", "type": "HOST_NAME", "compare_type": "REGEX", "value": "^a$"}]}"#;
        let parsed: L7RuleList = serde_json::from_str(body).unwrap();
        let rule: L7Rule = parsed.rules.into_iter().next().unwrap().into();

        assert_eq!(rule.rule_type, L7RuleType::HostName);
        assert_eq!(rule.compare_type, L7CompareType::Regex);
    }
}
