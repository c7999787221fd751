//! Load balancer, network and credential-store resource types
//!
//! These are provider-neutral views of the resources the controller manages.
//! Provider crates map their wire formats onto them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provisioning status reported by the load-balancing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    Active,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Error,
    Deleted,
}

impl ProvisioningStatus {
    /// Whether the service has finished applying changes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::Active | ProvisioningStatus::Error | ProvisioningStatus::Deleted
        )
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisioningStatus::Active => write!(f, "ACTIVE"),
            ProvisioningStatus::PendingCreate => write!(f, "PENDING_CREATE"),
            ProvisioningStatus::PendingUpdate => write!(f, "PENDING_UPDATE"),
            ProvisioningStatus::PendingDelete => write!(f, "PENDING_DELETE"),
            ProvisioningStatus::Error => write!(f, "ERROR"),
            ProvisioningStatus::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Top-level load balancer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vip_address: String,
    pub vip_port_id: String,
    pub vip_subnet_id: String,
    pub provisioning_status: ProvisioningStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerCreate {
    pub name: String,
    pub description: String,
    pub vip_subnet_id: String,
    /// Provider driver (e.g. "amphora", "ovn"); service default when unset
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenerProtocol {
    Http,
    TerminatedHttps,
}

impl ListenerProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            ListenerProtocol::Http => 80,
            ListenerProtocol::TerminatedHttps => 443,
        }
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::TerminatedHttps => "TERMINATED_HTTPS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    pub name: String,
    pub loadbalancer_id: String,
    pub protocol: ListenerProtocol,
    pub protocol_port: u16,
    pub default_pool_id: Option<String>,
    pub default_tls_container_ref: Option<String>,
    #[serde(default)]
    pub sni_container_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerCreate {
    pub name: String,
    pub loadbalancer_id: String,
    pub protocol: ListenerProtocol,
    pub protocol_port: u16,
    pub default_tls_container_ref: Option<String>,
    pub sni_container_refs: Vec<String>,
}

/// TLS reference update for an existing listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerTlsUpdate {
    pub default_tls_container_ref: Option<String>,
    pub sni_container_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub loadbalancer_id: String,
    /// Set for a listener's default pool, unset for shared pools
    pub listener_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolCreate {
    pub name: String,
    pub loadbalancer_id: String,
    pub listener_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub address: String,
    pub protocol_port: u16,
}

/// Desired pool member in a batch replace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    pub address: String,
    pub protocol_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7Policy {
    pub id: String,
    pub name: String,
    pub listener_id: String,
    pub redirect_pool_id: Option<String>,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L7PolicyCreate {
    pub name: String,
    pub listener_id: String,
    pub redirect_pool_id: String,
    pub position: u32,
}

/// Closed set of rule types the controller generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum L7RuleType {
    HostName,
    Path,
}

impl L7RuleType {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            L7RuleType::HostName => "HOST_NAME",
            L7RuleType::Path => "PATH",
        }
    }

    /// Comparison each rule type is evaluated with
    pub fn compare_type(&self) -> L7CompareType {
        match self {
            L7RuleType::HostName => L7CompareType::Regex,
            L7RuleType::Path => L7CompareType::StartsWith,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum L7CompareType {
    Regex,
    StartsWith,
    EqualTo,
}

impl L7CompareType {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            L7CompareType::Regex => "REGEX",
            L7CompareType::StartsWith => "STARTS_WITH",
            L7CompareType::EqualTo => "EQUAL_TO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7Rule {
    pub id: String,
    pub rule_type: L7RuleType,
    pub compare_type: L7CompareType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7RuleCreate {
    pub rule_type: L7RuleType,
    pub compare_type: L7CompareType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    /// "ingress" or "egress"
    pub direction: String,
    pub protocol: Option<String>,
    pub port_range_min: Option<u16>,
    pub port_range_max: Option<u16>,
    pub remote_ip_prefix: Option<String>,
}

impl SecurityGroupRule {
    /// The single TCP port an ingress rule opens, if it is one
    pub fn tcp_ingress_port(&self) -> Option<u16> {
        if self.direction != "ingress" || self.protocol.as_deref() != Some("tcp") {
            return None;
        }
        match (self.port_range_min, self.port_range_max) {
            (Some(min), Some(max)) if min == max => Some(min),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupRuleCreate {
    pub security_group_id: String,
    pub direction: String,
    pub ethertype: String,
    pub protocol: String,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub remote_ip_prefix: String,
}

impl SecurityGroupRuleCreate {
    /// IPv4 TCP ingress rule for a single port
    pub fn tcp_ingress(security_group_id: &str, port: u16, cidr: &str) -> Self {
        Self {
            security_group_id: security_group_id.to_string(),
            direction: "ingress".to_string(),
            ethertype: "IPv4".to_string(),
            protocol: "tcp".to_string(),
            port_range_min: port,
            port_range_max: port,
            remote_ip_prefix: cidr.to_string(),
        }
    }
}

/// Network port attached to a compute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPort {
    pub id: String,
    pub device_id: String,
    #[serde(default)]
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    pub floating_network_id: String,
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub cidr: String,
}

/// Entry in the credential store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub secret_ref: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretCreate {
    pub name: String,
    /// Base64 encoded payload
    pub payload: String,
    pub payload_content_type: String,
    pub payload_content_encoding: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_status_terminal() {
        assert!(ProvisioningStatus::Active.is_terminal());
        assert!(ProvisioningStatus::Error.is_terminal());
        assert!(ProvisioningStatus::PendingUpdate.is_pending());
        assert!(ProvisioningStatus::PendingCreate.is_pending());
    }

    #[test]
    fn test_provisioning_status_wire_format() {
        let status: ProvisioningStatus = serde_json::from_str("\"PENDING_UPDATE\"").unwrap();
        assert_eq!(status, ProvisioningStatus::PendingUpdate);
        assert_eq!(
            serde_json::to_string(&ListenerProtocol::TerminatedHttps).unwrap(),
            "\"TERMINATED_HTTPS\""
        );
    }

    #[test]
    fn test_tcp_ingress_port() {
        let mut rule = SecurityGroupRule {
            id: "r1".into(),
            security_group_id: "sg".into(),
            direction: "ingress".into(),
            protocol: Some("tcp".into()),
            port_range_min: Some(30080),
            port_range_max: Some(30080),
            remote_ip_prefix: Some("10.0.0.0/24".into()),
        };
        assert_eq!(rule.tcp_ingress_port(), Some(30080));

        rule.port_range_max = Some(30090);
        assert_eq!(rule.tcp_ingress_port(), None);

        rule.port_range_max = Some(30080);
        rule.direction = "egress".into();
        assert_eq!(rule.tcp_ingress_port(), None);
    }
}
