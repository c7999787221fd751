//! Contracts of the cluster-side services the controller consumes
//!
//! The Kubernetes implementations live in `routeflow-kube`; tests supply
//! in-process fakes.

use crate::error::Result;
use crate::route::{BackendPort, RouteSpec};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node label marking control-plane nodes
pub const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";
/// Legacy control-plane label
pub const LABEL_MASTER: &str = "node-role.kubernetes.io/master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    InternalIp,
    ExternalIp,
    Hostname,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub kind: AddressKind,
    pub address: String,
}

/// Inventory entry for one cluster node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeInfo {
    pub name: String,
    pub addresses: Vec<NodeAddress>,
    /// Compute instance id taken from the node's provider id
    pub instance_id: Option<String>,
    pub unschedulable: bool,
    pub ready: bool,
    pub labels: BTreeMap<String, String>,
}

impl NodeInfo {
    pub fn is_control_plane(&self) -> bool {
        self.labels.contains_key(LABEL_CONTROL_PLANE) || self.labels.contains_key(LABEL_MASTER)
    }

    /// First internal address, falling back to an external one
    pub fn preferred_address(&self) -> Option<&str> {
        [AddressKind::InternalIp, AddressKind::ExternalIp]
            .iter()
            .find_map(|kind| {
                self.addresses
                    .iter()
                    .find(|a| a.kind == *kind && !a.address.is_empty())
            })
            .map(|a| a.address.as_str())
    }
}

#[async_trait]
pub trait NodeLister: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;
}

/// Resolves a service port to the node port it is exposed on
#[async_trait]
pub trait ServicePortResolver: Send + Sync {
    async fn node_port(&self, namespace: &str, service: &str, port: &BackendPort) -> Result<u16>;
}

/// PEM encoded certificate chain and private key
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub certificate: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Reads TLS secrets; a missing secret is [`Error::SecretNotFound`](crate::Error)
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn read_tls(&self, namespace: &str, name: &str) -> Result<TlsMaterial>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Event reasons recorded on routes
pub mod reasons {
    pub const CREATING: &str = "Creating";
    pub const CREATED: &str = "Created";
    pub const UPDATING: &str = "Updating";
    pub const UPDATED: &str = "Updated";
    pub const FAILED: &str = "Failed";
    pub const DELETED: &str = "Deleted";
    /// Retries exhausted or error not retryable
    pub const GIVING_UP: &str = "GivingUp";
}

/// Where reconciliation results are reported back to the cluster
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Publishes the address clients reach the route on
    async fn record_address(&self, route: &RouteSpec, address: &str) -> Result<()>;

    /// Fire-and-forget: implementations log failures instead of returning them
    async fn record_event(
        &self,
        route: &RouteSpec,
        event_type: EventType,
        reason: &str,
        message: String,
    );
}

/// The cluster-side services a controller needs
#[derive(Clone)]
pub struct Collaborators {
    pub nodes: Arc<dyn NodeLister>,
    pub services: Arc<dyn ServicePortResolver>,
    pub secrets: Arc<dyn SecretReader>,
    pub status: Arc<dyn StatusSink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_address_falls_back_to_external() {
        let mut node = NodeInfo {
            name: "n1".into(),
            addresses: vec![
                NodeAddress {
                    kind: AddressKind::Hostname,
                    address: "n1".into(),
                },
                NodeAddress {
                    kind: AddressKind::ExternalIp,
                    address: "203.0.113.7".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(node.preferred_address(), Some("203.0.113.7"));

        node.addresses.push(NodeAddress {
            kind: AddressKind::InternalIp,
            address: "10.0.0.7".into(),
        });
        assert_eq!(node.preferred_address(), Some("10.0.0.7"));

        node.addresses.clear();
        assert_eq!(node.preferred_address(), None);
    }

    #[test]
    fn test_control_plane_labels() {
        let mut node = NodeInfo::default();
        assert!(!node.is_control_plane());
        node.labels.insert(LABEL_MASTER.into(), String::new());
        assert!(node.is_control_plane());
    }

    #[test]
    fn test_tls_material_debug_redacts_key() {
        let material = TlsMaterial {
            certificate: b"cert".to_vec(),
            private_key: b"secret-key".to_vec(),
        };
        let printed = format!("{:?}", material);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("4 bytes"));
    }
}
