//! Node inventory from the Kubernetes API

use crate::error::KubeError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use routeflow_controller::{AddressKind, NodeAddress, NodeInfo, NodeLister, Result};

pub struct KubeNodeLister {
    api: Api<Node>,
}

impl KubeNodeLister {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeLister for KubeNodeLister {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let nodes = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(KubeError::from)?;
        Ok(nodes.items.iter().map(node_info).collect())
    }
}

pub fn node_info(node: &Node) -> NodeInfo {
    let status = node.status.as_ref();
    let spec = node.spec.as_ref();

    let addresses = status
        .and_then(|s| s.addresses.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|a| {
            let kind = match a.type_.as_str() {
                "InternalIP" => AddressKind::InternalIp,
                "ExternalIP" => AddressKind::ExternalIp,
                "Hostname" => AddressKind::Hostname,
                _ => return None,
            };
            Some(NodeAddress {
                kind,
                address: a.address.clone(),
            })
        })
        .collect();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True");

    NodeInfo {
        name: node.name_any(),
        addresses,
        instance_id: spec
            .and_then(|s| s.provider_id.as_deref())
            .and_then(instance_id),
        unschedulable: spec.and_then(|s| s.unschedulable).unwrap_or(false),
        ready,
        labels: node.labels().clone(),
    }
}

/// Instance id from a provider id such as `openstack:///<id>`
pub fn instance_id(provider_id: &str) -> Option<String> {
    let path = provider_id
        .split_once("://")
        .map_or(provider_id, |(_, rest)| rest);
    path.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        NodeAddress as K8sNodeAddress, NodeCondition, NodeSpec, NodeStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn condition(type_: &str, status: &str) -> NodeCondition {
        NodeCondition {
            type_: type_.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_instance_id() {
        assert_eq!(
            instance_id("openstack:///6f1c9e2a").as_deref(),
            Some("6f1c9e2a")
        );
        assert_eq!(
            instance_id("openstack://region-a/6f1c9e2a").as_deref(),
            Some("6f1c9e2a")
        );
        assert_eq!(instance_id("openstack:///"), None);
        assert_eq!(instance_id("").as_deref(), None);
    }

    #[test]
    fn test_node_info() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".into()),
                labels: Some(BTreeMap::from([(
                    "node-role.kubernetes.io/control-plane".to_string(),
                    String::new(),
                )])),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("openstack:///i-1".into()),
                unschedulable: Some(true),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                addresses: Some(vec![
                    K8sNodeAddress {
                        type_: "ExternalIP".into(),
                        address: "203.0.113.5".into(),
                    },
                    K8sNodeAddress {
                        type_: "InternalIP".into(),
                        address: "10.0.0.5".into(),
                    },
                    K8sNodeAddress {
                        type_: "InternalDNS".into(),
                        address: "worker-1.local".into(),
                    },
                ]),
                conditions: Some(vec![
                    condition("MemoryPressure", "False"),
                    condition("Ready", "True"),
                ]),
                ..Default::default()
            }),
        };

        let info = node_info(&node);
        assert_eq!(info.name, "worker-1");
        assert_eq!(info.addresses.len(), 2);
        assert_eq!(info.preferred_address(), Some("10.0.0.5"));
        assert_eq!(info.instance_id.as_deref(), Some("i-1"));
        assert!(info.unschedulable);
        assert!(info.ready);
        assert!(info.is_control_plane());
    }

    #[test]
    fn test_node_without_status_is_not_ready() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-2".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let info = node_info(&node);
        assert!(!info.ready);
        assert!(info.addresses.is_empty());
        assert_eq!(info.instance_id, None);
    }
}
