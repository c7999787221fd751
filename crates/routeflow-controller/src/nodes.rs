//! Node set tracker
//!
//! Owns the snapshot of ready worker nodes that pool members are built from.
//! The snapshot is published through a `watch` channel; the tracker is its
//! only writer.

use crate::collaborators::{NodeInfo, NodeLister};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// A node eligible to receive traffic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadyNode {
    pub name: String,
    /// `None` when the node reports no usable address
    pub address: Option<String>,
    pub instance_id: Option<String>,
}

impl From<&NodeInfo> for ReadyNode {
    fn from(node: &NodeInfo) -> Self {
        Self {
            name: node.name.clone(),
            address: node.preferred_address().map(str::to_string),
            instance_id: node.instance_id.clone(),
        }
    }
}

/// Result of a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    Unchanged,
    Changed(Vec<ReadyNode>),
    /// The recomputed set was empty and the previous snapshot was kept
    IgnoredEmpty,
}

/// Read side of the node snapshot
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    rx: watch::Receiver<Vec<ReadyNode>>,
}

impl NodeSnapshot {
    /// Ready nodes ordered by name
    pub fn current(&self) -> Vec<ReadyNode> {
        self.rx.borrow().clone()
    }
}

pub struct NodeSetTracker {
    lister: Arc<dyn NodeLister>,
    tx: watch::Sender<Vec<ReadyNode>>,
}

impl NodeSetTracker {
    pub fn new(lister: Arc<dyn NodeLister>) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { lister, tx }
    }

    pub fn subscribe(&self) -> NodeSnapshot {
        NodeSnapshot {
            rx: self.tx.subscribe(),
        }
    }

    /// Lists nodes and keeps the schedulable, ready, non-control-plane ones
    pub async fn current_ready_nodes(&self) -> Result<Vec<ReadyNode>> {
        let nodes = self.lister.list_nodes().await?;
        let mut ready: Vec<ReadyNode> = nodes
            .iter()
            .filter(|node| {
                if node.unschedulable || !node.ready || node.is_control_plane() {
                    tracing::trace!(node = %node.name, "Node not eligible for traffic");
                    return false;
                }
                true
            })
            .map(ReadyNode::from)
            .collect();
        ready.sort();
        ready.dedup_by(|a, b| a.name == b.name);
        Ok(ready)
    }

    /// Recomputes the ready set and publishes it if it changed
    ///
    /// An empty recomputed set is never published.
    pub async fn refresh(&self) -> Result<NodeChange> {
        let ready = self.current_ready_nodes().await?;
        if ready.is_empty() {
            tracing::warn!("No ready nodes found, keeping the previous node set");
            return Ok(NodeChange::IgnoredEmpty);
        }
        if *self.tx.borrow() == ready {
            return Ok(NodeChange::Unchanged);
        }

        tracing::info!(
            count = ready.len(),
            nodes = ?ready.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            "Ready node set changed"
        );
        self.tx.send_replace(ready.clone());
        Ok(NodeChange::Changed(ready))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AddressKind, LABEL_CONTROL_PLANE, NodeAddress};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticNodes(Mutex<Vec<NodeInfo>>);

    impl StaticNodes {
        fn set(&self, nodes: Vec<NodeInfo>) {
            *self.0.lock().unwrap() = nodes;
        }
    }

    #[async_trait]
    impl NodeLister for StaticNodes {
        async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn node(name: &str, ip: &str) -> NodeInfo {
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

    #[tokio::test]
    async fn test_filters_ineligible_nodes() {
        let lister = Arc::new(StaticNodes::default());
        let mut cordoned = node("cordoned", "10.0.0.3");
        cordoned.unschedulable = true;
        let mut not_ready = node("not-ready", "10.0.0.4");
        not_ready.ready = false;
        let mut control = node("control", "10.0.0.5");
        control.labels.insert(LABEL_CONTROL_PLANE.into(), String::new());
        lister.set(vec![
            node("b", "10.0.0.2"),
            cordoned,
            not_ready,
            control,
            node("a", "10.0.0.1"),
        ]);

        let tracker = NodeSetTracker::new(lister);
        let ready = tracker.current_ready_nodes().await.unwrap();

        let names: Vec<&str> = ready.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(ready[0].address.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_refresh_publishes_changes_only() {
        let lister = Arc::new(StaticNodes::default());
        lister.set(vec![node("a", "10.0.0.1")]);
        let tracker = NodeSetTracker::new(lister.clone());
        let snapshot = tracker.subscribe();

        assert!(matches!(tracker.refresh().await.unwrap(), NodeChange::Changed(_)));
        assert_eq!(tracker.refresh().await.unwrap(), NodeChange::Unchanged);
        assert_eq!(snapshot.current().len(), 1);

        lister.set(vec![node("a", "10.0.0.1"), node("b", "10.0.0.2")]);
        assert!(matches!(tracker.refresh().await.unwrap(), NodeChange::Changed(n) if n.len() == 2));
        assert_eq!(snapshot.current().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_set_is_never_published() {
        let lister = Arc::new(StaticNodes::default());
        lister.set(vec![node("a", "10.0.0.1")]);
        let tracker = NodeSetTracker::new(lister.clone());
        let snapshot = tracker.subscribe();
        tracker.refresh().await.unwrap();

        lister.set(Vec::new());
        assert_eq!(tracker.refresh().await.unwrap(), NodeChange::IgnoredEmpty);
        assert_eq!(snapshot.current()[0].name, "a");
    }
}
