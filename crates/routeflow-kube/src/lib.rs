//! Kubernetes side of routeflow
//!
//! Implements the controller's collaborator traits against the Kubernetes
//! API and watches Ingress objects of the configured class.

pub mod error;
pub mod ingress;
pub mod nodes;
pub mod secrets;
pub mod services;
pub mod status;
pub mod watcher;

pub use error::{KubeError, Result};
pub use ingress::{ANNOTATION_INGRESS_CLASS, ingress_class, ingress_to_route, is_managed};
pub use nodes::KubeNodeLister;
pub use secrets::KubeSecretReader;
pub use services::KubeServiceResolver;
pub use status::KubeStatusSink;
pub use watcher::{IngressState, IngressWatcher};

use kube::Client;
use routeflow_controller::Collaborators;
use std::sync::Arc;

/// All collaborators, backed by one client
pub fn collaborators(client: Client) -> Collaborators {
    Collaborators {
        nodes: Arc::new(KubeNodeLister::new(client.clone())),
        services: Arc::new(KubeServiceResolver::new(client.clone())),
        secrets: Arc::new(KubeSecretReader::new(client.clone())),
        status: Arc::new(KubeStatusSink::new(client)),
    }
}
