//! Service port → node port resolution

use crate::error::KubeError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use routeflow_controller::{BackendPort, Error, Result, ServicePortResolver};

pub struct KubeServiceResolver {
    client: Client,
}

impl KubeServiceResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServicePortResolver for KubeServiceResolver {
    async fn node_port(&self, namespace: &str, service: &str, port: &BackendPort) -> Result<u16> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let resolution_error = |reason: String| Error::ServiceResolution {
            namespace: namespace.to_string(),
            service: service.to_string(),
            port: port.to_string(),
            reason,
        };

        let svc = api
            .get_opt(service)
            .await
            .map_err(KubeError::from)?
            .ok_or_else(|| resolution_error("service not found".to_string()))?;
        resolve_node_port(&svc, port).map_err(resolution_error)
    }
}

/// Node port exposing `port` of `service`
pub fn resolve_node_port(service: &Service, port: &BackendPort) -> std::result::Result<u16, String> {
    let ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let found = ports.iter().find(|p| match port {
        BackendPort::Number(n) => p.port == i32::from(*n),
        BackendPort::Name(name) => p.name.as_deref() == Some(name.as_str()),
    });
    let Some(found) = found else {
        return Err("service has no such port".to_string());
    };

    match found.node_port {
        Some(node_port) => u16::try_from(node_port)
            .map_err(|_| format!("node port {} out of range", node_port)),
        None => Err("port has no node port; service must be of type NodePort or LoadBalancer".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};

    fn service(ports: Vec<ServicePort>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn port(name: Option<&str>, port: i32, node_port: Option<i32>) -> ServicePort {
        ServicePort {
            name: name.map(str::to_string),
            port,
            node_port,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_by_number_and_name() {
        let svc = service(vec![
            port(Some("http"), 80, Some(30080)),
            port(Some("https"), 443, Some(30443)),
        ]);

        assert_eq!(resolve_node_port(&svc, &BackendPort::Number(80)), Ok(30080));
        assert_eq!(
            resolve_node_port(&svc, &BackendPort::Name("https".into())),
            Ok(30443)
        );
    }

    #[test]
    fn test_resolution_failures() {
        let svc = service(vec![port(Some("http"), 80, None)]);

        assert!(resolve_node_port(&svc, &BackendPort::Number(8080)).is_err());
        let err = resolve_node_port(&svc, &BackendPort::Number(80)).unwrap_err();
        assert!(err.contains("NodePort"));
        assert!(resolve_node_port(&Service::default(), &BackendPort::Number(80)).is_err());
    }
}
