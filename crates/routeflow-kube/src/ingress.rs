//! Ingress → RouteSpec conversion
//!
//! The controller core never sees Kubernetes types; this module flattens an
//! `networking.k8s.io/v1` Ingress into the route model it reconciles.

use crate::error::{KubeError, Result};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::ResourceExt;
use routeflow_controller::{
    ANNOTATION_INTERNAL, ANNOTATION_MANAGE_SECURITY_GROUPS, Backend, BackendPort, RouteKey,
    RouteSpec, TlsSource,
};

/// Legacy class annotation, preferred over `spec.ingressClassName`
pub const ANNOTATION_INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

const KIND: &str = "Ingress";

pub fn route_key(ingress: &Ingress) -> RouteKey {
    RouteKey::new(
        ingress.namespace().unwrap_or_else(|| "default".to_string()),
        ingress.name_any(),
    )
}

/// Class the ingress asks to be served by, if any
pub fn ingress_class(ingress: &Ingress) -> Option<&str> {
    ingress
        .annotations()
        .get(ANNOTATION_INGRESS_CLASS)
        .map(String::as_str)
        .or_else(|| ingress.spec.as_ref()?.ingress_class_name.as_deref())
}

pub fn is_managed(ingress: &Ingress, class: &str) -> bool {
    ingress_class(ingress) == Some(class)
}

/// Builds the desired route of `ingress`
///
/// The resource version becomes the route's version marker. Rules with
/// several paths produce one route rule per path.
pub fn ingress_to_route(ingress: &Ingress, cluster: &str) -> Result<RouteSpec> {
    let key = route_key(ingress);
    let mut route = RouteSpec::new(
        key.clone(),
        cluster,
        ingress.resource_version().unwrap_or_default(),
    );
    route.uid = ingress.uid();

    let annotations = ingress.annotations();
    route.internal = bool_annotation(&key, annotations.get(ANNOTATION_INTERNAL))?.unwrap_or(false);
    route.manage_security_groups =
        bool_annotation(&key, annotations.get(ANNOTATION_MANAGE_SECURITY_GROUPS))?;

    let Some(spec) = ingress.spec.as_ref() else {
        return Ok(route);
    };

    if let Some(default) = &spec.default_backend {
        route.default_backend = Some(backend(&key, default)?);
    }

    for rule in spec.rules.iter().flatten() {
        let host = rule.host.as_deref().unwrap_or_default();
        for path in rule.http.iter().flat_map(|http| &http.paths) {
            let target = backend(&key, &path.backend)?;
            route = route.with_rule(host, path.path.as_deref().unwrap_or_default(), target);
        }
    }

    for tls in spec.tls.iter().flatten() {
        let Some(secret) = tls.secret_name.as_deref().filter(|s| !s.is_empty()) else {
            tracing::warn!(route = %key, "Skipping TLS entry without secretName");
            continue;
        };
        let source = if secret.contains("://") {
            TlsSource::ContainerRef(secret.to_string())
        } else {
            TlsSource::Secret {
                name: secret.to_string(),
            }
        };
        let hosts: Vec<&str> = tls.hosts.iter().flatten().map(String::as_str).collect();
        route = route.with_tls(&hosts, source);
    }

    Ok(route)
}

fn backend(key: &RouteKey, backend: &IngressBackend) -> Result<Backend> {
    let Some(service) = &backend.service else {
        return Err(KubeError::invalid(
            KIND,
            key.to_string(),
            "only service backends are supported",
        ));
    };
    let port = match service.port.as_ref() {
        Some(port) => match (&port.name, port.number) {
            (_, Some(number)) => u16::try_from(number).map(BackendPort::Number).map_err(|_| {
                KubeError::invalid(KIND, key.to_string(), format!("port {} out of range", number))
            })?,
            (Some(name), None) => BackendPort::Name(name.clone()),
            (None, None) => {
                return Err(KubeError::invalid(
                    KIND,
                    key.to_string(),
                    format!("service {} has an empty port", service.name),
                ));
            }
        },
        None => {
            return Err(KubeError::invalid(
                KIND,
                key.to_string(),
                format!("service {} has no port", service.name),
            ));
        }
    };
    Ok(Backend::new(service.name.clone(), port))
}

fn bool_annotation(key: &RouteKey, value: Option<&String>) -> Result<Option<bool>> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(KubeError::invalid(
            KIND,
            key.to_string(),
            format!("annotation value {:?} is not a boolean", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressServiceBackend, IngressSpec,
        IngressTLS, ServiceBackendPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn service(name: &str, number: Option<i32>, port_name: Option<&str>) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: name.to_string(),
                port: Some(ServiceBackendPort {
                    number,
                    name: port_name.map(str::to_string),
                }),
            }),
            ..Default::default()
        }
    }

    fn path(path: &str, backend: IngressBackend) -> HTTPIngressPath {
        HTTPIngressPath {
            path: Some(path.to_string()),
            path_type: "Prefix".to_string(),
            backend,
        }
    }

    fn shop_ingress() -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("shop".into()),
                resource_version: Some("1207".into()),
                uid: Some("uid-1".into()),
                annotations: Some(BTreeMap::from([(
                    ANNOTATION_INGRESS_CLASS.to_string(),
                    "openstack".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                default_backend: Some(service("web", None, Some("http"))),
                rules: Some(vec![IngressRule {
                    host: Some("shop.example.com".into()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![
                            path("/api", service("api", Some(80), None)),
                            path("/static", service("cdn", Some(8080), None)),
                        ],
                    }),
                }]),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec!["shop.example.com".into()]),
                    secret_name: Some("shop-tls".into()),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn annotate(ingress: &mut Ingress, key: &str, value: &str) {
        ingress
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    #[test]
    fn test_ingress_to_route() {
        let route = ingress_to_route(&shop_ingress(), "prod").unwrap();

        assert_eq!(route.key, RouteKey::new("shop", "web"));
        assert_eq!(route.version, "1207");
        assert_eq!(route.uid.as_deref(), Some("uid-1"));
        assert_eq!(route.loadbalancer_name(), "kube_ingress_prod_shop_web");
        assert_eq!(
            route.default_backend,
            Some(Backend::new("web", BackendPort::Name("http".into())))
        );
        assert_eq!(route.rules.len(), 2);
        assert_eq!(route.rules[0].host, "shop.example.com");
        assert_eq!(route.rules[0].path, "/api");
        assert_eq!(
            route.rules[1].backend,
            Backend::new("cdn", BackendPort::Number(8080))
        );
        assert_eq!(route.tls.len(), 1);
        assert_eq!(
            route.tls[0].source,
            TlsSource::Secret {
                name: "shop-tls".into()
            }
        );
        assert!(!route.internal);
        assert_eq!(route.manage_security_groups, None);
        route.validate().unwrap();
    }

    #[test]
    fn test_annotations() {
        let mut ingress = shop_ingress();
        annotate(&mut ingress, ANNOTATION_INTERNAL, "true");
        annotate(&mut ingress, ANNOTATION_MANAGE_SECURITY_GROUPS, "False");

        let route = ingress_to_route(&ingress, "prod").unwrap();
        assert!(route.internal);
        assert_eq!(route.manage_security_groups, Some(false));

        annotate(&mut ingress, ANNOTATION_INTERNAL, "yes please");
        assert!(matches!(
            ingress_to_route(&ingress, "prod"),
            Err(KubeError::Invalid { .. })
        ));
    }

    #[test]
    fn test_container_reference_tls() {
        let mut ingress = shop_ingress();
        let container = "https://keys.example.com/v1/containers/abc";
        ingress.spec.as_mut().unwrap().tls = Some(vec![
            IngressTLS {
                hosts: None,
                secret_name: Some(container.into()),
            },
            IngressTLS {
                hosts: None,
                secret_name: None,
            },
        ]);

        let route = ingress_to_route(&ingress, "prod").unwrap();
        assert_eq!(route.tls.len(), 1);
        assert_eq!(
            route.tls[0].source,
            TlsSource::ContainerRef(container.into())
        );
    }

    #[test]
    fn test_resource_backend_is_rejected() {
        let mut ingress = shop_ingress();
        ingress.spec.as_mut().unwrap().default_backend = Some(IngressBackend::default());
        assert!(ingress_to_route(&ingress, "prod").is_err());
    }

    #[test]
    fn test_class_filter() {
        let mut ingress = shop_ingress();
        assert!(is_managed(&ingress, "openstack"));
        assert!(!is_managed(&ingress, "nginx"));

        ingress.metadata.annotations = None;
        assert_eq!(ingress_class(&ingress), None);

        ingress.spec.as_mut().unwrap().ingress_class_name = Some("openstack".into());
        assert!(is_managed(&ingress, "openstack"));

        // The annotation wins over the field
        annotate(&mut ingress, ANNOTATION_INGRESS_CLASS, "nginx");
        assert_eq!(ingress_class(&ingress), Some("nginx"));
    }

    #[test]
    fn test_missing_spec_yields_empty_route() {
        let mut ingress = shop_ingress();
        ingress.spec = None;
        let route = ingress_to_route(&ingress, "prod").unwrap();
        assert!(route.rules.is_empty());
        assert!(route.validate().is_err());
    }
}
