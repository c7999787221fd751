//! Route model: the desired state a reconciliation pass converges to
//!
//! A [`RouteSpec`] is an immutable snapshot of one ingress object. All names
//! of the cloud resources that realize it are derived from its identity, so
//! the same route always maps onto the same load balancer.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

/// Marks a route as reachable only on its VIP (no floating IP)
pub const ANNOTATION_INTERNAL: &str = "routeflow.io/internal";
/// Overrides the configured security-group management default
pub const ANNOTATION_MANAGE_SECURITY_GROUPS: &str = "routeflow.io/manage-security-groups";

const VERSION_SEPARATOR: &str = ", version: ";

static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*\.)?[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("host pattern is valid")
});

/// Identity of a route: namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub namespace: String,
    pub name: String,
}

impl RouteKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Service port as written in the route
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendPort {
    Number(u16),
    Name(String),
}

impl fmt::Display for BackendPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendPort::Number(n) => write!(f, "{}", n),
            BackendPort::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend {
    pub service: String,
    pub port: BackendPort,
}

impl Backend {
    pub fn new(service: impl Into<String>, port: BackendPort) -> Self {
        Self {
            service: service.into(),
            port,
        }
    }
}

/// One host/path rule; an empty host or path matches everything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub host: String,
    pub path: String,
    pub backend: Backend,
}

/// Where a listener certificate comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSource {
    /// PEM pair in a cluster secret, bridged into the credential store
    Secret { name: String },
    /// Reference to a bundle already in the credential store
    ContainerRef(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsEntry {
    pub hosts: Vec<String>,
    pub source: TlsSource,
}

/// Desired state of one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub key: RouteKey,
    /// Cluster label embedded in resource names
    pub cluster: String,
    /// Version marker of the source object
    pub version: String,
    pub uid: Option<String>,
    pub rules: Vec<RouteRule>,
    pub default_backend: Option<Backend>,
    pub tls: Vec<TlsEntry>,
    pub internal: bool,
    /// `None` defers to the configured default
    pub manage_security_groups: Option<bool>,
}

impl RouteSpec {
    pub fn new(key: RouteKey, cluster: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            key,
            cluster: cluster.into(),
            version: version.into(),
            uid: None,
            rules: Vec::new(),
            default_backend: None,
            tls: Vec::new(),
            internal: false,
            manage_security_groups: None,
        }
    }

    pub fn with_rule(mut self, host: &str, path: &str, backend: Backend) -> Self {
        self.rules.push(RouteRule {
            host: host.to_string(),
            path: path.to_string(),
            backend,
        });
        self
    }

    pub fn with_default_backend(mut self, backend: Backend) -> Self {
        self.default_backend = Some(backend);
        self
    }

    pub fn with_tls(mut self, hosts: &[&str], source: TlsSource) -> Self {
        self.tls.push(TlsEntry {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            source,
        });
        self
    }

    pub fn loadbalancer_name(&self) -> String {
        loadbalancer_name(&self.cluster, &self.key.namespace, &self.key.name)
    }

    /// Description without a version marker; set until a pass completes
    pub fn base_description(&self) -> String {
        format!(
            "Kubernetes ingress {} in namespace {} from cluster {}",
            self.key.name, self.key.namespace, self.cluster
        )
    }

    /// Load balancer description carrying this spec's version marker
    pub fn description(&self) -> String {
        format!(
            "{}{}{}",
            self.base_description(),
            VERSION_SEPARATOR,
            self.version
        )
    }

    pub fn default_pool_name(&self) -> String {
        format!("{}_default", self.loadbalancer_name())
    }

    /// Pool shared by every rule pointing at `backend`
    pub fn shared_pool_name(&self, backend: &Backend) -> String {
        format!(
            "{}_{}_{}",
            self.loadbalancer_name(),
            backend.service,
            backend.port
        )
    }

    /// Credential-store entry name for a bridged cluster secret
    pub fn secret_name(&self, secret: &str) -> String {
        format!("{}_{}", self.loadbalancer_name(), secret)
    }

    /// Tags identifying the security group owned by this route
    pub fn security_group_tags(&self) -> Vec<String> {
        vec!["routeflow".to_string(), self.loadbalancer_name()]
    }

    /// Names of cluster secrets referenced by TLS entries
    pub fn tls_secret_names(&self) -> impl Iterator<Item = &str> {
        self.tls.iter().filter_map(|entry| match &entry.source {
            TlsSource::Secret { name } => Some(name.as_str()),
            TlsSource::ContainerRef(_) => None,
        })
    }

    /// Distinct rule backends, in rule order
    pub fn rule_backends(&self) -> Vec<&Backend> {
        let mut seen = BTreeSet::new();
        self.rules
            .iter()
            .map(|r| &r.backend)
            .filter(|b| seen.insert(*b))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() && self.default_backend.is_none() {
            return Err(Error::validation(
                &self.key,
                "has neither rules nor a default backend",
            ));
        }
        for rule in &self.rules {
            if !rule.host.is_empty() && !HOST_PATTERN.is_match(&rule.host) {
                return Err(Error::validation(
                    &self.key,
                    format!("host {:?} is not a valid DNS name", rule.host),
                ));
            }
            if !rule.path.is_empty() && !rule.path.starts_with('/') {
                return Err(Error::validation(
                    &self.key,
                    format!("path {:?} must start with '/'", rule.path),
                ));
            }
            self.validate_backend(&rule.backend)?;
        }
        if let Some(backend) = &self.default_backend {
            self.validate_backend(backend)?;
        }
        for entry in &self.tls {
            match &entry.source {
                TlsSource::Secret { name } if name.is_empty() => {
                    return Err(Error::validation(&self.key, "TLS entry without secret name"));
                }
                TlsSource::ContainerRef(r) if r.is_empty() => {
                    return Err(Error::validation(&self.key, "empty TLS container reference"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_backend(&self, backend: &Backend) -> Result<()> {
        if backend.service.is_empty() {
            return Err(Error::validation(&self.key, "backend without service name"));
        }
        match &backend.port {
            BackendPort::Number(0) => Err(Error::validation(
                &self.key,
                format!("service {} has port 0", backend.service),
            )),
            BackendPort::Name(name) if name.is_empty() => Err(Error::validation(
                &self.key,
                format!("service {} has an empty port name", backend.service),
            )),
            _ => Ok(()),
        }
    }
}

pub fn loadbalancer_name(cluster: &str, namespace: &str, name: &str) -> String {
    format!("kube_ingress_{}_{}_{}", cluster, namespace, name)
}

/// Version marker stamped into a load balancer description, if any
pub fn version_marker(description: &str) -> Option<&str> {
    description
        .rsplit_once(VERSION_SEPARATOR)
        .map(|(_, marker)| marker)
        .filter(|marker| !marker.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> RouteSpec {
        RouteSpec::new(RouteKey::new("shop", "web"), "prod", "42").with_rule(
            "shop.example.com",
            "/api",
            Backend::new("api", BackendPort::Number(8080)),
        )
    }

    #[test]
    fn test_derived_names() {
        let spec = web();
        assert_eq!(spec.loadbalancer_name(), "kube_ingress_prod_shop_web");
        assert_eq!(spec.default_pool_name(), "kube_ingress_prod_shop_web_default");
        assert_eq!(
            spec.shared_pool_name(&Backend::new("api", BackendPort::Name("http".into()))),
            "kube_ingress_prod_shop_web_api_http"
        );
        assert_eq!(spec.secret_name("tls"), "kube_ingress_prod_shop_web_tls");
    }

    #[test]
    fn test_version_marker_round_trip() {
        let spec = web();
        assert_eq!(
            spec.description(),
            "Kubernetes ingress web in namespace shop from cluster prod, version: 42"
        );
        assert_eq!(version_marker(&spec.description()), Some("42"));
        assert_eq!(version_marker(&spec.base_description()), None);
        assert_eq!(version_marker(""), None);
        assert_eq!(version_marker("created by hand"), None);
    }

    #[test]
    fn test_validate_accepts_wildcard_host() {
        let spec = web().with_rule("*.example.com", "", Backend::new("api", BackendPort::Number(80)));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let empty = RouteSpec::new(RouteKey::new("shop", "web"), "prod", "1");
        assert!(empty.validate().unwrap_err().is_permanent());

        let bad_host = web().with_rule("Shop_Example", "", Backend::new("a", BackendPort::Number(80)));
        assert!(matches!(bad_host.validate(), Err(Error::Validation { .. })));

        let bad_path = web().with_rule("", "api", Backend::new("a", BackendPort::Number(80)));
        assert!(bad_path.validate().is_err());

        let zero_port = web().with_default_backend(Backend::new("a", BackendPort::Number(0)));
        assert!(zero_port.validate().is_err());
    }

    #[test]
    fn test_rule_backends_are_distinct() {
        let api = Backend::new("api", BackendPort::Number(8080));
        let spec = web()
            .with_rule("", "/v2", api.clone())
            .with_rule("", "/static", Backend::new("cdn", BackendPort::Name("http".into())));

        let backends = spec.rule_backends();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0], &api);
    }
}
