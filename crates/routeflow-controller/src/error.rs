//! Controller error types

use routeflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("load balancer {id} went into provisioning status ERROR")]
    ProvisioningFailed { id: String },

    #[error("load balancer {id} did not become terminal after {attempts} polls")]
    ProvisioningTimeout { id: String, attempts: u32 },

    #[error("route {route} is invalid: {reason}")]
    Validation { route: String, reason: String },

    #[error("Invalid TLS material: {0}")]
    InvalidTls(String),

    #[error("pool {pool} would have no members: no ready node has a usable address")]
    NoBackendMembers { pool: String },

    #[error("cannot resolve port {port} of service {namespace}/{service}: {reason}")]
    ServiceResolution {
        namespace: String,
        service: String,
        port: String,
        reason: String,
    },

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl Error {
    pub fn validation(route: impl ToString, reason: impl Into<String>) -> Self {
        Error::Validation {
            route: route.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors that retrying cannot fix
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Cloud(e) => e.is_permanent(),
            Error::Validation { .. } | Error::InvalidTls(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use routeflow_cloud::ResourceKind;

    #[test]
    fn test_permanent_classification() {
        let duplicate = Error::from(CloudError::MultipleResults {
            kind: ResourceKind::LoadBalancer,
            name: "lb".into(),
            count: 2,
        });
        assert!(duplicate.is_permanent());
        assert!(Error::validation("default/web", "no rules").is_permanent());

        let transient = Error::from(CloudError::api("timeout"));
        assert!(!transient.is_permanent());
        assert!(
            !Error::ProvisioningTimeout {
                id: "lb-1".into(),
                attempts: 3
            }
            .is_permanent()
        );
        assert!(!Error::NoBackendMembers { pool: "p".into() }.is_permanent());
    }
}
