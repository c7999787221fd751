//! Kubernetes collaborator error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Invalid {kind} {name}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },
}

impl KubeError {
    pub fn invalid(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        KubeError::Invalid {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<KubeError> for routeflow_controller::Error {
    fn from(err: KubeError) -> Self {
        routeflow_controller::Error::Collaborator(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KubeError>;
