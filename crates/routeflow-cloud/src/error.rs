//! Cloud resource API error types

use std::fmt;
use thiserror::Error;

/// Kind of external resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    LoadBalancer,
    Listener,
    Pool,
    Member,
    L7Policy,
    L7Rule,
    SecurityGroup,
    SecurityGroupRule,
    Port,
    FloatingIp,
    Subnet,
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::Pool => "pool",
            ResourceKind::Member => "member",
            ResourceKind::L7Policy => "l7 policy",
            ResourceKind::L7Rule => "l7 rule",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::SecurityGroupRule => "security group rule",
            ResourceKind::Port => "port",
            ResourceKind::FloatingIp => "floating ip",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Secret => "secret",
        };
        f.write_str(name)
    }
}

/// Cloud resource API errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("found {count} {kind} resources named {name}, expected at most one")]
    MultipleResults {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    #[error("{kind} {id} is immutable right now: {message}")]
    Conflict {
        kind: ResourceKind,
        id: String,
        message: String,
    },

    #[error("API error{}: {message}", status_suffix(.status))]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        CloudError::Api {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }

    /// Errors that retrying cannot fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CloudError::MultipleResults { .. } | CloudError::InvalidConfig(_)
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Absorbs `NotFound` into `Ok(None)`.
///
/// Delete paths use this so that tearing down an already-absent resource
/// succeeds.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Returns the single element of `items`, `None` when empty, or
/// `MultipleResults` when more than one resource matched a unique name.
pub fn expect_unique<T>(kind: ResourceKind, name: &str, mut items: Vec<T>) -> Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.pop()),
        count => Err(CloudError::MultipleResults {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_absorbs_not_found() {
        let missing: Result<u32> = Err(CloudError::not_found(ResourceKind::Pool, "p-1"));
        assert!(missing.optional().unwrap().is_none());

        let failed: Result<u32> = Err(CloudError::api("boom"));
        assert!(failed.optional().is_err());
    }

    #[test]
    fn test_expect_unique() {
        assert_eq!(
            expect_unique(ResourceKind::LoadBalancer, "lb", Vec::<u32>::new()).unwrap(),
            None
        );
        assert_eq!(
            expect_unique(ResourceKind::LoadBalancer, "lb", vec![7]).unwrap(),
            Some(7)
        );

        let err = expect_unique(ResourceKind::LoadBalancer, "lb", vec![1, 2]).unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(
            err.to_string(),
            "found 2 load balancer resources named lb, expected at most one"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = CloudError::Api {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "API error (503): unavailable");
        assert_eq!(CloudError::api("x").to_string(), "API error: x");
    }
}
