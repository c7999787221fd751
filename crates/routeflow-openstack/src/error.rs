//! OpenStack backend error types

use routeflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Missing token: {0}")]
    MissingToken(String),
}

impl From<OpenStackError> for CloudError {
    fn from(err: OpenStackError) -> Self {
        match err {
            OpenStackError::Http(e) => CloudError::Api {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            OpenStackError::Status {
                service,
                status,
                body,
            } => CloudError::Api {
                status: Some(status),
                message: format!("{}: {}", service, body),
            },
            OpenStackError::InvalidEndpoint(msg) | OpenStackError::MissingToken(msg) => {
                CloudError::InvalidConfig(msg)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, OpenStackError>;
