//! Credential-store entries bridged from cluster TLS secrets

use crate::collaborators::TlsMaterial;
use crate::error::Result;
use crate::tls::pkcs12_from_pem;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use routeflow_cloud::{CloudApi, ResourceKind, SecretCreate, expect_unique};
use std::sync::Arc;

const PAYLOAD_CONTENT_TYPE: &str = "application/octet-stream";
const PAYLOAD_CONTENT_ENCODING: &str = "base64";

pub struct SecretManager {
    api: Arc<dyn CloudApi>,
}

impl SecretManager {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    /// Returns the reference of entry `name`, storing `material` as a
    /// PKCS#12 archive if the entry does not exist yet
    pub async fn ensure(&self, name: &str, material: &TlsMaterial) -> Result<String> {
        let existing = self.api.list_secrets(name).await?;
        if let Some(secret) = expect_unique(ResourceKind::Secret, name, existing)? {
            tracing::debug!(secret = name, "Credential-store entry exists");
            return Ok(secret.secret_ref);
        }

        let archive = pkcs12_from_pem(material, name)?;
        let stored = self
            .api
            .create_secret(&SecretCreate {
                name: name.to_string(),
                payload: STANDARD.encode(archive),
                payload_content_type: PAYLOAD_CONTENT_TYPE.to_string(),
                payload_content_encoding: PAYLOAD_CONTENT_ENCODING.to_string(),
            })
            .await?;
        tracing::info!(secret = name, secret_ref = %stored.secret_ref, "Stored TLS bundle");
        Ok(stored.secret_ref)
    }

    /// Removes every entry named `name`
    pub async fn delete(&self, name: &str) -> Result<usize> {
        let entries = self.api.list_secrets(name).await?;
        for entry in &entries {
            match self.api.delete_secret(&entry.secret_ref).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
            tracing::info!(secret = name, "Deleted credential-store entry");
        }
        Ok(entries.len())
    }
}
