//! Floating IP lifecycle

use crate::error::Result;
use routeflow_cloud::{CloudApi, FloatingIp};
use std::sync::Arc;

pub struct FloatingIpManager {
    api: Arc<dyn CloudApi>,
}

impl FloatingIpManager {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    pub async fn find(&self, port_id: &str) -> Result<Option<FloatingIp>> {
        Ok(self.api.list_floating_ips(port_id).await?.into_iter().next())
    }

    /// Returns the floating IP bound to `port_id`, allocating one if needed
    pub async fn ensure(&self, port_id: &str, floating_network_id: &str) -> Result<FloatingIp> {
        if let Some(existing) = self.find(port_id).await? {
            tracing::debug!(floating_ip = %existing.floating_ip_address, port = port_id, "Floating IP exists");
            return Ok(existing);
        }

        let fip = self
            .api
            .create_floating_ip(floating_network_id, port_id)
            .await?;
        tracing::info!(
            floating_ip = %fip.floating_ip_address,
            port = port_id,
            "Allocated floating IP"
        );
        Ok(fip)
    }

    /// Releases every floating IP bound to `port_id`
    pub async fn release(&self, port_id: &str) -> Result<usize> {
        let bound = self.api.list_floating_ips(port_id).await?;
        for fip in &bound {
            match self.api.delete_floating_ip(&fip.id).await {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
            tracing::info!(floating_ip = %fip.floating_ip_address, "Released floating IP");
        }
        Ok(bound.len())
    }
}
