//! Load balancer lifecycle

use crate::error::Result;
use crate::poller::StatusPoller;
use routeflow_cloud::{
    CloudApi, LoadBalancer, LoadBalancerCreate, ResourceKind, expect_unique,
};
use std::sync::Arc;

/// Load balancer after `ensure`, settled and ACTIVE
#[derive(Debug, Clone)]
pub struct EnsuredLoadBalancer {
    pub loadbalancer: LoadBalancer,
    /// Whether this call created it
    pub created: bool,
}

pub struct LoadBalancerManager {
    api: Arc<dyn CloudApi>,
    poller: StatusPoller,
}

impl LoadBalancerManager {
    pub fn new(api: Arc<dyn CloudApi>, poller: StatusPoller) -> Self {
        Self { api, poller }
    }

    /// Finds the load balancer by its unique name
    pub async fn find(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let matches = self.api.list_load_balancers(name).await?;
        Ok(expect_unique(ResourceKind::LoadBalancer, name, matches)?)
    }

    /// Returns the load balancer named `name`, creating it if absent
    pub async fn ensure(
        &self,
        name: &str,
        description: &str,
        subnet_id: &str,
        provider: Option<&str>,
    ) -> Result<EnsuredLoadBalancer> {
        if let Some(existing) = self.find(name).await? {
            tracing::debug!(loadbalancer = %existing.id, name, "Load balancer exists");
            let loadbalancer = self.poller.wait_active(&existing.id).await?;
            return Ok(EnsuredLoadBalancer {
                loadbalancer,
                created: false,
            });
        }

        let created = self
            .api
            .create_load_balancer(&LoadBalancerCreate {
                name: name.to_string(),
                description: description.to_string(),
                vip_subnet_id: subnet_id.to_string(),
                provider: provider.map(str::to_string),
            })
            .await?;
        tracing::info!(loadbalancer = %created.id, name, "Created load balancer");

        let loadbalancer = self.poller.wait_active(&created.id).await?;
        Ok(EnsuredLoadBalancer {
            loadbalancer,
            created: true,
        })
    }

    /// Writes the description (version marker cache)
    pub async fn stamp(&self, id: &str, description: &str) -> Result<()> {
        self.api
            .update_load_balancer_description(id, description)
            .await?;
        self.poller.wait_active(id).await?;
        Ok(())
    }

    /// Deletes the load balancer; children must already be gone
    ///
    /// Returns `false` when nothing by that name existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let Some(lb) = self.find(name).await? else {
            tracing::debug!(name, "Load balancer already absent");
            return Ok(false);
        };

        self.poller.wait_terminal(&lb.id).await?;
        self.api.delete_load_balancer(&lb.id).await?;
        self.poller.wait_deleted(&lb.id).await?;
        tracing::info!(loadbalancer = %lb.id, name, "Deleted load balancer");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::poller::PollConfig;
    use routeflow_cloud::{ActionType, InMemoryCloud, ProvisioningStatus};

    fn manager(cloud: &Arc<InMemoryCloud>) -> LoadBalancerManager {
        let api: Arc<dyn CloudApi> = cloud.clone();
        LoadBalancerManager::new(api.clone(), StatusPoller::new(api, PollConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_creates_once() {
        let cloud = Arc::new(InMemoryCloud::new().with_settle_polls(2));
        let lbs = manager(&cloud);

        let first = lbs.ensure("lb", "desc", "subnet-1", None).await.unwrap();
        assert!(first.created);
        assert_eq!(
            first.loadbalancer.provisioning_status,
            ProvisioningStatus::Active
        );

        let second = lbs.ensure("lb", "desc", "subnet-1", None).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.loadbalancer.id, first.loadbalancer.id);
        assert_eq!(
            cloud
                .journal()
                .count(ActionType::Create, ResourceKind::LoadBalancer),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_names_are_fatal() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.insert_load_balancer("lb");
        cloud.insert_load_balancer("lb");

        let err = manager(&cloud)
            .ensure("lb", "desc", "subnet-1", None)
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert!(cloud.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_in_error_fails() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb = cloud.insert_load_balancer("lb");
        cloud.force_status(&lb.id, ProvisioningStatus::Error);

        let err = manager(&cloud)
            .ensure("lb", "desc", "subnet-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProvisioningFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.insert_load_balancer("lb");
        let lbs = manager(&cloud);

        assert!(lbs.delete("lb").await.unwrap());
        assert!(!lbs.delete("lb").await.unwrap());
        assert!(lbs.find("lb").await.unwrap().is_none());
    }
}
