//! Provisioning status poller
//!
//! The load-balancing service applies every mutation asynchronously and
//! rejects further mutations of a load balancer (or any of its children)
//! until it is terminal again. Every lifecycle manager waits here before and
//! after it mutates.

use crate::error::{Error, Result};
use routeflow_cloud::{CloudApi, LoadBalancer, ProvisioningStatus};
use routeflow_config::ControllerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Upper bound for a single poll delay
const MAX_POLL_DELAY: Duration = Duration::from_secs(60);

/// Poll schedule (bounded backoff)
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub factor: f64,
    /// Maximum number of status reads
    pub steps: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            factor: 1.0,
            steps: 240,
        }
    }
}

impl From<&ControllerConfig> for PollConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            initial_delay: config.poll_initial_delay(),
            factor: config.poll_factor,
            steps: config.poll_steps,
        }
    }
}

impl PollConfig {
    /// Delay after the given (0-based) poll
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(MAX_POLL_DELAY)
    }
}

/// Where a single status read leaves a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Active,
    Error,
    Timeout,
}

impl From<ProvisioningStatus> for PollState {
    fn from(status: ProvisioningStatus) -> Self {
        match status {
            ProvisioningStatus::Active => PollState::Active,
            ProvisioningStatus::Error | ProvisioningStatus::Deleted => PollState::Error,
            ProvisioningStatus::PendingCreate
            | ProvisioningStatus::PendingUpdate
            | ProvisioningStatus::PendingDelete => PollState::Pending,
        }
    }
}

#[derive(Clone)]
pub struct StatusPoller {
    api: Arc<dyn CloudApi>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn CloudApi>, config: PollConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Waits until the load balancer is ACTIVE or ERROR and returns it
    pub async fn wait_terminal(&self, id: &str) -> Result<LoadBalancer> {
        for attempt in 0..self.config.steps {
            let lb = self.api.get_load_balancer(id).await?;
            match PollState::from(lb.provisioning_status) {
                PollState::Active | PollState::Error => return Ok(lb),
                PollState::Pending | PollState::Timeout => {
                    tracing::trace!(
                        loadbalancer = %id,
                        status = %lb.provisioning_status,
                        attempt,
                        "Waiting for load balancer"
                    );
                }
            }

            if attempt + 1 < self.config.steps {
                sleep(self.config.delay_for_attempt(attempt)).await;
            }
        }

        tracing::warn!(loadbalancer = %id, state = ?PollState::Timeout, "Gave up waiting for load balancer");
        Err(Error::ProvisioningTimeout {
            id: id.to_string(),
            attempts: self.config.steps,
        })
    }

    /// Waits until the load balancer is ACTIVE; ERROR fails immediately
    pub async fn wait_active(&self, id: &str) -> Result<LoadBalancer> {
        let lb = self.wait_terminal(id).await?;
        if lb.provisioning_status != ProvisioningStatus::Active {
            return Err(Error::ProvisioningFailed { id: id.to_string() });
        }
        Ok(lb)
    }

    /// Waits until the load balancer is gone
    pub async fn wait_deleted(&self, id: &str) -> Result<()> {
        for attempt in 0..self.config.steps {
            let lb = match self.api.get_load_balancer(id).await {
                Ok(lb) => lb,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            match lb.provisioning_status {
                ProvisioningStatus::Deleted => return Ok(()),
                ProvisioningStatus::Error => {
                    return Err(Error::ProvisioningFailed { id: id.to_string() });
                }
                _ => {}
            }

            if attempt + 1 < self.config.steps {
                sleep(self.config.delay_for_attempt(attempt)).await;
            }
        }

        Err(Error::ProvisioningTimeout {
            id: id.to_string(),
            attempts: self.config.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeflow_cloud::{InMemoryCloud, LoadBalancerCreate};
    use tokio::time::Instant;

    fn poller(cloud: Arc<InMemoryCloud>, steps: u32) -> StatusPoller {
        StatusPoller::new(
            cloud,
            PollConfig {
                initial_delay: Duration::from_secs(3),
                factor: 1.0,
                steps,
            },
        )
    }

    async fn create(cloud: &InMemoryCloud) -> LoadBalancer {
        cloud
            .create_load_balancer(&LoadBalancerCreate {
                name: "lb".into(),
                description: String::new(),
                vip_subnet_id: "subnet-1".into(),
                provider: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_delay_schedule() {
        let constant = PollConfig::default();
        assert_eq!(constant.delay_for_attempt(0), Duration::from_secs(3));
        assert_eq!(constant.delay_for_attempt(100), Duration::from_secs(3));

        let growing = PollConfig {
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
            steps: 10,
        };
        assert_eq!(growing.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(growing.delay_for_attempt(9), MAX_POLL_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_active_after_pending_polls() {
        let cloud = Arc::new(InMemoryCloud::new().with_settle_polls(3));
        let lb = create(&cloud).await;

        let start = Instant::now();
        let active = poller(cloud, 10).wait_active(&lb.id).await.unwrap();

        assert_eq!(active.provisioning_status, ProvisioningStatus::Active);
        // Two sleeps between three reads
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_fails_immediately() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb = create(&cloud).await;
        cloud.force_status(&lb.id, ProvisioningStatus::Error);

        let start = Instant::now();
        let err = poller(cloud.clone(), 10).wait_active(&lb.id).await.unwrap_err();

        assert!(matches!(err, Error::ProvisioningFailed { .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Terminal waits accept ERROR so teardown can proceed
        let lb = poller(cloud, 10).wait_terminal(&lb.id).await.unwrap();
        assert_eq!(lb.provisioning_status, ProvisioningStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_pending_times_out() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb = create(&cloud).await;
        cloud.force_status(&lb.id, ProvisioningStatus::PendingUpdate);

        let err = poller(cloud, 4).wait_active(&lb.id).await.unwrap_err();
        assert!(matches!(err, Error::ProvisioningTimeout { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_deleted_treats_not_found_as_done() {
        let cloud = Arc::new(InMemoryCloud::new());
        poller(cloud, 3).wait_deleted("lb-missing").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_error_propagates() {
        let cloud = Arc::new(InMemoryCloud::new());
        let lb = create(&cloud).await;
        cloud.fail_next("get_load_balancer", 1);

        let err = poller(cloud, 3).wait_active(&lb.id).await.unwrap_err();
        assert!(matches!(err, Error::Cloud(_)));
    }
}
