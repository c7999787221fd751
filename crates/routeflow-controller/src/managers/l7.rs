//! L7 routing: redirect-to-pool policies and their match rules
//!
//! Policies are replaced wholesale on every full reconciliation rather than
//! diffed, so there is no ensure here.

use crate::error::Result;
use crate::poller::StatusPoller;
use routeflow_cloud::{CloudApi, L7Policy, L7PolicyCreate, L7RuleCreate, L7RuleType};
use std::sync::Arc;

/// HOST_NAME regex for `host`, tolerating an explicit `:port` suffix
///
/// A leading `*.` matches exactly one label.
pub fn host_rule_pattern(host: &str, port: u16) -> String {
    let escaped = match host.strip_prefix("*.") {
        Some(rest) => format!(r"[^.]+\.{}", regex::escape(rest)),
        None => regex::escape(host),
    };
    format!("^{}(:{})?$", escaped, port)
}

/// What one policy matches and where it sends traffic
#[derive(Debug, Clone)]
pub struct PolicyTarget<'a> {
    pub name: &'a str,
    pub pool_id: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Listener port the host pattern tolerates
    pub port: u16,
    /// 1-based evaluation order
    pub position: u32,
}

pub struct L7Manager {
    api: Arc<dyn CloudApi>,
    poller: StatusPoller,
}

impl L7Manager {
    pub fn new(api: Arc<dyn CloudApi>, poller: StatusPoller) -> Self {
        Self { api, poller }
    }

    /// Creates one policy and its host and path rules
    pub async fn create_policy_rule(
        &self,
        lb_id: &str,
        listener_id: &str,
        target: &PolicyTarget<'_>,
    ) -> Result<L7Policy> {
        let policy = self
            .api
            .create_l7_policy(&L7PolicyCreate {
                name: target.name.to_string(),
                listener_id: listener_id.to_string(),
                redirect_pool_id: target.pool_id.to_string(),
                position: target.position,
            })
            .await?;
        self.poller.wait_active(lb_id).await?;

        if !target.host.is_empty() {
            self.create_rule(
                lb_id,
                &policy.id,
                L7RuleType::HostName,
                host_rule_pattern(target.host, target.port),
            )
            .await?;
        }
        if !target.path.is_empty() {
            self.create_rule(lb_id, &policy.id, L7RuleType::Path, target.path.to_string())
                .await?;
        }

        tracing::info!(
            policy = %policy.id,
            host = target.host,
            path = target.path,
            "Created L7 policy"
        );
        Ok(policy)
    }

    async fn create_rule(
        &self,
        lb_id: &str,
        policy_id: &str,
        rule_type: L7RuleType,
        value: String,
    ) -> Result<()> {
        self.api
            .create_l7_rule(
                policy_id,
                &L7RuleCreate {
                    rule_type,
                    compare_type: rule_type.compare_type(),
                    value,
                },
            )
            .await?;
        self.poller.wait_active(lb_id).await?;
        Ok(())
    }

    /// Deletes every policy on the listener
    pub async fn delete_all(&self, lb_id: &str, listener_id: &str) -> Result<usize> {
        let policies = self.api.list_l7_policies(listener_id).await?;
        for policy in &policies {
            self.poller.wait_terminal(lb_id).await?;
            match self.api.delete_l7_policy(&policy.id).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
            tracing::debug!(policy = %policy.id, "Deleted L7 policy");
        }
        self.poller.wait_terminal(lb_id).await?;
        Ok(policies.len())
    }
}
