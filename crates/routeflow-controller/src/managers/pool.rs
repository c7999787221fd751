//! Pool and member lifecycle

use crate::error::{Error, Result};
use crate::nodes::ReadyNode;
use crate::poller::StatusPoller;
use routeflow_cloud::{CloudApi, MemberSpec, Pool, PoolCreate, ResourceKind, expect_unique};
use std::sync::Arc;

/// One member per node that has an address
fn member_specs(nodes: &[ReadyNode], port: u16) -> Vec<MemberSpec> {
    let mut members: Vec<MemberSpec> = nodes
        .iter()
        .filter_map(|node| match &node.address {
            Some(address) => Some(MemberSpec {
                name: node.name.clone(),
                address: address.clone(),
                protocol_port: port,
            }),
            None => {
                tracing::warn!(node = %node.name, "Node has no usable address, skipping");
                None
            }
        })
        .collect();
    members.sort();
    members
}

pub struct PoolManager {
    api: Arc<dyn CloudApi>,
    poller: StatusPoller,
}

impl PoolManager {
    pub fn new(api: Arc<dyn CloudApi>, poller: StatusPoller) -> Self {
        Self { api, poller }
    }

    pub async fn find(&self, lb_id: &str, name: &str) -> Result<Option<Pool>> {
        let matches: Vec<Pool> = self
            .api
            .list_pools(lb_id)
            .await?
            .into_iter()
            .filter(|p| p.name == name)
            .collect();
        Ok(expect_unique(ResourceKind::Pool, name, matches)?)
    }

    /// Converges pool `name` and its members
    ///
    /// `listener_id` binds the pool as a listener's default pool; `None`
    /// makes it a shared pool for L7 policies. A pool bound differently is
    /// recreated.
    pub async fn ensure(
        &self,
        lb_id: &str,
        name: &str,
        listener_id: Option<&str>,
        port: u16,
        nodes: &[ReadyNode],
    ) -> Result<Pool> {
        let members = member_specs(nodes, port);
        if members.is_empty() {
            return Err(Error::NoBackendMembers {
                pool: name.to_string(),
            });
        }

        let existing = match self.find(lb_id, name).await? {
            Some(pool) if pool.listener_id.as_deref() == listener_id => Some(pool),
            Some(stale) => {
                tracing::info!(pool = %stale.id, name, "Pool binding changed, recreating");
                self.api.delete_pool(&stale.id).await?;
                self.poller.wait_active(lb_id).await?;
                None
            }
            None => None,
        };

        let pool = match existing {
            Some(pool) => pool,
            None => {
                let pool = self
                    .api
                    .create_pool(&PoolCreate {
                        name: name.to_string(),
                        loadbalancer_id: lb_id.to_string(),
                        listener_id: listener_id.map(str::to_string),
                    })
                    .await?;
                self.poller.wait_active(lb_id).await?;
                tracing::info!(pool = %pool.id, name, "Created pool");
                pool
            }
        };

        self.sync_members(lb_id, &pool, &members).await?;
        Ok(pool)
    }

    /// Replaces the members of an existing pool from the node set
    ///
    /// An empty node set or an absent pool leaves everything untouched.
    /// Returns whether the members were replaced.
    pub async fn update_members(
        &self,
        lb_id: &str,
        name: &str,
        port: u16,
        nodes: &[ReadyNode],
    ) -> Result<bool> {
        if nodes.is_empty() {
            tracing::debug!(name, "Empty node set, leaving members unchanged");
            return Ok(false);
        }
        let Some(pool) = self.find(lb_id, name).await? else {
            tracing::debug!(name, "Pool absent, skipping member update");
            return Ok(false);
        };
        let members = member_specs(nodes, port);
        if members.is_empty() {
            tracing::warn!(pool = %pool.id, "No node has a usable address, leaving members unchanged");
            return Ok(false);
        }
        self.sync_members(lb_id, &pool, &members).await
    }

    async fn sync_members(&self, lb_id: &str, pool: &Pool, desired: &[MemberSpec]) -> Result<bool> {
        let mut current: Vec<MemberSpec> = self
            .api
            .list_members(&pool.id)
            .await?
            .into_iter()
            .map(|m| MemberSpec {
                name: m.name,
                address: m.address,
                protocol_port: m.protocol_port,
            })
            .collect();
        current.sort();
        if current == desired {
            tracing::debug!(pool = %pool.id, "Members up to date");
            return Ok(false);
        }

        self.api.replace_members(&pool.id, desired).await?;
        self.poller.wait_active(lb_id).await?;
        tracing::info!(pool = %pool.id, members = desired.len(), "Replaced pool members");
        Ok(true)
    }

    pub async fn delete(&self, lb_id: &str, name: &str) -> Result<()> {
        let Some(pool) = self.find(lb_id, name).await? else {
            return Ok(());
        };
        self.delete_pool(lb_id, &pool).await
    }

    /// Deletes every pool not bound to a listener
    pub async fn delete_shared(&self, lb_id: &str) -> Result<usize> {
        let shared: Vec<Pool> = self
            .api
            .list_pools(lb_id)
            .await?
            .into_iter()
            .filter(|p| p.listener_id.is_none())
            .collect();
        for pool in &shared {
            self.delete_pool(lb_id, pool).await?;
        }
        Ok(shared.len())
    }

    /// Deletes every pool of the load balancer
    pub async fn delete_all(&self, lb_id: &str) -> Result<usize> {
        let pools = self.api.list_pools(lb_id).await?;
        for pool in &pools {
            self.delete_pool(lb_id, pool).await?;
        }
        Ok(pools.len())
    }

    async fn delete_pool(&self, lb_id: &str, pool: &Pool) -> Result<()> {
        self.poller.wait_terminal(lb_id).await?;
        match self.api.delete_pool(&pool.id).await {
            Err(e) if e.is_not_found() => return Ok(()),
            other => other?,
        }
        self.poller.wait_terminal(lb_id).await?;
        tracing::info!(pool = %pool.id, name = %pool.name, "Deleted pool");
        Ok(())
    }
}
