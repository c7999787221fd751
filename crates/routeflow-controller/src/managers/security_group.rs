//! Security group lifecycle
//!
//! A route owns at most one group, found by its tag set. The group opens the
//! backend node ports to the load balancer's subnet and is attached to the
//! network ports of every ready node.

use crate::error::{Error, Result};
use crate::saga::Compensations;
use routeflow_cloud::{
    CloudApi, ResourceKind, SecurityGroup, SecurityGroupRuleCreate, expect_unique,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Direction of a membership change on node ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Attach,
    Detach,
}

pub struct SecurityGroupManager {
    api: Arc<dyn CloudApi>,
}

impl SecurityGroupManager {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self { api }
    }

    /// Finds the group carrying every tag in `tags`
    pub async fn find(&self, tags: &[String]) -> Result<Option<SecurityGroup>> {
        let matches = self.api.list_security_groups(tags).await?;
        Ok(expect_unique(
            ResourceKind::SecurityGroup,
            &tags.join(","),
            matches,
        )?)
    }

    /// Returns the tagged group, creating and tagging it if absent
    ///
    /// A group whose tagging fails is deleted again, so a retry never finds
    /// an untagged orphan.
    pub async fn ensure(
        &self,
        name: &str,
        description: &str,
        tags: &[String],
    ) -> Result<SecurityGroup> {
        if let Some(group) = self.find(tags).await? {
            return Ok(group);
        }

        let group = self.api.create_security_group(name, description).await?;
        tracing::info!(security_group = %group.id, name, "Created security group");

        let mut undo = Compensations::new();
        {
            let api = self.api.clone();
            let id = group.id.clone();
            undo.push(format!("delete security group {}", group.id), move || async move {
                api.delete_security_group(&id).await.map_err(Error::from)
            });
        }

        for tag in tags {
            if let Err(e) = self.api.add_security_group_tag(&group.id, tag).await {
                tracing::warn!(security_group = %group.id, tag, error = %e, "Tagging failed");
                undo.unwind().await;
                return Err(e.into());
            }
        }
        undo.commit();

        Ok(SecurityGroup {
            tags: tags.to_vec(),
            ..group
        })
    }

    /// Converges the TCP ingress rules from `cidr` to exactly `ports`
    ///
    /// Rules for other sources, other protocols and egress are left alone.
    /// Returns whether anything changed.
    pub async fn ensure_rules(&self, group_id: &str, cidr: &str, ports: &[u16]) -> Result<bool> {
        let desired: BTreeSet<u16> = ports.iter().copied().collect();
        let mut present = BTreeSet::new();
        let mut changed = false;

        for rule in self.api.list_security_group_rules(group_id).await? {
            if rule.direction != "ingress"
                || rule.protocol.as_deref() != Some("tcp")
                || rule.remote_ip_prefix.as_deref() != Some(cidr)
            {
                continue;
            }
            let keep = rule
                .tcp_ingress_port()
                .is_some_and(|port| desired.contains(&port) && present.insert(port));
            if !keep {
                self.api.delete_security_group_rule(&rule.id).await?;
                tracing::debug!(security_group = %group_id, rule = %rule.id, "Deleted stale rule");
                changed = true;
            }
        }

        for port in desired.difference(&present) {
            self.api
                .create_security_group_rule(&SecurityGroupRuleCreate::tcp_ingress(
                    group_id, *port, cidr,
                ))
                .await?;
            tracing::debug!(security_group = %group_id, port, "Opened port");
            changed = true;
        }

        if changed {
            tracing::info!(security_group = %group_id, ports = ?desired, "Converged security group rules");
        }
        Ok(changed)
    }

    /// Attaches or detaches the group on every port of the given instances
    pub async fn ensure_port_membership(
        &self,
        group_id: &str,
        membership: Membership,
        instance_ids: &[String],
    ) -> Result<()> {
        for instance in instance_ids {
            for port in self.api.list_ports(instance).await? {
                let attached = port.security_groups.iter().any(|g| g == group_id);
                let groups: Vec<String> = match (membership, attached) {
                    (Membership::Attach, false) => port
                        .security_groups
                        .iter()
                        .cloned()
                        .chain(std::iter::once(group_id.to_string()))
                        .collect(),
                    (Membership::Detach, true) => port
                        .security_groups
                        .iter()
                        .filter(|g| *g != group_id)
                        .cloned()
                        .collect(),
                    _ => continue,
                };
                self.api.update_port_security_groups(&port.id, &groups).await?;
                tracing::debug!(port = %port.id, instance = %instance, ?membership, "Updated port security groups");
            }
        }
        Ok(())
    }

    /// Detaches the group from the instances and deletes it
    ///
    /// Returns `false` when no group carried the tags.
    pub async fn delete(&self, tags: &[String], instance_ids: &[String]) -> Result<bool> {
        let Some(group) = self.find(tags).await? else {
            return Ok(false);
        };
        self.ensure_port_membership(&group.id, Membership::Detach, instance_ids)
            .await?;
        match self.api.delete_security_group(&group.id).await {
            Err(e) if e.is_not_found() => {}
            other => other?,
        }
        tracing::info!(security_group = %group.id, "Deleted security group");
        Ok(true)
    }
}
