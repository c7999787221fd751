//! Mutation journal for cloud resource calls

use crate::error::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mutating call that reached the cloud API
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub action_type: ActionType,
    pub kind: ResourceKind,
    pub resource_id: String,
    pub at: DateTime<Utc>,
}

/// Type of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
        }
    }
}

/// Ordered record of mutations
#[derive(Debug, Clone, Default)]
pub struct Journal {
    actions: Vec<Action>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action_type: ActionType, kind: ResourceKind, resource_id: &str) {
        self.actions.push(Action {
            action_type,
            kind,
            resource_id: resource_id.to_string(),
            at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Actions recorded after the first `offset`
    pub fn since(&self, offset: usize) -> &[Action] {
        &self.actions[offset.min(self.actions.len())..]
    }

    /// Get actions by type and resource kind
    pub fn count(&self, action_type: ActionType, kind: ResourceKind) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type && a.kind == kind)
            .count()
    }

    pub fn summary(&self) -> JournalSummary {
        let by_type = |t| self.actions.iter().filter(|a| a.action_type == t).count();
        JournalSummary {
            create: by_type(ActionType::Create),
            update: by_type(ActionType::Update),
            delete: by_type(ActionType::Delete),
        }
    }
}

/// Summary of recorded mutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl std::fmt::Display for JournalSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.create, self.update, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_summary() {
        let mut journal = Journal::new();
        journal.record(ActionType::Create, ResourceKind::LoadBalancer, "lb-1");
        journal.record(ActionType::Create, ResourceKind::Pool, "pool-1");
        journal.record(ActionType::Delete, ResourceKind::Pool, "pool-1");

        assert_eq!(journal.count(ActionType::Create, ResourceKind::Pool), 1);
        assert_eq!(journal.since(2).len(), 1);
        assert_eq!(journal.since(10).len(), 0);
        assert_eq!(
            journal.summary().to_string(),
            "2 created, 0 updated, 1 deleted"
        );
    }
}
