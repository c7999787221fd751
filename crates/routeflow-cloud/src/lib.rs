//! routeflow Cloud Resource API
//!
//! This crate provides the abstraction over the external load-balancing
//! service that routeflow reconciles ingress routes onto.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              routeflow-controller               │
//! │   (reconciler, lifecycle managers, poller)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               routeflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          trait CloudApi { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    Model     │  │   Journal    │             │
//! │  └──────────────┘  └──────────────┘             │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   openstack   │ │   in-memory   │
//! │ (REST client) │ │ (test-utils)  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod api;
pub mod error;
#[cfg(feature = "test-utils")]
pub mod memory;
pub mod model;

// Re-exports
pub use action::{Action, ActionType, Journal, JournalSummary};
pub use api::CloudApi;
pub use error::{CloudError, OptionalExt, ResourceKind, Result, expect_unique};
#[cfg(feature = "test-utils")]
pub use memory::InMemoryCloud;
pub use model::{
    FloatingIp, L7CompareType, L7Policy, L7PolicyCreate, L7Rule, L7RuleCreate, L7RuleType,
    Listener, ListenerCreate, ListenerProtocol, ListenerTlsUpdate, LoadBalancer,
    LoadBalancerCreate, Member, MemberSpec, NetworkPort, Pool, PoolCreate, ProvisioningStatus,
    SecretCreate, SecurityGroup, SecurityGroupRule, SecurityGroupRuleCreate, StoredSecret, Subnet,
};
