//! routeflow Controller
//!
//! Reconciles ingress routes onto an eventually consistent load-balancing
//! service.
//!
//! # Architecture
//!
//! ```text
//! notification ──▶ WorkQueue ──▶ Controller (dispatch loop)
//!                                    │
//!                                    ▼
//!                               Reconciler ──▶ lifecycle managers ──▶ CloudApi
//!                                    ▲                 │
//!                    NodeSetTracker ─┘          StatusPoller
//! ```
//!
//! The cloud side is reached through [`routeflow_cloud::CloudApi`]; the
//! cluster side through the traits in [`collaborators`].

pub mod collaborators;
pub mod controller;
pub mod error;
pub mod managers;
pub mod nodes;
pub mod poller;
pub mod queue;
pub mod reconciler;
pub mod route;
pub mod saga;
pub mod tls;

// Re-exports
pub use collaborators::{
    AddressKind, Collaborators, EventType, NodeAddress, NodeInfo, NodeLister, SecretReader,
    ServicePortResolver, StatusSink, TlsMaterial, reasons,
};
pub use controller::{Controller, NotificationSender};
pub use error::{Error, Result};
pub use nodes::{NodeChange, NodeSetTracker, NodeSnapshot, ReadyNode};
pub use poller::{PollConfig, PollState, StatusPoller};
pub use queue::{Notification, NotificationKind, RateLimit, WorkQueue};
pub use reconciler::{EnsureOutcome, Reconciler, ReconcilerSettings};
pub use route::{
    ANNOTATION_INTERNAL, ANNOTATION_MANAGE_SECURITY_GROUPS, Backend, BackendPort, RouteKey,
    RouteRule, RouteSpec, TlsEntry, TlsSource,
};
