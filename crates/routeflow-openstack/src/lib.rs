//! OpenStack backend for routeflow
//!
//! Implements [`routeflow_cloud::CloudApi`] over the REST APIs of
//! Octavia (load balancing), Neutron (security groups, ports, floating IPs)
//! and Barbican (TLS bundles).
//!
//! # Example
//!
//! ```ignore
//! use routeflow_openstack::{Endpoints, OpenStackCloud};
//!
//! let cloud = OpenStackCloud::new(
//!     Endpoints {
//!         loadbalancer: "https://lb.example.com".into(),
//!         network: "https://net.example.com".into(),
//!         key_manager: "https://kms.example.com".into(),
//!     },
//!     std::env::var("OS_AUTH_TOKEN")?,
//! )?;
//! let lbs = cloud.list_load_balancers("kube_ingress_prod_default_web").await?;
//! ```

pub mod client;
pub mod error;
mod wire;

pub use client::{Endpoints, OpenStackCloud};
pub use error::{OpenStackError, Result};
