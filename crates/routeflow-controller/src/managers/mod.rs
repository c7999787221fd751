//! Resource lifecycle managers
//!
//! One manager per external resource kind. `ensure` converges a resource to
//! the desired state and is a no-op when it already matches; `delete`
//! tolerates an absent resource. Managers of load-balancer children wait for
//! the load balancer to settle after every mutation.

pub mod floating_ip;
pub mod l7;
pub mod listener;
pub mod loadbalancer;
pub mod pool;
pub mod secret;
pub mod security_group;

pub use floating_ip::FloatingIpManager;
pub use l7::{L7Manager, PolicyTarget, host_rule_pattern};
pub use listener::{ListenerManager, TlsRefs};
pub use loadbalancer::{EnsuredLoadBalancer, LoadBalancerManager};
pub use pool::PoolManager;
pub use secret::SecretManager;
pub use security_group::{Membership, SecurityGroupManager};
