//! Core request-dispatch pipeline
//!
//! Service registry, load balancer, router, proxy with circuit breaking,
//! and tenant resolution. Each component owns its state; all mutation goes
//! through the owning component's methods.

pub mod balancer;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod tenant;
