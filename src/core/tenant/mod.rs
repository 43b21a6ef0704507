//! Tenant resolution
//!
//! Determines which tenant (and optionally project) a request belongs
//! to, validates it against tenant state, and carries the result as an
//! explicit [`TenantContext`] through the dispatch pipeline.

pub mod metrics;
pub mod resolver;
pub mod types;

pub use metrics::{TenantMetrics, TenantMetricsSnapshot};
pub use resolver::{CustomResolver, ResolveRequest, TenantResolver};
pub use types::{
    Project, ProjectStatus, ResolutionSource, Tenant, TenantContext, TenantStatus,
};
