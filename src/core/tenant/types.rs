//! Tenant data model

use crate::config::TenantStrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Lifecycle state of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

/// A customer organization, the top-level multi-tenancy boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: TenantStatus,
    /// Plan tier, informational for downstream services
    #[serde(default)]
    pub tier: String,
    /// Enabled feature flags
    #[serde(default)]
    pub features: Vec<String>,
    /// Named quota limits
    #[serde(default)]
    pub quotas: HashMap<String, u64>,
    /// Subdomain the tenant is reachable under, when subdomain
    /// resolution is in use
    #[serde(default)]
    pub subdomain: Option<String>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TenantStatus::Active,
            tier: String::new(),
            features: Vec::new(),
            quotas: HashMap::new(),
            subdomain: None,
        }
    }
}

/// A named sub-scope within a tenant; codes are globally unique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub code: String,
    pub name: String,
    pub status: ProjectStatus,
    pub tenant_id: String,
}

impl Project {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            status: ProjectStatus::Active,
            tenant_id: tenant_id.into(),
        }
    }
}

/// How a tenant identity was obtained for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Strategy(TenantStrategyKind),
    Custom(String),
    Fallback,
}

/// The raw identity a strategy extracted, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResolution {
    pub tenant_id: String,
    pub project_code: Option<String>,
    pub source: ResolutionSource,
}

/// Validated, request-scoped projection of tenant and project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub tenant_name: String,
    pub tier: String,
    pub features: Vec<String>,
    pub quotas: HashMap<String, u64>,
    pub project_code: Option<String>,
    pub project_name: Option<String>,
    /// Which strategy produced the identity
    pub source: ResolutionSource,
    pub resolved_at: DateTime<Utc>,
}

/// Cache entry wrapping a context with its TTL bounds
#[derive(Debug, Clone)]
pub struct CachedContext {
    pub context: TenantContext,
    pub cached_at: Instant,
    pub expires_at: Instant,
}
