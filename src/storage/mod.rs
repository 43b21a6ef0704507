//! Backing stores
//!
//! Tenant, project, user, API-key and refresh-token records are injected
//! behind narrow async traits. The in-process [`memory`] implementation
//! backs tests and single-instance deployments; a persistent store can be
//! slotted in without touching the components above.

pub mod memory;

pub use memory::MemoryStore;

use crate::auth::types::{ApiKey, RefreshTokenRecord, User};
use crate::core::tenant::types::{Project, Tenant};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Tenant and project records
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;
    async fn get_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>>;
    async fn upsert_tenant(&self, tenant: Tenant) -> Result<()>;
    async fn get_project(&self, code: &str) -> Result<Option<Project>>;
    async fn upsert_project(&self, project: Project) -> Result<()>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

/// User records
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn upsert_user(&self, user: User) -> Result<()>;
}

/// API-key records, looked up by hash of the presented key
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>>;
    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;
    async fn upsert_api_key(&self, key: ApiKey) -> Result<()>;
    async fn delete_api_key(&self, id: &str) -> Result<bool>;
    async fn list_api_keys(&self, tenant_id: Option<&str>) -> Result<Vec<ApiKey>>;
}

/// Refresh tokens at rest, keyed by token hash
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<()>;
    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>>;
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool>;
}
