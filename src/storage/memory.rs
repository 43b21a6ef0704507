//! In-process store
//!
//! DashMap-backed implementation of every store trait. Used by tests and
//! as the fallback when no external store is configured.

use super::{ApiKeyStore, RefreshTokenStore, TenantStore, UserStore};
use crate::auth::types::{ApiKey, RefreshTokenRecord, User};
use crate::core::tenant::types::{Project, Tenant};
use crate::utils::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// DashMap-backed store for all record kinds
#[derive(Default)]
pub struct MemoryStore {
    tenants: DashMap<String, Tenant>,
    projects: DashMap<String, Project>,
    users: DashMap<String, User>,
    api_keys: DashMap<String, ApiKey>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(id).map(|t| t.clone()))
    }

    async fn get_tenant_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>> {
        Ok(self
            .tenants
            .iter()
            .find(|t| t.subdomain.as_deref() == Some(subdomain))
            .map(|t| t.clone()))
    }

    async fn upsert_tenant(&self, tenant: Tenant) -> Result<()> {
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn get_project(&self, code: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(code).map(|p| p.clone()))
    }

    async fn upsert_project(&self, project: Project) -> Result<()> {
        self.projects.insert(project.code.clone(), project);
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.iter().map(|t| t.clone()).collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: User) -> Result<()> {
        self.users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>> {
        Ok(self.api_keys.get(id).map(|k| k.clone()))
    }

    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        Ok(self
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash)
            .map(|k| k.clone()))
    }

    async fn upsert_api_key(&self, key: ApiKey) -> Result<()> {
        self.api_keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn delete_api_key(&self, id: &str) -> Result<bool> {
        Ok(self.api_keys.remove(id).is_some())
    }

    async fn list_api_keys(&self, tenant_id: Option<&str>) -> Result<Vec<ApiKey>> {
        Ok(self
            .api_keys
            .iter()
            .filter(|k| match tenant_id {
                Some(t) => k.tenant_id.as_deref() == Some(t),
                None => true,
            })
            .map(|k| k.clone())
            .collect())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<()> {
        self.refresh_tokens
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(token_hash).map(|r| r.clone()))
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool> {
        match self.refresh_tokens.get_mut(token_hash) {
            Some(mut record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tenant_round_trip_and_subdomain_lookup() {
        let store = MemoryStore::new();
        let mut tenant = Tenant::new("acme", "Acme Corp");
        tenant.subdomain = Some("acme".into());
        store.upsert_tenant(tenant).await.unwrap();

        assert!(store.get_tenant("acme").await.unwrap().is_some());
        assert!(store.get_tenant("ghost").await.unwrap().is_none());
        assert_eq!(
            store
                .get_tenant_by_subdomain("acme")
                .await
                .unwrap()
                .unwrap()
                .id,
            "acme"
        );
    }

    #[tokio::test]
    async fn test_user_lookup_by_username() {
        let store = MemoryStore::new();
        store.upsert_user(User::new("u1", "alice")).await.unwrap();
        assert_eq!(
            store
                .get_user_by_username("alice")
                .await
                .unwrap()
                .unwrap()
                .id,
            "u1"
        );
        assert!(store.get_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_revocation() {
        let store = MemoryStore::new();
        store
            .insert_refresh_token(RefreshTokenRecord {
                token_hash: "h1".into(),
                user_id: "u1".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::days(7),
                revoked: false,
            })
            .await
            .unwrap();

        assert!(store.revoke_refresh_token("h1").await.unwrap());
        assert!(store.get_refresh_token("h1").await.unwrap().unwrap().revoked);
        assert!(!store.revoke_refresh_token("ghost").await.unwrap());
    }
}
