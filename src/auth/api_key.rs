//! API key lifecycle
//!
//! Keys are stored hashed; the raw value exists only in the response to
//! the create or rotate call that produced it.

use super::types::{ApiKey, User};
use crate::storage::ApiKeyStore;
use crate::utils::crypto;
use crate::utils::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Fields supplied when creating a key
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NewApiKey {
    pub name: String,
    /// Bound user; omit for a standalone key
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub project_codes: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub rate_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create/verify/rotate/revoke operations over the key store
pub struct ApiKeyManager {
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }

    /// Create a key; the raw value is returned exactly once
    pub async fn create_key(&self, request: NewApiKey) -> Result<(ApiKey, String)> {
        if request.name.is_empty() {
            return Err(GatewayError::BadRequest("API key needs a name".into()));
        }

        let raw = crypto::generate_api_key();
        let key = ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            key_hash: crypto::hash_secret(&raw),
            prefix: crypto::key_prefix(&raw),
            name: request.name,
            user_id: request.user_id,
            tenant_id: request.tenant_id,
            project_codes: request.project_codes,
            permissions: request.permissions,
            rate_limit: request.rate_limit,
            active: true,
            expires_at: request.expires_at,
            created_at: Utc::now(),
            last_used_at: None,
        };
        self.store.upsert_api_key(key.clone()).await?;
        info!(key = %key.id, name = %key.name, "Created API key");
        Ok((key, raw))
    }

    /// Verify a presented raw key and stamp its last-used time
    pub async fn verify_key(&self, raw: &str) -> Result<ApiKey> {
        let hash = crypto::hash_secret(raw);
        let mut key = self
            .store
            .get_api_key_by_hash(&hash)
            .await?
            .ok_or(GatewayError::InvalidCredentials)?;

        if !key.is_usable() {
            debug!(key = %key.id, "Rejected inactive or expired API key");
            return Err(GatewayError::InvalidCredentials);
        }

        key.last_used_at = Some(Utc::now());
        // Persist the stamp off the request path; a lost update only
        // stales the audit field
        let store = Arc::clone(&self.store);
        let touched = key.clone();
        tokio::spawn(async move {
            if let Err(e) = store.upsert_api_key(touched).await {
                debug!(error = %e, "Failed to persist API key last-used stamp");
            }
        });
        Ok(key)
    }

    /// Replace the key's secret; the old raw value stops validating
    pub async fn rotate_key(&self, id: &str) -> Result<(ApiKey, String)> {
        let mut key = self
            .store
            .get_api_key(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("API key {}", id)))?;

        let raw = crypto::generate_api_key();
        key.key_hash = crypto::hash_secret(&raw);
        key.prefix = crypto::key_prefix(&raw);
        self.store.upsert_api_key(key.clone()).await?;
        info!(key = %id, "Rotated API key");
        Ok((key, raw))
    }

    /// Deactivate a key without deleting its record
    pub async fn revoke_key(&self, id: &str) -> Result<()> {
        let mut key = self
            .store
            .get_api_key(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("API key {}", id)))?;
        key.active = false;
        self.store.upsert_api_key(key).await?;
        info!(key = %id, "Revoked API key");
        Ok(())
    }

    pub async fn delete_key(&self, id: &str) -> Result<()> {
        if self.store.delete_api_key(id).await? {
            info!(key = %id, "Deleted API key");
            Ok(())
        } else {
            Err(GatewayError::NotFound(format!("API key {}", id)))
        }
    }

    pub async fn list_keys(&self, tenant_id: Option<&str>) -> Result<Vec<ApiKey>> {
        self.store.list_api_keys(tenant_id).await
    }

    /// Scoped principal for a key with no bound user
    pub fn virtual_user(key: &ApiKey) -> User {
        User {
            id: format!("api-key:{}", key.id),
            username: key.name.clone(),
            password_hash: String::new(),
            tenant_id: key.tenant_id.clone(),
            project_codes: key.project_codes.clone(),
            roles: Vec::new(),
            permissions: key.permissions.clone(),
            active: key.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn manager() -> ApiKeyManager {
        ApiKeyManager::new(Arc::new(MemoryStore::new()))
    }

    fn new_key(name: &str) -> NewApiKey {
        NewApiKey {
            name: name.into(),
            tenant_id: Some("acme".into()),
            permissions: vec!["billing:read".into()],
            ..NewApiKey::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let m = manager();
        let (created, raw) = m.create_key(new_key("ci")).await.unwrap();
        assert!(raw.starts_with("sw-"));
        assert!(created.prefix.len() < raw.len());

        let verified = m.verify_key(&raw).await.unwrap();
        assert_eq!(verified.id, created.id);
        assert!(verified.last_used_at.is_some());

        assert!(matches!(
            m.verify_key("sw-not-a-real-key").await.unwrap_err(),
            GatewayError::InvalidCredentials
        ));
    }

    #[tokio::test]
    async fn test_verify_stamps_last_used_in_store() {
        use crate::storage::ApiKeyStore;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let m = ApiKeyManager::new(store.clone());
        let (created, raw) = m.create_key(new_key("ci")).await.unwrap();
        assert!(created.last_used_at.is_none());

        m.verify_key(&raw).await.unwrap();

        // The stamp is written by a spawned task; poll for it
        let mut stamped = false;
        for _ in 0..50 {
            let stored = store.get_api_key(&created.id).await.unwrap().unwrap();
            if stored.last_used_at.is_some() {
                stamped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stamped);
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_raw_key() {
        let m = manager();
        let (created, old_raw) = m.create_key(new_key("ci")).await.unwrap();

        let (rotated, new_raw) = m.rotate_key(&created.id).await.unwrap();
        assert_eq!(rotated.id, created.id);
        assert_ne!(old_raw, new_raw);

        assert!(m.verify_key(&old_raw).await.is_err());
        assert_eq!(m.verify_key(&new_raw).await.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn test_revoked_key_fails_verification() {
        let m = manager();
        let (created, raw) = m.create_key(new_key("ci")).await.unwrap();
        m.revoke_key(&created.id).await.unwrap();
        assert!(m.verify_key(&raw).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_key_fails_verification() {
        let m = manager();
        let (_, raw) = m
            .create_key(NewApiKey {
                expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
                ..new_key("stale")
            })
            .await
            .unwrap();
        assert!(m.verify_key(&raw).await.is_err());
    }

    #[tokio::test]
    async fn test_virtual_user_carries_key_scope() {
        let m = manager();
        let (created, _) = m.create_key(new_key("ci")).await.unwrap();
        let user = ApiKeyManager::virtual_user(&created);
        assert_eq!(user.tenant_id.as_deref(), Some("acme"));
        assert_eq!(user.permissions, vec!["billing:read".to_string()]);
        assert!(user.active);
    }
}
