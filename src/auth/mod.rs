//! Authentication and authorization
//!
//! Credential detection tries, in order: bearer JWT, API-key header,
//! API-key query parameter, session cookie, SSO header, Basic. The first
//! detected credential that validates wins; session and SSO tokens are
//! gateway-issued JWTs presented through other channels.

pub mod api_key;
pub mod blacklist;
pub mod jwt;
pub mod rate_limit;
pub mod types;

pub use api_key::{ApiKeyManager, NewApiKey};
pub use blacklist::TokenBlacklist;
pub use jwt::JwtManager;
pub use rate_limit::AuthRateLimiter;
pub use types::{ApiKey, AuthContext, AuthMethod, Claims, TokenPair, User};

use crate::config::AuthConfig;
use crate::core::tenant::TenantContext;
use crate::storage::{ApiKeyStore, RefreshTokenStore, UserStore};
use crate::utils::crypto;
use crate::utils::error::{GatewayError, Result};
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The request fields credential detection inspects
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Header map with lowercase names
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub client_ip: Option<String>,
    pub request_id: String,
}

enum Credential {
    Jwt(String),
    ApiKey(String),
    Session(String),
    Sso(String),
    Basic(String),
}

/// Authentication facade over tokens, API keys and the user store
pub struct AuthSystem {
    config: AuthConfig,
    jwt: JwtManager,
    api_keys: ApiKeyManager,
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    rate_limiter: AuthRateLimiter,
}

impl AuthSystem {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        api_keys: Arc<dyn ApiKeyStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let jwt = JwtManager::new(&config);
        let rate_limiter = AuthRateLimiter::new(config.rate_limit.clone());
        Self {
            config,
            jwt,
            api_keys: ApiKeyManager::new(api_keys),
            users,
            refresh_tokens,
            rate_limiter,
        }
    }

    /// Whether a path is exempt from authentication
    pub fn is_public_path(&self, path: &str) -> bool {
        self.config
            .public_paths
            .iter()
            .any(|p| path == p || path.starts_with(&format!("{}/", p.trim_end_matches('/'))))
    }

    /// Authenticate a request
    ///
    /// `Ok(None)` means no credentials were presented and none are
    /// required. When credentials are present but all fail, the last
    /// failure is returned tagged with its specific code.
    pub async fn authenticate(&self, request: &AuthRequest) -> Result<Option<AuthContext>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let credentials = self.detect_credentials(request);
        if credentials.is_empty() {
            if self.config.required {
                return Err(GatewayError::MissingToken);
            }
            return Ok(None);
        }

        let mut last_error = GatewayError::InvalidCredentials;
        for credential in credentials {
            let attempt = match credential {
                Credential::Jwt(token) => self.try_jwt(&token, AuthMethod::Jwt, request).await,
                Credential::ApiKey(raw) => self.try_api_key(&raw, request).await,
                Credential::Session(token) => {
                    self.try_jwt(&token, AuthMethod::Session, request).await
                }
                Credential::Sso(token) => self.try_jwt(&token, AuthMethod::Sso, request).await,
                Credential::Basic(encoded) => self.try_basic(&encoded, request).await,
            };
            match attempt {
                Ok(context) => {
                    debug!(user = %context.user.id, method = ?context.method, "Authenticated");
                    return Ok(Some(context));
                }
                Err(error) => last_error = error,
            }
        }
        Err(last_error)
    }

    fn detect_credentials(&self, request: &AuthRequest) -> Vec<Credential> {
        let mut found = Vec::new();

        if let Some(auth) = request.headers.get("authorization") {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                found.push(Credential::Jwt(token.trim().to_string()));
            }
        }
        if let Some(key) = request.headers.get(&self.config.api_key_header) {
            if !key.is_empty() {
                found.push(Credential::ApiKey(key.clone()));
            }
        }
        if let Some(key) = request.query.get(&self.config.api_key_query) {
            if !key.is_empty() {
                found.push(Credential::ApiKey(key.clone()));
            }
        }
        if let Some(token) = request.cookies.get(&self.config.session_cookie) {
            if !token.is_empty() {
                found.push(Credential::Session(token.clone()));
            }
        }
        if let Some(token) = request.headers.get(&self.config.sso_header) {
            if !token.is_empty() {
                found.push(Credential::Sso(token.clone()));
            }
        }
        if let Some(auth) = request.headers.get("authorization") {
            if let Some(encoded) = auth.strip_prefix("Basic ") {
                found.push(Credential::Basic(encoded.trim().to_string()));
            }
        }
        found
    }

    async fn try_jwt(
        &self,
        token: &str,
        method: AuthMethod,
        request: &AuthRequest,
    ) -> Result<AuthContext> {
        let claims = self.jwt.validate_token(token)?;

        // Prefer the stored user; tokens outlive permission edits
        let user = match self.users.get_user(&claims.sub).await? {
            Some(user) => user,
            None => User {
                id: claims.sub.clone(),
                username: claims.sub.clone(),
                password_hash: String::new(),
                tenant_id: claims.tenant_id.clone(),
                project_codes: claims.project_codes.clone(),
                roles: claims.roles.clone(),
                permissions: claims.permissions.clone(),
                active: true,
            },
        };
        if !user.active {
            return Err(GatewayError::InvalidCredentials);
        }

        Ok(AuthContext {
            user,
            method,
            token_tenant_id: claims.tenant_id,
            client_ip: request.client_ip.clone(),
            request_id: request.request_id.clone(),
        })
    }

    async fn try_api_key(&self, raw: &str, request: &AuthRequest) -> Result<AuthContext> {
        let key = self.api_keys.verify_key(raw).await?;

        let user = match &key.user_id {
            Some(user_id) => {
                let user = self
                    .users
                    .get_user(user_id)
                    .await?
                    .ok_or(GatewayError::InvalidCredentials)?;
                if !user.active {
                    return Err(GatewayError::InvalidCredentials);
                }
                user
            }
            None => ApiKeyManager::virtual_user(&key),
        };

        Ok(AuthContext {
            user,
            method: AuthMethod::ApiKey,
            token_tenant_id: key.tenant_id,
            client_ip: request.client_ip.clone(),
            request_id: request.request_id.clone(),
        })
    }

    async fn try_basic(&self, encoded: &str, request: &AuthRequest) -> Result<AuthContext> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| GatewayError::InvalidCredentials)?;
        let decoded = String::from_utf8(decoded).map_err(|_| GatewayError::InvalidCredentials)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(GatewayError::InvalidCredentials)?;

        let user = self.verify_password(username, password).await?;
        Ok(AuthContext {
            token_tenant_id: user.tenant_id.clone(),
            user,
            method: AuthMethod::Basic,
            client_ip: request.client_ip.clone(),
            request_id: request.request_id.clone(),
        })
    }

    /// Check a username/password pair against the lockout tracker and store
    async fn verify_password(&self, username: &str, password: &str) -> Result<User> {
        self.rate_limiter.check(username)?;

        let user = self.users.get_user_by_username(username).await?;
        let valid = match &user {
            Some(user) => {
                user.active
                    && !user.password_hash.is_empty()
                    && crypto::verify_password(password, &user.password_hash)
            }
            None => false,
        };

        if !valid {
            self.rate_limiter.record_failure(username);
            warn!(username = %username, "Failed password authentication");
            return Err(GatewayError::InvalidCredentials);
        }
        self.rate_limiter.record_success(username);
        // valid implies user is Some
        user.ok_or(GatewayError::InvalidCredentials)
    }

    /// Authorize an authenticated caller
    ///
    /// Checks, in order: user active flag, token-vs-resolved tenant match,
    /// project overlap, and permission coverage (exact or `resource:*`
    /// wildcard). Denials report the missing permissions.
    pub fn authorize(
        &self,
        context: &AuthContext,
        required: &[&str],
        tenant: Option<&TenantContext>,
    ) -> Result<()> {
        if !context.user.active {
            return Err(GatewayError::InvalidCredentials);
        }

        if let (Some(token_tenant), Some(tenant)) = (&context.token_tenant_id, tenant) {
            if token_tenant != &tenant.tenant_id {
                return Err(GatewayError::TenantMismatch(format!(
                    "credential is scoped to tenant {}",
                    token_tenant
                )));
            }
            if let Some(project) = &tenant.project_code {
                if !context.user.project_codes.is_empty()
                    && !context.user.project_codes.contains(project)
                {
                    return Err(GatewayError::TenantMismatch(format!(
                        "credential has no access to project {}",
                        project
                    )));
                }
            }
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|permission| !Self::holds_permission(&context.user.permissions, permission))
            .map(|p| p.to_string())
            .collect();
        if !missing.is_empty() {
            debug!(user = %context.user.id, missing = ?missing, "Authorization denied");
            return Err(GatewayError::InsufficientPermissions { missing });
        }
        Ok(())
    }

    /// Exact match or a `resource:*` wildcard held by the user
    fn holds_permission(held: &[String], required: &str) -> bool {
        if held.iter().any(|p| p == required) {
            return true;
        }
        match required.split_once(':') {
            Some((resource, _)) => held.iter().any(|p| p == &format!("{}:*", resource)),
            None => false,
        }
    }

    /// Password login issuing an access token and a refresh token
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let user = self.verify_password(username, password).await?;
        let (access_token, _) = self.jwt.generate_token(&user)?;

        let refresh_raw = crypto::generate_token(48);
        self.refresh_tokens
            .insert_refresh_token(types::RefreshTokenRecord {
                token_hash: crypto::hash_secret(&refresh_raw),
                user_id: user.id.clone(),
                expires_at: Utc::now()
                    + ChronoDuration::seconds(self.config.refresh_ttl_secs as i64),
                revoked: false,
            })
            .await?;

        info!(user = %user.id, "Login");
        Ok(TokenPair {
            access_token,
            refresh_token: Some(refresh_raw),
            token_type: "Bearer",
            expires_in: self.jwt.expiration_secs(),
        })
    }

    /// Exchange a valid refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let hash = crypto::hash_secret(refresh_token);
        let record = self
            .refresh_tokens
            .get_refresh_token(&hash)
            .await?
            .ok_or_else(|| GatewayError::InvalidToken("unknown refresh token".into()))?;

        if record.revoked {
            return Err(GatewayError::InvalidToken("refresh token revoked".into()));
        }
        if record.expires_at <= Utc::now() {
            return Err(GatewayError::ExpiredToken);
        }

        let user = self
            .users
            .get_user(&record.user_id)
            .await?
            .filter(|u| u.active)
            .ok_or(GatewayError::InvalidCredentials)?;

        let (access_token, _) = self.jwt.generate_token(&user)?;
        debug!(user = %user.id, "Refreshed access token");
        Ok(TokenPair {
            access_token,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: self.jwt.expiration_secs(),
        })
    }

    /// Blacklist the access token and revoke the refresh token, if given
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.jwt.blacklist_token(access_token)?;
        if let Some(refresh) = refresh_token {
            self.refresh_tokens
                .revoke_refresh_token(&crypto::hash_secret(refresh))
                .await?;
        }
        info!("Logout");
        Ok(())
    }

    /// Spawn the periodic sweeper for the token blacklist and the
    /// failed-attempt tracker
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let auth = Arc::clone(self);
        let interval = Duration::from_secs(auth.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pruned = auth.jwt.sweep_blacklist();
                auth.rate_limiter.sweep();
                if pruned > 0 {
                    debug!(pruned, "Swept expired blacklist entries");
                }
            }
        })
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn api_keys(&self) -> &ApiKeyManager {
        &self.api_keys
    }

    pub fn rate_limiter(&self) -> &AuthRateLimiter {
        &self.rate_limiter
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
