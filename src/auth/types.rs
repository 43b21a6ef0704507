//! Authentication data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A principal known to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 hash; empty for virtual users manufactured from API keys
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub project_codes: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            password_hash: String::new(),
            tenant_id: None,
            project_codes: Vec::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
            active: true,
        }
    }
}

/// Which credential type authenticated the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
    Session,
    Sso,
    Basic,
}

/// The authenticated principal bound to request metadata
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub method: AuthMethod,
    /// Tenant id the credential itself claims, if any
    pub token_tenant_id: Option<String>,
    pub client_ip: Option<String>,
    pub request_id: String,
}

/// An API key record; the raw key exists only at creation/rotation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    /// SHA-256 of the raw key
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First characters of the raw key, for identification in listings
    pub prefix: String,
    pub name: String,
    /// Bound user; a virtual user is manufactured when absent
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub project_codes: Vec<String>,
    pub permissions: Vec<String>,
    /// Requests per minute override, when set
    pub rate_limit: Option<u32>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Whether the key may authenticate right now
    pub fn is_usable(&self) -> bool {
        self.active
            && self
                .expires_at
                .map(|exp| exp > Utc::now())
                .unwrap_or(true)
    }
}

/// JWT claims carried by gateway-issued access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    /// Unique token id, used for blacklisting
    pub jti: String,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub project_codes: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Access token plus optional refresh token, issued at login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// A refresh token at rest; only the hash is stored
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

fn default_true() -> bool {
    true
}
