//! JWT issuing and validation
//!
//! Access tokens are HS256, carry tenant/project claims, and are checked
//! against the revocation blacklist before signature validation.

use super::blacklist::TokenBlacklist;
use super::types::{Claims, User};
use crate::config::AuthConfig;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use tracing::debug;

/// Issues and validates gateway access tokens
pub struct JwtManager {
    issuer: String,
    audience: String,
    expiration_secs: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    blacklist: TokenBlacklist,
}

impl JwtManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expiration_secs: config.jwt_expiration_secs,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            blacklist: TokenBlacklist::new(),
        }
    }

    /// Issue an access token for a user
    pub fn generate_token(&self, user: &User) -> Result<(String, Claims)> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: now + self.expiration_secs as i64,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            tenant_id: user.tenant_id.clone(),
            project_codes: user.project_codes.clone(),
            roles: user.roles.clone(),
            permissions: user.permissions.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::internal(format!("token signing failed: {}", e)))?;
        debug!(user = %user.id, jti = %claims.jti, "Issued access token");
        Ok((token, claims))
    }

    /// Validate a presented token
    ///
    /// Blacklisted tokens fail even while their signature and expiry are
    /// still good.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        if self.blacklist.contains(token) {
            return Err(GatewayError::InvalidToken("token has been revoked".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => GatewayError::ExpiredToken,
                _ => GatewayError::InvalidToken(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }

    /// Blacklist a token for its remaining lifetime (logout/revocation)
    pub fn blacklist_token(&self, token: &str) -> Result<()> {
        // Decode leniently just to learn the expiry; an expired token
        // needs no blacklist entry
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| GatewayError::InvalidToken(e.to_string()))?
            .claims;

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining > 0 {
            self.blacklist
                .insert(token, Duration::from_secs(remaining as u64));
        }
        Ok(())
    }

    /// Access-token lifetime in seconds
    pub fn expiration_secs(&self) -> u64 {
        self.expiration_secs
    }

    /// Sweep expired blacklist entries
    pub fn sweep_blacklist(&self) -> usize {
        self.blacklist.sweep()
    }

    /// Number of live blacklist entries
    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(expiration_secs: u64) -> AuthConfig {
        AuthConfig {
            jwt_secret: "a-test-secret-that-is-long-enough!!".into(),
            jwt_expiration_secs: expiration_secs,
            ..AuthConfig::default()
        }
    }

    fn user() -> User {
        let mut u = User::new("u1", "alice");
        u.tenant_id = Some("acme".into());
        u.permissions = vec!["billing:read".into()];
        u
    }

    #[test]
    fn test_round_trip_validates() {
        let jwt = JwtManager::new(&config(3600));
        let (token, issued) = jwt.generate_token(&user()).unwrap();

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.tenant_id.as_deref(), Some("acme"));
        assert_eq!(claims.permissions, vec!["billing:read".to_string()]);
    }

    #[test]
    fn test_expired_token_has_expired_code() {
        let cfg = config(3600);
        let jwt = JwtManager::new(&cfg);
        // Craft a token expired well past the default validation leeway
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "u1".into(),
            iss: cfg.issuer.clone(),
            aud: cfg.audience.clone(),
            exp: now - 120,
            iat: now - 3720,
            jti: "expired".into(),
            tenant_id: None,
            project_codes: Vec::new(),
            roles: Vec::new(),
            permissions: Vec::new(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            jwt.validate_token(&token).unwrap_err(),
            GatewayError::ExpiredToken
        ));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let jwt = JwtManager::new(&config(3600));
        let other = JwtManager::new(&AuthConfig {
            jwt_secret: "a-different-secret-also-long-enough".into(),
            ..AuthConfig::default()
        });
        let (token, _) = other.generate_token(&user()).unwrap();
        assert!(matches!(
            jwt.validate_token(&token).unwrap_err(),
            GatewayError::InvalidToken(_)
        ));
    }

    #[test]
    fn test_wrong_issuer_is_invalid() {
        let issuer_config = AuthConfig {
            issuer: "someone-else".into(),
            ..config(3600)
        };
        let other = JwtManager::new(&issuer_config);
        let jwt = JwtManager::new(&config(3600));
        let (token, _) = other.generate_token(&user()).unwrap();
        assert!(matches!(
            jwt.validate_token(&token).unwrap_err(),
            GatewayError::InvalidToken(_)
        ));
    }

    #[test]
    fn test_blacklisted_token_fails_before_expiry() {
        let jwt = JwtManager::new(&config(3600));
        let (token, _) = jwt.generate_token(&user()).unwrap();
        assert!(jwt.validate_token(&token).is_ok());

        jwt.blacklist_token(&token).unwrap();
        assert!(matches!(
            jwt.validate_token(&token).unwrap_err(),
            GatewayError::InvalidToken(_)
        ));
    }
}
