//! Key and token generation utilities

use crate::utils::error::{GatewayError, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Generate a secure API key
pub fn generate_api_key() -> String {
    let random_part: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    format!("sw-{}", random_part)
}

/// Generate an opaque token (refresh tokens, session ids)
pub fn generate_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Hash an API key or opaque token for storage and lookup
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Key prefix for identification in listings, never the full key
pub fn key_prefix(api_key: &str) -> String {
    if api_key.len() >= 8 {
        format!("{}...{}", &api_key[..4], &api_key[api_key.len() - 4..])
    } else {
        api_key.to_string()
    }
}

/// Hash a password with argon2 for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| GatewayError::internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored argon2 hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key_format() {
        let key = generate_api_key();
        assert!(key.starts_with("sw-"));
        assert_eq!(key.len(), 35);
    }

    #[test]
    fn test_hash_secret_is_deterministic() {
        let key = "sw-abcdef";
        assert_eq!(hash_secret(key), hash_secret(key));
        assert_ne!(hash_secret(key), hash_secret("sw-other"));
    }

    #[test]
    fn test_key_prefix_hides_middle() {
        let key = "sw-1234567890";
        let prefix = key_prefix(key);
        assert_eq!(prefix, "sw-1...7890");
        assert!(!prefix.contains("456"));
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
        assert!(!verify_password("hunter2!", "not-a-hash"));
    }
}
