//! Revoked-token blacklist
//!
//! Entries are keyed by SHA-256 of the token and live only as long as the
//! token itself would have. Expired entries are pruned lazily on lookup
//! and by an occasional sweep.

use crate::utils::crypto;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// In-process blacklist of revoked access tokens
#[derive(Default)]
pub struct TokenBlacklist {
    /// token hash → entry expiry
    entries: DashMap<String, Instant>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blacklist a token for its remaining lifetime
    pub fn insert(&self, token: &str, remaining: Duration) {
        let hash = crypto::hash_secret(token);
        debug!(ttl_secs = remaining.as_secs(), "Blacklisted token");
        self.entries.insert(hash, Instant::now() + remaining);
    }

    /// Whether a token is currently blacklisted
    pub fn contains(&self, token: &str) -> bool {
        let hash = crypto::hash_secret(token);
        if let Some(expiry) = self.entries.get(&hash).map(|e| *e) {
            if expiry > Instant::now() {
                return true;
            }
            self.entries.remove(&hash);
        }
        false
    }

    /// Drop expired entries
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, expiry| *expiry > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklisted_until_expiry() {
        let bl = TokenBlacklist::new();
        bl.insert("tok-1", Duration::from_secs(60));
        assert!(bl.contains("tok-1"));
        assert!(!bl.contains("tok-2"));
    }

    #[test]
    fn test_expired_entry_is_not_blacklisted() {
        let bl = TokenBlacklist::new();
        bl.insert("tok-1", Duration::from_secs(0));
        assert!(!bl.contains("tok-1"));
    }

    #[test]
    fn test_sweep_prunes_expired() {
        let bl = TokenBlacklist::new();
        bl.insert("tok-1", Duration::from_secs(0));
        bl.insert("tok-2", Duration::from_secs(60));
        assert_eq!(bl.sweep(), 1);
        assert_eq!(bl.len(), 1);
    }
}
