//! Failed-authentication lockout
//!
//! Tracks authentication failures per key (username or client IP) inside
//! a sliding window and locks the key out once the threshold is reached.
//! Consecutive lockouts double the lockout duration.

use crate::config::AuthRateLimitConfig;
use crate::utils::error::{GatewayError, Result};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

struct AttemptEntry {
    failures: Vec<Instant>,
    locked_until: Option<Instant>,
    /// Consecutive lockouts, for exponential backoff
    lockout_streak: u32,
}

/// Per-key failed-attempt tracker with exponential lockout
pub struct AuthRateLimiter {
    config: AuthRateLimitConfig,
    entries: DashMap<String, AttemptEntry>,
}

impl AuthRateLimiter {
    pub fn new(config: AuthRateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Reject when the key is locked out
    pub fn check(&self, key: &str) -> Result<()> {
        if let Some(entry) = self.entries.get(key) {
            if let Some(until) = entry.locked_until {
                let now = Instant::now();
                if until > now {
                    let retry_secs = (until - now).as_secs().max(1);
                    return Err(GatewayError::RateLimited(retry_secs));
                }
            }
        }
        Ok(())
    }

    /// Record a failed attempt; may trigger a lockout
    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        let mut entry = self.entries.entry(key.to_string()).or_insert(AttemptEntry {
            failures: Vec::new(),
            locked_until: None,
            lockout_streak: 0,
        });

        entry.failures.retain(|t| now.duration_since(*t) <= window);
        entry.failures.push(now);

        if entry.failures.len() >= self.config.max_failures as usize {
            entry.lockout_streak += 1;
            let multiplier = 1u64 << (entry.lockout_streak - 1).min(6);
            let lockout = Duration::from_secs(self.config.lockout_secs * multiplier);
            entry.locked_until = Some(now + lockout);
            entry.failures.clear();
            warn!(
                key = %key,
                lockout_secs = lockout.as_secs(),
                streak = entry.lockout_streak,
                "Authentication lockout"
            );
        }
    }

    /// A successful authentication clears the key's history
    pub fn record_success(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drop entries that are neither locked nor carrying recent failures
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        self.entries.retain(|_, entry| {
            let locked = entry.locked_until.map(|t| t > now).unwrap_or(false);
            let recent = entry
                .failures
                .iter()
                .any(|t| now.duration_since(*t) <= window);
            locked || recent
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_failures: u32, lockout_secs: u64) -> AuthRateLimiter {
        AuthRateLimiter::new(AuthRateLimitConfig {
            max_failures,
            window_secs: 300,
            lockout_secs,
        })
    }

    #[test]
    fn test_locks_after_threshold() {
        let rl = limiter(3, 60);
        assert!(rl.check("alice").is_ok());
        rl.record_failure("alice");
        rl.record_failure("alice");
        assert!(rl.check("alice").is_ok());
        rl.record_failure("alice");

        match rl.check("alice").unwrap_err() {
            GatewayError::RateLimited(secs) => assert!(secs <= 60),
            other => panic!("unexpected error: {:?}", other),
        }
        // Other keys are unaffected
        assert!(rl.check("bob").is_ok());
    }

    #[test]
    fn test_success_clears_history() {
        let rl = limiter(3, 60);
        rl.record_failure("alice");
        rl.record_failure("alice");
        rl.record_success("alice");
        rl.record_failure("alice");
        rl.record_failure("alice");
        assert!(rl.check("alice").is_ok());
    }

    #[test]
    fn test_consecutive_lockouts_double() {
        let rl = limiter(1, 10);
        rl.record_failure("alice");
        match rl.check("alice").unwrap_err() {
            GatewayError::RateLimited(secs) => assert!(secs <= 10),
            other => panic!("unexpected error: {:?}", other),
        }

        rl.record_failure("alice");
        match rl.check("alice").unwrap_err() {
            GatewayError::RateLimited(secs) => assert!(secs > 10 && secs <= 20),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
