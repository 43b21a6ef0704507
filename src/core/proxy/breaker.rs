//! Per-endpoint circuit breaker
//!
//! CLOSED → (threshold consecutive failures) → OPEN → (recovery timeout)
//! → HALF_OPEN → CLOSED on success / OPEN on failure. The OPEN→HALF_OPEN
//! transition happens inside the lock so concurrent observers of the
//! expiry agree; more than one HALF_OPEN probe may pass through, each
//! outcome recorded independently.

use crate::config::BreakerConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
}

/// Point-in-time breaker view for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    /// Milliseconds until the next probe is allowed, when OPEN
    pub retry_in_ms: Option<u64>,
}

/// Failure-isolation gate for one endpoint
pub struct EndpointBreaker {
    endpoint_id: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl EndpointBreaker {
    pub fn new(endpoint_id: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                next_attempt: None,
            }),
        }
    }

    /// Whether a call may proceed right now
    ///
    /// OPEN past its recovery deadline transitions to HALF_OPEN and lets
    /// the caller through as a probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let expired = inner
                    .next_attempt
                    .map(|t| Instant::now() >= t)
                    .unwrap_or(true);
                if expired {
                    info!(endpoint = %self.endpoint_id, "Circuit breaker half-open, probing");
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            info!(endpoint = %self.endpoint_id, "Circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.next_attempt = None;
    }

    /// Record a failed call
    ///
    /// A HALF_OPEN failure re-opens immediately regardless of the
    /// threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let reopen = inner.state == BreakerState::HalfOpen;
        if reopen || inner.failure_count >= self.failure_threshold {
            if inner.state != BreakerState::Open {
                warn!(
                    endpoint = %self.endpoint_id,
                    failures = inner.failure_count,
                    recovery_secs = self.recovery_timeout.as_secs(),
                    "Circuit breaker opened"
                );
            }
            inner.state = BreakerState::Open;
            inner.next_attempt = Some(Instant::now() + self.recovery_timeout);
        }
    }

    /// Force the breaker back to CLOSED (admin surface)
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(endpoint = %self.endpoint_id, "Circuit breaker reset");
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.next_attempt = None;
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            retry_in_ms: inner
                .next_attempt
                .and_then(|t| t.checked_duration_since(Instant::now()))
                .map(|d| d.as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> EndpointBreaker {
        EndpointBreaker::new(
            "ep1",
            &BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout_secs: recovery_secs,
            },
        )
    }

    #[test]
    fn test_opens_at_threshold_and_fails_fast() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn test_closed_success_resets_failure_count() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.snapshot().failure_count, 0);

        // The streak starts over
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_open_transitions_to_half_open_after_recovery() {
        let b = breaker(1, 0);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // Zero recovery timeout: the deadline has already passed
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Further probes are allowed while half-open
        assert!(b.try_acquire());
    }

    #[test]
    fn test_half_open_success_closes_and_resets() {
        let b = breaker(1, 0);
        b.record_failure();
        assert!(b.try_acquire());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failure_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let b = breaker(5, 60);
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Open);

        // Force the probe window open
        b.reset();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_single_failure_reopens() {
        let b = breaker(5, 0);
        for _ in 0..5 {
            b.record_failure();
        }
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        // One failure in HALF_OPEN is enough, threshold ignored
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_reset_clears_open_state() {
        let b = breaker(1, 60);
        b.record_failure();
        assert!(!b.try_acquire());
        b.reset();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_snapshot_reports_retry_window() {
        let b = breaker(1, 60);
        b.record_failure();
        let snap = b.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.failure_count, 1);
        assert!(snap.retry_in_ms.unwrap() <= 60_000);
    }
}
