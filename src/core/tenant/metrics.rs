//! Tenant resolution metrics
//!
//! Updated on every resolution call; read by the admin stats surface.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters maintained by the tenant resolver
#[derive(Default)]
pub struct TenantMetrics {
    /// `tenant` or `tenant:project` → request count
    requests: DashMap<String, AtomicU64>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    latency_total_us: AtomicU64,
    latency_count: AtomicU64,
}

/// Point-in-time metrics view
#[derive(Debug, Clone, Serialize)]
pub struct TenantMetricsSnapshot {
    pub requests: HashMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Hits / (hits + misses); 0 when no lookups happened
    pub cache_hit_rate: f64,
    /// Mean resolution latency in microseconds
    pub mean_latency_us: u64,
}

impl TenantMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, tenant_id: &str, project_code: Option<&str>) {
        let key = match project_code {
            Some(project) => format!("{}:{}", tenant_id, project),
            None => tenant_id.to_string(),
        };
        self.requests
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_total_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TenantMetricsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let count = self.latency_count.load(Ordering::Relaxed);
        TenantMetricsSnapshot {
            requests: self
                .requests
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            mean_latency_us: if count == 0 {
                0
            } else {
                self.latency_total_us.load(Ordering::Relaxed) / count
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_and_request_counts() {
        let m = TenantMetrics::new();
        m.record_request("acme", Some("web"));
        m.record_request("acme", Some("web"));
        m.record_request("globex", None);
        m.record_cache_hit();
        m.record_cache_miss();
        m.record_cache_miss();
        m.record_latency(Duration::from_micros(300));
        m.record_latency(Duration::from_micros(100));

        let snap = m.snapshot();
        assert_eq!(snap.requests["acme:web"], 2);
        assert_eq!(snap.requests["globex"], 1);
        assert!((snap.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(snap.mean_latency_us, 200);
    }

    #[test]
    fn test_empty_snapshot_has_zero_rate() {
        let snap = TenantMetrics::new().snapshot();
        assert_eq!(snap.cache_hit_rate, 0.0);
        assert_eq!(snap.mean_latency_us, 0);
    }
}
