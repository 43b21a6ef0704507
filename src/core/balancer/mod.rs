//! Load balancer
//!
//! Selects one healthy endpoint per request. Counters and sticky entries
//! are keyed per service or per endpoint so unrelated requests never
//! contend on the same lock.

use crate::config::{BalanceStrategy, BalancerConfig};
use crate::core::registry::ServiceEndpoint;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Sticky binding of one session to one endpoint
struct StickyEntry {
    endpoint_id: String,
    last_seen: Instant,
}

/// Endpoint selection with per-service round-robin counters,
/// per-endpoint in-flight counts and an optional sticky-session map
pub struct LoadBalancer {
    config: BalancerConfig,
    /// Per-service monotonic counters for (weighted) round-robin
    counters: DashMap<String, AtomicUsize>,
    /// Per-endpoint in-flight request counts
    connections: DashMap<String, AtomicUsize>,
    /// `service:session` → sticky endpoint binding
    sticky: DashMap<String, StickyEntry>,
}

/// Aggregate balancer view for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct BalancerStats {
    /// Strategy in use
    pub strategy: BalanceStrategy,
    /// In-flight request count per endpoint id
    pub connections: HashMap<String, usize>,
    /// Live sticky session count
    pub sticky_sessions: usize,
}

impl LoadBalancer {
    /// Create a balancer with the configured strategy
    pub fn new(config: BalancerConfig) -> Self {
        Self {
            config,
            counters: DashMap::new(),
            connections: DashMap::new(),
            sticky: DashMap::new(),
        }
    }

    /// Strategy in use
    pub fn strategy(&self) -> BalanceStrategy {
        self.config.strategy
    }

    /// Pick an endpoint for a request
    ///
    /// `endpoints` is the healthy set the router obtained from the
    /// registry. A single endpoint short-circuits the strategy logic.
    /// Sticky sessions, when enabled and valid, win over the strategy.
    pub fn select(
        &self,
        service_name: &str,
        endpoints: &[ServiceEndpoint],
        client_ip: Option<&str>,
        session_id: Option<&str>,
    ) -> Option<ServiceEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        if endpoints.len() == 1 {
            return Some(endpoints[0].clone());
        }

        if self.config.sticky_sessions {
            if let Some(session_id) = session_id {
                if let Some(endpoint) = self.sticky_lookup(service_name, session_id, endpoints) {
                    trace!(service = %service_name, endpoint = %endpoint.id, "Sticky session hit");
                    return Some(endpoint);
                }
            }
        }

        let selected = match self.config.strategy {
            BalanceStrategy::RoundRobin => self.select_round_robin(service_name, endpoints),
            BalanceStrategy::WeightedRoundRobin => self.select_weighted(service_name, endpoints),
            BalanceStrategy::LeastConnections => self.select_least_connections(endpoints),
            BalanceStrategy::IpHash => self.select_ip_hash(service_name, endpoints, client_ip),
        };

        if self.config.sticky_sessions {
            if let Some(session_id) = session_id {
                self.sticky.insert(
                    sticky_key(service_name, session_id),
                    StickyEntry {
                        endpoint_id: selected.id.clone(),
                        last_seen: Instant::now(),
                    },
                );
            }
        }

        debug!(service = %service_name, endpoint = %selected.id, strategy = ?self.config.strategy, "Selected endpoint");
        Some(selected)
    }

    /// Sticky lookup: entry must be unexpired and point at a still-healthy
    /// endpoint; a hit refreshes the timestamp.
    fn sticky_lookup(
        &self,
        service_name: &str,
        session_id: &str,
        endpoints: &[ServiceEndpoint],
    ) -> Option<ServiceEndpoint> {
        let key = sticky_key(service_name, session_id);
        let mut entry = self.sticky.get_mut(&key)?;

        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        if entry.last_seen.elapsed() > ttl {
            drop(entry);
            self.sticky.remove(&key);
            return None;
        }

        match endpoints.iter().find(|e| e.id == entry.endpoint_id) {
            Some(endpoint) => {
                entry.last_seen = Instant::now();
                Some(endpoint.clone())
            }
            None => {
                drop(entry);
                self.sticky.remove(&key);
                None
            }
        }
    }

    fn select_round_robin(
        &self,
        service_name: &str,
        endpoints: &[ServiceEndpoint],
    ) -> ServiceEndpoint {
        let counter = self
            .counters
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let index = counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        endpoints[index].clone()
    }

    /// Weighted round-robin over a virtual pool expanded by weight
    fn select_weighted(&self, service_name: &str, endpoints: &[ServiceEndpoint]) -> ServiceEndpoint {
        let pool: Vec<usize> = endpoints
            .iter()
            .enumerate()
            .flat_map(|(i, e)| std::iter::repeat(i).take(e.weight.max(1) as usize))
            .collect();

        let counter = self
            .counters
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let index = counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        endpoints[pool[index]].clone()
    }

    /// Smallest tracked in-flight count; ties go to encounter order
    fn select_least_connections(&self, endpoints: &[ServiceEndpoint]) -> ServiceEndpoint {
        let mut best = &endpoints[0];
        let mut best_count = self.connection_count(&best.id);

        for endpoint in &endpoints[1..] {
            let count = self.connection_count(&endpoint.id);
            if count < best_count {
                best_count = count;
                best = endpoint;
            }
        }
        best.clone()
    }

    /// Deterministic hash of the client IP; no IP falls back to round-robin
    fn select_ip_hash(
        &self,
        service_name: &str,
        endpoints: &[ServiceEndpoint],
        client_ip: Option<&str>,
    ) -> ServiceEndpoint {
        match client_ip {
            Some(ip) => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                ip.hash(&mut hasher);
                let index = (hasher.finish() as usize) % endpoints.len();
                endpoints[index].clone()
            }
            None => self.select_round_robin(service_name, endpoints),
        }
    }

    /// In-flight count for an endpoint
    pub fn connection_count(&self, endpoint_id: &str) -> usize {
        self.connections
            .get(endpoint_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Proxy marks a request in flight on the endpoint
    pub fn begin_request(&self, endpoint_id: &str) {
        self.connections
            .entry(endpoint_id.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Proxy marks the request finished (including cancellation paths)
    pub fn end_request(&self, endpoint_id: &str) {
        if let Some(counter) = self.connections.get(endpoint_id) {
            // Saturating decrement; an unmatched end is a bug upstream but
            // must not wrap the counter
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        }
    }

    /// Evict sticky entries older than the session TTL
    pub fn sweep_sticky_sessions(&self) -> usize {
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        let before = self.sticky.len();
        self.sticky.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        let evicted = before - self.sticky.len();
        if evicted > 0 {
            debug!(evicted, "Swept expired sticky sessions");
        }
        evicted
    }

    /// Spawn the periodic sticky-session sweeper
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let balancer = Arc::clone(self);
        let interval = Duration::from_secs(balancer.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                balancer.sweep_sticky_sessions();
            }
        })
    }

    /// Aggregate view for the admin surface
    pub fn stats(&self) -> BalancerStats {
        BalancerStats {
            strategy: self.config.strategy,
            connections: self
                .connections
                .iter()
                .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
                .collect(),
            sticky_sessions: self.sticky.len(),
        }
    }
}

fn sticky_key(service_name: &str, session_id: &str) -> String {
    format!("{}:{}", service_name, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(n: usize) -> Vec<ServiceEndpoint> {
        (0..n)
            .map(|i| ServiceEndpoint::new(format!("ep{}", i), format!("http://svc-{}:9000", i)))
            .collect()
    }

    fn balancer(strategy: BalanceStrategy) -> LoadBalancer {
        LoadBalancer::new(BalancerConfig {
            strategy,
            ..BalancerConfig::default()
        })
    }

    #[test]
    fn test_single_endpoint_fast_path() {
        let lb = balancer(BalanceStrategy::LeastConnections);
        let eps = endpoints(1);
        let selected = lb.select("svc", &eps, None, None).unwrap();
        assert_eq!(selected.id, "ep0");
    }

    #[test]
    fn test_empty_endpoint_set() {
        let lb = balancer(BalanceStrategy::RoundRobin);
        assert!(lb.select("svc", &[], None, None).is_none());
    }

    #[test]
    fn test_round_robin_is_cyclic_and_even() {
        let lb = balancer(BalanceStrategy::RoundRobin);
        let eps = endpoints(3);

        let mut counts = HashMap::new();
        let mut order = Vec::new();
        for _ in 0..9 {
            let ep = lb.select("svc", &eps, None, None).unwrap();
            *counts.entry(ep.id.clone()).or_insert(0usize) += 1;
            order.push(ep.id);
        }

        // Each of 3 endpoints gets exactly 9/3 requests
        for i in 0..3 {
            assert_eq!(counts[&format!("ep{}", i)], 3);
        }
        // And in cyclic order
        assert_eq!(&order[..3], &["ep0", "ep1", "ep2"]);
        assert_eq!(&order[3..6], &["ep0", "ep1", "ep2"]);
    }

    #[test]
    fn test_round_robin_uneven_split() {
        let lb = balancer(BalanceStrategy::RoundRobin);
        let eps = endpoints(2);

        let mut counts = HashMap::new();
        for _ in 0..7 {
            let ep = lb.select("svc", &eps, None, None).unwrap();
            *counts.entry(ep.id.clone()).or_insert(0usize) += 1;
        }
        // 7 requests over 2 endpoints: one gets 4, the other 3
        let mut values: Vec<usize> = counts.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![3, 4]);
    }

    #[test]
    fn test_weighted_round_robin_three_to_one() {
        let lb = balancer(BalanceStrategy::WeightedRoundRobin);
        let eps = vec![
            ServiceEndpoint::new("a", "http://a:9000").with_weight(3),
            ServiceEndpoint::new("b", "http://b:9000").with_weight(1),
        ];

        let mut counts = HashMap::new();
        for _ in 0..12 {
            let ep = lb.select("svc", &eps, None, None).unwrap();
            *counts.entry(ep.id.clone()).or_insert(0usize) += 1;
        }
        assert_eq!(counts["a"], 9);
        assert_eq!(counts["b"], 3);
    }

    #[test]
    fn test_weighted_treats_zero_weight_as_one() {
        let lb = balancer(BalanceStrategy::WeightedRoundRobin);
        let eps = vec![
            ServiceEndpoint::new("a", "http://a:9000").with_weight(0),
            ServiceEndpoint::new("b", "http://b:9000").with_weight(1),
        ];

        let mut counts = HashMap::new();
        for _ in 0..4 {
            let ep = lb.select("svc", &eps, None, None).unwrap();
            *counts.entry(ep.id.clone()).or_insert(0usize) += 1;
        }
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 2);
    }

    #[test]
    fn test_least_connections_picks_min_with_ties_by_order() {
        let lb = balancer(BalanceStrategy::LeastConnections);
        let eps = endpoints(3);

        // All zero: first endpoint wins the tie
        assert_eq!(lb.select("svc", &eps, None, None).unwrap().id, "ep0");

        lb.begin_request("ep0");
        lb.begin_request("ep0");
        lb.begin_request("ep1");
        assert_eq!(lb.select("svc", &eps, None, None).unwrap().id, "ep2");

        lb.begin_request("ep2");
        lb.begin_request("ep2");
        // ep1 has 1, ep0 has 2, ep2 has 2
        assert_eq!(lb.select("svc", &eps, None, None).unwrap().id, "ep1");
    }

    #[test]
    fn test_connection_counts_decrement_and_saturate() {
        let lb = balancer(BalanceStrategy::LeastConnections);
        lb.begin_request("ep0");
        assert_eq!(lb.connection_count("ep0"), 1);
        lb.end_request("ep0");
        assert_eq!(lb.connection_count("ep0"), 0);
        // Unmatched end must not wrap
        lb.end_request("ep0");
        assert_eq!(lb.connection_count("ep0"), 0);
    }

    #[test]
    fn test_ip_hash_is_deterministic() {
        let lb = balancer(BalanceStrategy::IpHash);
        let eps = endpoints(4);

        let first = lb.select("svc", &eps, Some("10.1.2.3"), None).unwrap();
        for _ in 0..10 {
            let again = lb.select("svc", &eps, Some("10.1.2.3"), None).unwrap();
            assert_eq!(again.id, first.id);
        }
    }

    #[test]
    fn test_sticky_session_binds_and_expires() {
        let lb = LoadBalancer::new(BalancerConfig {
            strategy: BalanceStrategy::RoundRobin,
            sticky_sessions: true,
            session_ttl_secs: 1800,
            ..BalancerConfig::default()
        });
        let eps = endpoints(3);

        let first = lb.select("svc", &eps, None, Some("sess-1")).unwrap();
        // Round-robin would advance, but the sticky entry pins the session
        for _ in 0..5 {
            let again = lb.select("svc", &eps, None, Some("sess-1")).unwrap();
            assert_eq!(again.id, first.id);
        }

        // A different session is balanced independently
        let other = lb.select("svc", &eps, None, Some("sess-2")).unwrap();
        assert_ne!(other.id, first.id);
    }

    #[test]
    fn test_sticky_session_ignores_unhealthy_endpoint() {
        let lb = LoadBalancer::new(BalancerConfig {
            strategy: BalanceStrategy::RoundRobin,
            sticky_sessions: true,
            ..BalancerConfig::default()
        });
        let eps = endpoints(3);
        let first = lb.select("svc", &eps, None, Some("sess-1")).unwrap();

        // The pinned endpoint drops out of the healthy set
        let remaining: Vec<ServiceEndpoint> =
            eps.iter().filter(|e| e.id != first.id).cloned().collect();
        let reselected = lb.select("svc", &remaining, None, Some("sess-1")).unwrap();
        assert_ne!(reselected.id, first.id);
    }

    #[test]
    fn test_sweep_evicts_nothing_when_fresh() {
        let lb = LoadBalancer::new(BalancerConfig {
            strategy: BalanceStrategy::RoundRobin,
            sticky_sessions: true,
            session_ttl_secs: 1800,
            ..BalancerConfig::default()
        });
        let eps = endpoints(2);
        lb.select("svc", &eps, None, Some("sess-1"));
        assert_eq!(lb.sweep_sticky_sessions(), 0);
        assert_eq!(lb.stats().sticky_sessions, 1);
    }
}
