//! Upstream proxy
//!
//! Forwards a routed request to its endpoint behind a per-endpoint
//! circuit breaker, retrying transient transport failures. Any HTTP
//! response from the upstream counts as breaker success; only transport
//! errors (refused, timeout) count as failures.

pub mod breaker;
pub mod headers;

pub use breaker::{BreakerSnapshot, BreakerState, EndpointBreaker};

use crate::config::ProxyConfig;
use crate::core::balancer::LoadBalancer;
use crate::core::registry::ServiceRegistry;
use crate::core::router::RouteMatch;
use crate::utils::error::{GatewayError, Result};
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The parts of the inbound request the proxy forwards
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: reqwest::Method,
    pub headers: HeaderMap,
    /// Raw query string without the leading `?`
    pub query: String,
    pub body: Bytes,
    pub client_ip: Option<String>,
    /// Host the client addressed, for `X-Forwarded-Host`
    pub host: String,
    /// Inbound scheme, for `X-Forwarded-Proto`
    pub scheme: String,
}

/// The upstream response, ready to relay
#[derive(Debug)]
pub struct ProxyOutcome {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub elapsed_ms: u64,
    /// Attempts actually made (1 = no retries)
    pub attempts: u32,
}

/// Decrements the endpoint's in-flight count even on cancellation
struct ConnectionGuard {
    balancer: Arc<LoadBalancer>,
    endpoint_id: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.balancer.end_request(&self.endpoint_id);
    }
}

/// Breaker-gated forwarding engine
pub struct Proxy {
    config: ProxyConfig,
    client: reqwest::Client,
    registry: Arc<ServiceRegistry>,
    balancer: Arc<LoadBalancer>,
    /// Endpoint id → breaker, created lazily on first call
    breakers: DashMap<String, Arc<EndpointBreaker>>,
}

impl Proxy {
    pub fn new(
        config: ProxyConfig,
        registry: Arc<ServiceRegistry>,
        balancer: Arc<LoadBalancer>,
    ) -> Self {
        Self {
            config,
            // Timeouts are per-request from the service definition
            client: reqwest::Client::new(),
            registry,
            balancer,
            breakers: DashMap::new(),
        }
    }

    fn breaker(&self, endpoint_id: &str) -> Arc<EndpointBreaker> {
        self.breakers
            .entry(endpoint_id.to_string())
            .or_insert_with(|| Arc::new(EndpointBreaker::new(endpoint_id, &self.config.breaker)))
            .clone()
    }

    /// Forward a request to its routed endpoint
    ///
    /// Fails fast with `CircuitOpen` when the endpoint's breaker rejects
    /// the call. Transient transport errors retry up to the service's
    /// configured count with a fixed delay; each attempt's failure is
    /// recorded on the breaker.
    pub async fn forward(&self, request: ProxiedRequest, route: &RouteMatch) -> Result<ProxyOutcome> {
        let breaker = self.breaker(&route.endpoint.id);
        if !breaker.try_acquire() {
            debug!(endpoint = %route.endpoint.id, "Circuit open, failing fast");
            return Err(GatewayError::CircuitOpen(route.endpoint.id.clone()));
        }

        self.balancer.begin_request(&route.endpoint.id);
        let _guard = ConnectionGuard {
            balancer: Arc::clone(&self.balancer),
            endpoint_id: route.endpoint.id.clone(),
        };

        let url = build_upstream_url(&route.endpoint.url, &route.upstream_path, &request.query);
        let timeout = Duration::from_millis(route.service.timeout_ms);
        let retries = route.service.retries.unwrap_or(0);
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

        let mut outbound_headers = request.headers.clone();
        headers::strip_hop_by_hop(&mut outbound_headers);
        headers::apply_forwarding(
            &mut outbound_headers,
            request.client_ip.as_deref(),
            &request.host,
            &request.scheme,
        );

        let mut last_error = GatewayError::Upstream(route.service.name.clone());
        for attempt in 0..=retries {
            let mut attempt_headers = outbound_headers.clone();
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
                if let Ok(value) = HeaderValue::from_str(&attempt.to_string()) {
                    attempt_headers.insert("x-gateway-retry", value);
                }
            }

            let start = Instant::now();
            let result = self
                .client
                .request(request.method.clone(), &url)
                .headers(attempt_headers)
                .body(request.body.clone())
                .timeout(timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    breaker.record_success();
                    self.registry
                        .record_response_time(&route.service.name, &route.endpoint.id, elapsed_ms);

                    let status = response.status().as_u16();
                    let mut response_headers = response.headers().clone();
                    headers::strip_hop_by_hop(&mut response_headers);
                    let body = response.bytes().await.map_err(|e| {
                        warn!(endpoint = %route.endpoint.id, error = %e, "Failed reading upstream body");
                        GatewayError::Upstream(route.service.name.clone())
                    })?;

                    debug!(
                        endpoint = %route.endpoint.id,
                        status,
                        elapsed_ms,
                        attempts = attempt + 1,
                        "Proxied request"
                    );
                    return Ok(ProxyOutcome {
                        status,
                        headers: response_headers,
                        body,
                        elapsed_ms,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    breaker.record_failure();
                    let mapped = map_transport_error(&error, &route.service.name);
                    let transient = matches!(
                        mapped,
                        GatewayError::UpstreamConnect(_) | GatewayError::UpstreamTimeout(_)
                    );
                    warn!(
                        endpoint = %route.endpoint.id,
                        attempt = attempt + 1,
                        error = %error,
                        transient,
                        "Upstream call failed"
                    );
                    last_error = mapped;
                    if !transient {
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Breaker snapshots for the admin surface
    pub fn breaker_snapshots(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect()
    }

    /// Force one endpoint's breaker back to CLOSED
    pub fn reset_breaker(&self, endpoint_id: &str) -> Result<()> {
        match self.breakers.get(endpoint_id) {
            Some(breaker) => {
                breaker.reset();
                Ok(())
            }
            None => Err(GatewayError::NotFound(format!(
                "circuit breaker for endpoint {}",
                endpoint_id
            ))),
        }
    }
}

/// Map a reqwest transport error onto the upstream taxonomy
fn map_transport_error(error: &reqwest::Error, service: &str) -> GatewayError {
    if error.is_timeout() {
        GatewayError::UpstreamTimeout(service.to_string())
    } else if error.is_connect() {
        GatewayError::UpstreamConnect(service.to_string())
    } else {
        GatewayError::Upstream(service.to_string())
    }
}

fn build_upstream_url(base: &str, path: &str, query: &str) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
