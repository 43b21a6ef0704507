//! Periodic endpoint health checks
//!
//! An independent tokio task probes each endpoint's health path and feeds
//! the outcome back through [`ServiceRegistry::update_endpoint_health`].
//! Probe failures are swallowed into endpoint state, never surfaced to
//! request handling.

use super::ServiceRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Spawn the health-check loop for a registry
///
/// The loop ticks at the registry's configured interval; each service is
/// probed only when its own `health_check_interval_secs` has elapsed since
/// its last probe.
pub fn spawn_health_checker(registry: Arc<ServiceRegistry>) -> tokio::task::JoinHandle<()> {
    let tick = Duration::from_secs(registry.config().health_check_interval_secs);
    let probe_timeout = Duration::from_secs(registry.config().health_check_timeout_secs);

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let last_probe: DashMap<String, Instant> = DashMap::new();
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            for service in registry.all_services() {
                let due = last_probe
                    .get(&service.name)
                    .map(|t| t.elapsed() >= Duration::from_secs(service.health_check_interval_secs))
                    .unwrap_or(true);
                if !due {
                    continue;
                }
                last_probe.insert(service.name.clone(), Instant::now());

                debug!(service = %service.name, "Running health checks");
                let probes = service.endpoints.iter().map(|endpoint| {
                    let client = client.clone();
                    let registry = registry.clone();
                    let service_name = service.name.clone();
                    let endpoint_id = endpoint.id.clone();
                    let url = probe_url(&endpoint.url, &service.health_check_path);
                    async move {
                        let outcome = probe_endpoint(&client, &url, probe_timeout).await;
                        let result = match outcome {
                            Ok(elapsed_ms) => {
                                trace!(service = %service_name, endpoint = %endpoint_id, elapsed_ms, "Probe ok");
                                registry.update_endpoint_health(
                                    &service_name,
                                    &endpoint_id,
                                    true,
                                    Some(elapsed_ms),
                                    None,
                                )
                            }
                            Err(error) => registry.update_endpoint_health(
                                &service_name,
                                &endpoint_id,
                                false,
                                None,
                                Some(error),
                            ),
                        };
                        // The endpoint may have been removed mid-probe
                        if let Err(e) = result {
                            trace!("Health update skipped: {}", e);
                        }
                    }
                });
                futures::future::join_all(probes).await;
            }
        }
    })
}

/// Probe one endpoint; 2xx within the timeout counts as healthy
pub async fn probe_endpoint(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<u64, String> {
    let start = Instant::now();
    let response = tokio::time::timeout(timeout, client.get(url).send())
        .await
        .map_err(|_| format!("probe timed out after {:?}", timeout))?
        .map_err(|e| format!("probe failed: {}", e))?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    if response.status().is_success() {
        Ok(elapsed_ms)
    } else {
        Err(format!("probe returned status {}", response.status()))
    }
}

fn probe_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
