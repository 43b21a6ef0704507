//! Service registry
//!
//! Owns the set of registered backend services and their endpoints. The
//! health-check loop in [`health`] is the only caller of
//! [`ServiceRegistry::update_endpoint_health`] besides tests; health-change
//! events go out on a broadcast channel so consumers never touch registry
//! internals.

pub mod health;
pub mod types;

pub use types::{RegistryEvent, RegistryStats, ServiceDefinition, ServiceEndpoint};

use crate::config::RegistryConfig;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the health-event channel; slow consumers miss old events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registry of backend services, keyed by unique service name
pub struct ServiceRegistry {
    config: RegistryConfig,
    services: DashMap<String, ServiceDefinition>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            services: DashMap::new(),
            events,
        }
    }

    /// Subscribe to registry events (health flips, register/unregister)
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register or update a service definition
    ///
    /// Missing timeout/retries/health settings get the registry defaults.
    /// Returns whether a new service was created.
    pub fn register(&self, mut service: ServiceDefinition) -> Result<bool> {
        if service.name.is_empty() {
            return Err(GatewayError::BadRequest(
                "service name must not be empty".into(),
            ));
        }

        if service.health_check_path.is_empty() {
            service.health_check_path = self.config.default_health_path.clone();
        }
        if service.timeout_ms == 0 {
            service.timeout_ms = self.config.default_timeout_ms;
        }
        if service.retries.is_none() {
            service.retries = Some(self.config.default_retries);
        }
        if service.health_check_interval_secs == 0 {
            service.health_check_interval_secs = self.config.default_health_interval_secs;
        }

        let created = !self.services.contains_key(&service.name);
        if created {
            info!(service = %service.name, endpoints = service.endpoints.len(), "Registering service");
        } else {
            info!(service = %service.name, endpoints = service.endpoints.len(), "Updating service");
        }

        let name = service.name.clone();
        self.services.insert(name.clone(), service);
        let _ = self
            .events
            .send(RegistryEvent::ServiceRegistered { name, created });
        Ok(created)
    }

    /// Remove a service
    pub fn unregister(&self, name: &str) -> Result<ServiceDefinition> {
        match self.services.remove(name) {
            Some((_, service)) => {
                info!(service = %name, "Unregistered service");
                let _ = self.events.send(RegistryEvent::ServiceUnregistered {
                    name: name.to_string(),
                });
                Ok(service)
            }
            None => Err(GatewayError::NotFound(format!("service {}", name))),
        }
    }

    /// Look up a service by name
    pub fn get_service(&self, name: &str) -> Option<ServiceDefinition> {
        self.services.get(name).map(|s| s.clone())
    }

    /// All registered services
    pub fn all_services(&self) -> Vec<ServiceDefinition> {
        self.services.iter().map(|s| s.clone()).collect()
    }

    /// Add an endpoint to an existing service
    pub fn add_endpoint(&self, service: &str, endpoint: ServiceEndpoint) -> Result<()> {
        let mut entry = self
            .services
            .get_mut(service)
            .ok_or_else(|| GatewayError::NotFound(format!("service {}", service)))?;

        if entry.endpoints.iter().any(|e| e.id == endpoint.id) {
            return Err(GatewayError::Conflict(format!(
                "endpoint {} already exists on {}",
                endpoint.id, service
            )));
        }

        debug!(service = %service, endpoint = %endpoint.id, url = %endpoint.url, "Adding endpoint");
        entry.endpoints.push(endpoint);
        Ok(())
    }

    /// Remove an endpoint from a service
    pub fn remove_endpoint(&self, service: &str, endpoint_id: &str) -> Result<()> {
        let mut entry = self
            .services
            .get_mut(service)
            .ok_or_else(|| GatewayError::NotFound(format!("service {}", service)))?;

        let before = entry.endpoints.len();
        entry.endpoints.retain(|e| e.id != endpoint_id);
        if entry.endpoints.len() == before {
            return Err(GatewayError::NotFound(format!(
                "endpoint {} on {}",
                endpoint_id, service
            )));
        }

        debug!(service = %service, endpoint = %endpoint_id, "Removed endpoint");
        Ok(())
    }

    /// Record a health observation for an endpoint
    ///
    /// This is the only writer of the `healthy` flag. An event is published
    /// only when the flag actually flips, so probe repetition does not
    /// produce event storms.
    pub fn update_endpoint_health(
        &self,
        service: &str,
        endpoint_id: &str,
        healthy: bool,
        response_time_ms: Option<u64>,
        error: Option<String>,
    ) -> Result<()> {
        let mut entry = self
            .services
            .get_mut(service)
            .ok_or_else(|| GatewayError::NotFound(format!("service {}", service)))?;

        let endpoint = entry
            .endpoints
            .iter_mut()
            .find(|e| e.id == endpoint_id)
            .ok_or_else(|| {
                GatewayError::NotFound(format!("endpoint {} on {}", endpoint_id, service))
            })?;

        let flipped = endpoint.healthy != healthy;
        endpoint.healthy = healthy;
        endpoint.last_health_check = Some(Utc::now());
        if response_time_ms.is_some() {
            endpoint.response_time_ms = response_time_ms;
        }
        drop(entry);

        if flipped {
            if healthy {
                info!(service = %service, endpoint = %endpoint_id, "Endpoint recovered");
            } else {
                warn!(service = %service, endpoint = %endpoint_id, error = ?error, "Endpoint unhealthy");
            }
            let _ = self.events.send(RegistryEvent::EndpointHealthChanged {
                service: service.to_string(),
                endpoint_id: endpoint_id.to_string(),
                healthy,
                error,
            });
        }

        Ok(())
    }

    /// Record a response time observed by the proxy
    ///
    /// Does not touch the health flag; health stays owned by
    /// `update_endpoint_health`.
    pub fn record_response_time(&self, service: &str, endpoint_id: &str, elapsed_ms: u64) {
        if let Some(mut entry) = self.services.get_mut(service) {
            if let Some(endpoint) = entry.endpoints.iter_mut().find(|e| e.id == endpoint_id) {
                endpoint.response_time_ms = Some(elapsed_ms);
            }
        }
    }

    /// Healthy endpoints of a service
    ///
    /// Filters on the health flag only; circuit breaker state is the
    /// proxy's concern and is scoped per endpoint, not per service.
    pub fn healthy_endpoints(&self, name: &str) -> Vec<ServiceEndpoint> {
        self.services
            .get(name)
            .map(|s| s.healthy_endpoints())
            .unwrap_or_default()
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Aggregate counts for the admin surface
    pub fn stats(&self) -> RegistryStats {
        let mut endpoints = 0;
        let mut healthy = 0;
        for service in self.services.iter() {
            endpoints += service.endpoints.len();
            healthy += service.endpoints.iter().filter(|e| e.healthy).count();
        }
        RegistryStats {
            services: self.services.len(),
            endpoints,
            healthy_endpoints: healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(RegistryConfig::default())
    }

    fn billing() -> ServiceDefinition {
        ServiceDefinition::new(
            "billing",
            vec![
                ServiceEndpoint::new("ep1", "http://svc-1:9000"),
                ServiceEndpoint::new("ep2", "http://svc-2:9000"),
            ],
        )
    }

    #[test]
    fn test_register_applies_defaults() {
        let reg = registry();
        assert!(reg.register(billing()).unwrap());

        let svc = reg.get_service("billing").unwrap();
        assert_eq!(svc.health_check_path, "/health");
        assert_eq!(svc.timeout_ms, 30_000);
        assert_eq!(svc.retries, Some(2));
        assert_eq!(svc.health_check_interval_secs, 30);
    }

    #[test]
    fn test_register_is_upsert() {
        let reg = registry();
        assert!(reg.register(billing()).unwrap());
        // Second register of the same name is an update
        assert!(!reg.register(billing()).unwrap());
        assert_eq!(reg.all_services().len(), 1);
    }

    #[test]
    fn test_unregister_missing_service() {
        let reg = registry();
        assert!(reg.unregister("ghost").is_err());
    }

    #[test]
    fn test_add_and_remove_endpoint() {
        let reg = registry();
        reg.register(billing()).unwrap();

        reg.add_endpoint("billing", ServiceEndpoint::new("ep3", "http://svc-3:9000"))
            .unwrap();
        assert_eq!(reg.get_service("billing").unwrap().endpoints.len(), 3);

        // Duplicate id is a conflict
        assert!(reg
            .add_endpoint("billing", ServiceEndpoint::new("ep3", "http://other:9000"))
            .is_err());

        reg.remove_endpoint("billing", "ep3").unwrap();
        assert!(reg.remove_endpoint("billing", "ep3").is_err());
    }

    #[test]
    fn test_health_event_only_on_flip() {
        let reg = registry();
        reg.register(billing()).unwrap();
        let mut events = reg.subscribe();

        // ep1 starts healthy; marking healthy again is not a flip
        reg.update_endpoint_health("billing", "ep1", true, Some(12), None)
            .unwrap();
        assert!(events.try_recv().is_err());

        reg.update_endpoint_health("billing", "ep1", false, None, Some("refused".into()))
            .unwrap();
        match events.try_recv().unwrap() {
            RegistryEvent::EndpointHealthChanged {
                endpoint_id,
                healthy,
                ..
            } => {
                assert_eq!(endpoint_id, "ep1");
                assert!(!healthy);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Repeated failure does not publish again
        reg.update_endpoint_health("billing", "ep1", false, None, Some("refused".into()))
            .unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_healthy_endpoints_filters_on_flag() {
        let reg = registry();
        reg.register(billing()).unwrap();
        reg.update_endpoint_health("billing", "ep1", false, None, None)
            .unwrap();

        let healthy = reg.healthy_endpoints("billing");
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].id, "ep2");
    }

    #[test]
    fn test_stats_counts() {
        let reg = registry();
        reg.register(billing()).unwrap();
        reg.update_endpoint_health("billing", "ep2", false, None, None)
            .unwrap();

        let stats = reg.stats();
        assert_eq!(stats.services, 1);
        assert_eq!(stats.endpoints, 2);
        assert_eq!(stats.healthy_endpoints, 1);
    }
}
