//! Shared application state
//!
//! All components are built once at startup and shared across workers
//! behind `Arc`s. Config-declared services and rules are seeded here so
//! the gateway routes traffic immediately after bind.

use crate::auth::AuthSystem;
use crate::config::Config;
use crate::core::balancer::LoadBalancer;
use crate::core::proxy::Proxy;
use crate::core::registry::{health, ServiceRegistry};
use crate::core::router::Router;
use crate::core::tenant::TenantResolver;
use crate::storage::MemoryStore;
use crate::utils::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Component graph shared by every request handler
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ServiceRegistry>,
    pub balancer: Arc<LoadBalancer>,
    pub router: Arc<Router>,
    pub proxy: Arc<Proxy>,
    pub tenants: Arc<TenantResolver>,
    pub auth: Arc<AuthSystem>,
    /// In-process store backing tenants, users, keys and refresh tokens
    pub store: Arc<MemoryStore>,
}

impl AppState {
    /// Build the component graph and seed config-declared state
    pub fn from_config(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());

        let registry = Arc::new(ServiceRegistry::new(config.registry.clone()));
        let balancer = Arc::new(LoadBalancer::new(config.balancer.clone()));
        let router = Arc::new(Router::new(
            config.router.clone(),
            Arc::clone(&registry),
            Arc::clone(&balancer),
        ));
        let proxy = Arc::new(Proxy::new(
            config.proxy.clone(),
            Arc::clone(&registry),
            Arc::clone(&balancer),
        ));
        let tenants = Arc::new(TenantResolver::new(
            config.tenant.clone(),
            store.clone() as Arc<dyn crate::storage::TenantStore>,
        ));
        let auth = Arc::new(AuthSystem::new(
            config.auth.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ));

        let state = Self {
            config,
            registry,
            balancer,
            router,
            proxy,
            tenants,
            auth,
            store,
        };
        state.seed_from_config()?;
        Ok(state)
    }

    /// Register config-declared services and rules
    fn seed_from_config(&self) -> Result<()> {
        for service in &self.config.services {
            self.registry.register(service.clone())?;
            if self.router.auto_default_rules() {
                if let Err(e) = self.router.create_default_rule(&service.name) {
                    warn!(service = %service.name, error = %e, "Skipped default rule");
                }
            }
        }
        for rule in &self.config.rules {
            self.router.add_rule(rule.clone())?;
        }
        if !self.config.services.is_empty() || !self.config.rules.is_empty() {
            info!(
                services = self.config.services.len(),
                rules = self.config.rules.len(),
                "Seeded registry and routing rules from configuration"
            );
        }
        Ok(())
    }

    /// Spawn the health-check loop, the sticky-session sweeper and the
    /// auth maintenance sweeper
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            health::spawn_health_checker(Arc::clone(&self.registry)),
            self.balancer.spawn_sweeper(),
            self.auth.spawn_maintenance(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{ServiceDefinition, ServiceEndpoint};
    use crate::core::router::RoutingRule;

    fn config() -> Config {
        let mut config = Config::default();
        config.auth.jwt_secret = "0123456789abcdef0123456789abcdef".into();
        config
    }

    #[test]
    fn test_seeds_services_and_default_rules() {
        let mut cfg = config();
        cfg.services.push(ServiceDefinition::new(
            "billing",
            vec![ServiceEndpoint::new("ep1", "http://svc:9000")],
        ));
        cfg.rules.push(RoutingRule {
            id: "custom".into(),
            pattern: "/billing-legacy/*".into(),
            service_name: "billing".into(),
            priority: 50,
            enabled: true,
            ..RoutingRule::default()
        });

        let state = AppState::from_config(cfg).unwrap();
        assert!(state.registry.get_service("billing").is_some());
        // One auto-generated default rule plus the explicit one
        assert_eq!(state.router.list_rules().len(), 2);
        assert!(state.router.get_rule("default-billing").is_some());
        assert!(state.router.get_rule("custom").is_some());
    }

    #[tokio::test]
    async fn test_background_tasks_include_auth_maintenance() {
        let state = AppState::from_config(config()).unwrap();
        let handles = state.spawn_background_tasks();
        // Health checker, sticky sweeper, auth sweeper
        assert_eq!(handles.len(), 3);
        for handle in handles {
            handle.abort();
        }
    }

    #[test]
    fn test_auto_default_rules_can_be_disabled() {
        let mut cfg = config();
        cfg.router.auto_default_rules = false;
        cfg.services.push(ServiceDefinition::new(
            "billing",
            vec![ServiceEndpoint::new("ep1", "http://svc:9000")],
        ));

        let state = AppState::from_config(cfg).unwrap();
        assert!(state.router.list_rules().is_empty());
    }
}
