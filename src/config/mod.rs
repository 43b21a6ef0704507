//! Configuration management for the gateway
//!
//! Loading, env overrides, and startup validation. Malformed configuration
//! aborts startup instead of degrading silently.

pub mod models;

pub use models::*;

use crate::core::registry::types::ServiceDefinition;
use crate::core::router::pattern::PathPattern;
use crate::core::router::RoutingRule;
use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Service registry defaults and health-check loop
    pub registry: RegistryConfig,
    /// Router settings
    pub router: RouterConfig,
    /// Load balancer settings
    pub balancer: BalancerConfig,
    /// Proxy and circuit breaker settings
    pub proxy: ProxyConfig,
    /// Tenant resolution settings
    pub tenant: TenantConfig,
    /// Authentication settings
    pub auth: AuthConfig,
    /// Services registered at startup
    pub services: Vec<ServiceDefinition>,
    /// Routing rules installed at startup
    pub rules: Vec<RoutingRule>,
}

impl Config {
    /// Load configuration from a YAML file, then apply env overrides
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Build a configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment");

        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file values
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SWITCHYARD_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SWITCHYARD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(secret) = std::env::var("SWITCHYARD_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(domain) = std::env::var("SWITCHYARD_BASE_DOMAIN") {
            self.tenant.base_domain = Some(domain);
        }
    }

    /// Validate the entire configuration
    ///
    /// Called at startup; any error here is fatal.
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        if self.server.port == 0 {
            return Err(GatewayError::config("server.port must be non-zero"));
        }

        if self.auth.enabled && self.auth.jwt_secret.len() < 32 {
            return Err(GatewayError::config(
                "auth.jwt_secret must be at least 32 characters when auth is enabled",
            ));
        }

        if self.registry.health_check_interval_secs == 0 {
            return Err(GatewayError::config(
                "registry.health_check_interval_secs must be non-zero",
            ));
        }

        if self.tenant.cache_ttl_secs == 0 {
            return Err(GatewayError::config(
                "tenant.cache_ttl_secs must be non-zero",
            ));
        }

        if self.proxy.breaker.failure_threshold == 0 {
            return Err(GatewayError::config(
                "proxy.breaker.failure_threshold must be non-zero",
            ));
        }

        for rule in &self.rules {
            PathPattern::compile(&rule.pattern).map_err(|e| {
                GatewayError::Config(format!("rule {} has invalid pattern: {}", rule.id, e))
            })?;
        }

        for service in &self.services {
            if service.name.is_empty() {
                return Err(GatewayError::config("service with empty name in config"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_secret() -> String {
        "0123456789abcdef0123456789abcdef".to_string()
    }

    #[test]
    fn test_default_config_without_auth_is_valid() {
        let mut config = Config::default();
        config.auth.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = Config::default();
        config.auth.jwt_secret = "short".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_bad_rule_pattern_rejected() {
        let mut config = Config::default();
        config.auth.jwt_secret = valid_secret();
        config.rules.push(RoutingRule {
            id: "r1".into(),
            // Patterns must be rooted
            pattern: "api/billing/*".into(),
            service_name: "svc".into(),
            ..RoutingRule::default()
        });
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_from_file_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(
            &path,
            r#"
server:
  port: 9999
auth:
  jwt_secret: "0123456789abcdef0123456789abcdef"
balancer:
  strategy: least_connections
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).await.unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.balancer.strategy, BalanceStrategy::LeastConnections);
    }

    #[tokio::test]
    async fn test_from_file_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, "server: [not a map").unwrap();
        assert!(Config::from_file(&path).await.is_err());
    }
}
