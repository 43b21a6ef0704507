//! Service registry data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single backend instance of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Stable endpoint id, unique within the service
    pub id: String,
    /// Base URL, e.g. `http://svc-a:9000`
    pub url: String,
    /// Relative weight for weighted round-robin (0 treated as 1)
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Current health as observed by the health-check loop
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// When the endpoint was last probed
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    /// Last observed response time in ms (probe or proxied call)
    #[serde(default)]
    pub response_time_ms: Option<u64>,
}

impl ServiceEndpoint {
    /// New healthy endpoint with default weight
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            weight: 1,
            healthy: true,
            last_health_check: None,
            response_time_ms: None,
        }
    }

    /// Same endpoint with an explicit weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// A registered backend service and its endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique service name
    pub name: String,
    /// Service version, informational
    #[serde(default)]
    pub version: String,
    /// Known endpoints
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
    /// Path probed by the health-check loop; registry default if empty
    #[serde(default)]
    pub health_check_path: String,
    /// Upstream call timeout in ms; registry default if zero
    #[serde(default)]
    pub timeout_ms: u64,
    /// Transient-failure retry count; registry default if unset
    #[serde(default)]
    pub retries: Option<u32>,
    /// Seconds between health probes; registry default if zero
    #[serde(default)]
    pub health_check_interval_secs: u64,
}

impl ServiceDefinition {
    /// Minimal definition; defaults are filled in on register
    pub fn new(name: impl Into<String>, endpoints: Vec<ServiceEndpoint>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            endpoints,
            health_check_path: String::new(),
            timeout_ms: 0,
            retries: None,
            health_check_interval_secs: 0,
        }
    }

    /// Endpoints currently marked healthy
    pub fn healthy_endpoints(&self) -> Vec<ServiceEndpoint> {
        self.endpoints
            .iter()
            .filter(|e| e.healthy)
            .cloned()
            .collect()
    }
}

/// Event published by the registry when its state changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A service was registered or updated
    ServiceRegistered {
        /// Service name
        name: String,
        /// False when an existing definition was replaced
        created: bool,
    },
    /// A service was removed
    ServiceUnregistered {
        /// Service name
        name: String,
    },
    /// An endpoint's health flag actually flipped
    EndpointHealthChanged {
        /// Owning service
        service: String,
        /// Endpoint id
        endpoint_id: String,
        /// New health state
        healthy: bool,
        /// Probe error when unhealthy
        error: Option<String>,
    },
}

/// Aggregate view of the registry for the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered service count
    pub services: usize,
    /// Total endpoint count
    pub endpoints: usize,
    /// Endpoints currently healthy
    pub healthy_endpoints: usize,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
