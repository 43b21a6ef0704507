//! Configuration models for every gateway section
//!
//! All sections have serde defaults so a minimal YAML file (or none at all)
//! yields a runnable configuration.

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Enable CORS handling
    pub cors_enabled: bool,
    /// Allowed CORS origins; empty means any
    pub cors_allowed_origins: Vec<String>,
    /// Expose raw internal error messages in envelopes (non-production only)
    pub expose_internal_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: false,
            cors_allowed_origins: Vec::new(),
            expose_internal_errors: false,
        }
    }
}

/// Service registry defaults and health-check loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Tick interval of the health-check loop in seconds
    pub health_check_interval_secs: u64,
    /// Per-probe timeout in seconds
    pub health_check_timeout_secs: u64,
    /// Default upstream timeout applied when a service omits one, in ms
    pub default_timeout_ms: u64,
    /// Default retry count applied when a service omits one
    pub default_retries: u32,
    /// Default health-check path applied when a service omits one
    pub default_health_path: String,
    /// Default per-service health-check interval in seconds
    pub default_health_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 10,
            health_check_timeout_secs: 5,
            default_timeout_ms: 30_000,
            default_retries: 2,
            default_health_path: "/health".to_string(),
            default_health_interval_secs: 30,
        }
    }
}

/// Router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Auto-create a catch-all `/api/<name>/*` rule when a service registers
    pub auto_default_rules: bool,
    /// Priority assigned to auto-created default rules
    pub default_rule_priority: i32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            auto_default_rules: true,
            default_rule_priority: 0,
        }
    }
}

/// Endpoint selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Per-service monotonic counter modulo endpoint count
    RoundRobin,
    /// Round-robin over a virtual pool expanded by endpoint weight
    WeightedRoundRobin,
    /// Endpoint with the fewest tracked in-flight requests
    LeastConnections,
    /// Deterministic hash of the client IP
    IpHash,
}

/// Load balancer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection strategy
    pub strategy: BalanceStrategy,
    /// Bind a session id to the same endpoint for the session TTL
    pub sticky_sessions: bool,
    /// Sticky session TTL in seconds
    pub session_ttl_secs: u64,
    /// Interval of the sticky-session sweeper in seconds
    pub sweep_interval_secs: u64,
    /// Header carrying the client session id
    pub session_header: String,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::RoundRobin,
            sticky_sessions: false,
            session_ttl_secs: 1800,
            sweep_interval_secs: 60,
            session_header: "x-session-id".to_string(),
        }
    }
}

/// Per-endpoint circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before allowing a probe
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
        }
    }
}

/// Proxy behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Fixed delay between retry attempts in ms
    pub retry_delay_ms: u64,
    /// Circuit breaker settings applied per endpoint
    pub breaker: BreakerConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 200,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Tenant resolution strategy kinds, in config form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStrategyKind {
    /// `X-Tenant-Id` / `X-Project-Code` headers (names configurable)
    Header,
    /// Subdomain under the configured base domain
    Subdomain,
    /// Leading path segments under the configured prefix
    Path,
    /// Unverified `tenantId`/`projectCodes` claims from a bearer JWT
    JwtClaim,
}

/// One enabled resolution strategy and its priority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantStrategyConfig {
    /// Which strategy
    pub strategy: TenantStrategyKind,
    /// Higher priority strategies are tried first
    pub priority: i32,
    /// Disabled strategies are skipped
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Tenant resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Header carrying the tenant id
    pub tenant_header: String,
    /// Header carrying the project code
    pub project_header: String,
    /// Base domain stripped to obtain the tenant subdomain
    pub base_domain: Option<String>,
    /// Path prefix for path-based resolution, e.g. `/t`
    pub path_prefix: Option<String>,
    /// Reject requests with no resolvable tenant
    pub strict: bool,
    /// Tenant id assumed when no strategy yields one
    pub fallback_tenant: Option<String>,
    /// Tenant context cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Strategies in use; tried in descending priority order
    pub strategies: Vec<TenantStrategyConfig>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_header: "x-tenant-id".to_string(),
            project_header: "x-project-code".to_string(),
            base_domain: None,
            path_prefix: None,
            strict: false,
            fallback_tenant: None,
            cache_ttl_secs: 60,
            strategies: vec![
                TenantStrategyConfig {
                    strategy: TenantStrategyKind::Header,
                    priority: 100,
                    enabled: true,
                },
                TenantStrategyConfig {
                    strategy: TenantStrategyKind::Subdomain,
                    priority: 80,
                    enabled: true,
                },
                TenantStrategyConfig {
                    strategy: TenantStrategyKind::Path,
                    priority: 60,
                    enabled: true,
                },
                TenantStrategyConfig {
                    strategy: TenantStrategyKind::JwtClaim,
                    priority: 40,
                    enabled: true,
                },
            ],
        }
    }
}

/// Failed-authentication lockout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRateLimitConfig {
    /// Failed attempts inside the window before lockout
    pub max_failures: u32,
    /// Window for counting failures, in seconds
    pub window_secs: u64,
    /// Base lockout duration, doubled per consecutive lockout
    pub lockout_secs: u64,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_secs: 300,
            lockout_secs: 60,
        }
    }
}

/// Authentication and authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Run the auth subsystem at all
    pub enabled: bool,
    /// Reject requests that present no credentials
    pub required: bool,
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub jwt_expiration_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Expected token issuer
    pub issuer: String,
    /// Expected token audience
    pub audience: String,
    /// Header carrying an API key
    pub api_key_header: String,
    /// Query parameter carrying an API key
    pub api_key_query: String,
    /// Cookie carrying a session token
    pub session_cookie: String,
    /// Header carrying an SSO token
    pub sso_header: String,
    /// Paths exempt from authentication
    pub public_paths: Vec<String>,
    /// Failed-auth lockout settings
    pub rate_limit: AuthRateLimitConfig,
    /// Interval of the blacklist/lockout sweeper in seconds
    pub sweep_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            jwt_secret: String::new(),
            jwt_expiration_secs: 3600,
            refresh_ttl_secs: 7 * 24 * 3600,
            issuer: "switchyard".to_string(),
            audience: "api".to_string(),
            api_key_header: "x-api-key".to_string(),
            api_key_query: "api_key".to_string(),
            session_cookie: "gw_session".to_string(),
            sso_header: "x-sso-token".to_string(),
            public_paths: vec!["/health".to_string()],
            rate_limit: AuthRateLimitConfig::default(),
            sweep_interval_secs: 60,
        }
    }
}

fn default_true() -> bool {
    true
}
