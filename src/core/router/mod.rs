//! Request router
//!
//! Holds the routing rule set and resolves each inbound request to a
//! (rule, service, endpoint) triple. A rule matching without a usable
//! target is skipped, not fatal; scanning continues to lower-priority
//! rules.

pub mod pattern;

pub use pattern::{PathCaptures, PathPattern};

use crate::config::RouterConfig;
use crate::core::balancer::LoadBalancer;
use crate::core::registry::{ServiceDefinition, ServiceEndpoint, ServiceRegistry};
use crate::utils::error::{GatewayError, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// A routing rule as configured or managed through the admin surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRule {
    /// Unique rule id; generated when empty on insert
    pub id: String,
    /// Path template, e.g. `/api/billing/*` or `/api/users/:id`
    pub pattern: String,
    /// Target service name in the registry
    pub service_name: String,
    /// HTTP method allow-list; empty allows all
    pub methods: Vec<String>,
    /// Match only this tenant when set
    pub tenant_id: Option<String>,
    /// Match only this project when set
    pub project_code: Option<String>,
    /// Extra header equality predicates (lowercase names)
    pub headers: HashMap<String, String>,
    /// Extra query-parameter equality predicates
    pub query: HashMap<String, String>,
    /// Higher priority wins
    pub priority: i32,
    /// Upstream path template; original path forwarded when unset
    pub rewrite_path: Option<String>,
    /// Disabled rules are never matched
    pub enabled: bool,
}

/// A rule with its pattern compiled once at insert time
#[derive(Clone)]
struct CompiledRule {
    rule: RoutingRule,
    pattern: PathPattern,
}

/// The request fields the router matches against
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    /// Header map with lowercase names
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub tenant_id: Option<String>,
    pub project_code: Option<String>,
    pub client_ip: Option<String>,
    pub session_id: Option<String>,
}

/// The resolved target for one request; never persisted
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub rule_id: String,
    pub service: ServiceDefinition,
    pub endpoint: ServiceEndpoint,
    /// Named `:param` captures from the matched pattern
    pub params: HashMap<String, String>,
    /// Path to request from the upstream (after any rewrite)
    pub upstream_path: String,
}

/// Outcome of a routing scan
///
/// Distinguishes "nothing matched" from "a rule matched but its target
/// was unusable": the first is a client-side 404, the second a 503.
#[derive(Debug, Clone)]
pub enum RouteResolution {
    /// A rule matched and a healthy endpoint was selected
    Matched(RouteMatch),
    /// At least one rule matched the request but every matching rule's
    /// service was absent or had no healthy endpoint
    NoHealthyTarget {
        /// Service of the highest-priority matching rule
        service: String,
    },
    /// No enabled rule matched the request
    NoRoute,
}

impl RouteResolution {
    /// The resolved match, if one was found
    pub fn into_match(self) -> Option<RouteMatch> {
        match self {
            Self::Matched(route) => Some(route),
            _ => None,
        }
    }
}

/// Rule engine over the registry and balancer
pub struct Router {
    config: RouterConfig,
    registry: Arc<ServiceRegistry>,
    balancer: Arc<LoadBalancer>,
    rules: RwLock<Vec<CompiledRule>>,
    /// Rule id → match count, for the admin surface
    match_counts: DashMap<String, AtomicU64>,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        registry: Arc<ServiceRegistry>,
        balancer: Arc<LoadBalancer>,
    ) -> Self {
        Self {
            config,
            registry,
            balancer,
            rules: RwLock::new(Vec::new()),
            match_counts: DashMap::new(),
        }
    }

    /// Insert a rule, compiling its pattern; empty id gets a generated one
    pub fn add_rule(&self, mut rule: RoutingRule) -> Result<RoutingRule> {
        if rule.service_name.is_empty() {
            return Err(GatewayError::BadRequest(
                "rule must name a target service".into(),
            ));
        }
        let pattern = PathPattern::compile(&rule.pattern)?;
        if rule.id.is_empty() {
            rule.id = uuid::Uuid::new_v4().to_string();
        }

        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.rule.id == rule.id) {
            return Err(GatewayError::Conflict(format!("rule {} exists", rule.id)));
        }
        info!(rule = %rule.id, pattern = %rule.pattern, service = %rule.service_name, priority = rule.priority, "Added routing rule");
        rules.push(CompiledRule {
            rule: rule.clone(),
            pattern,
        });
        Ok(rule)
    }

    /// Remove a rule by id
    pub fn remove_rule(&self, id: &str) -> Result<RoutingRule> {
        let mut rules = self.rules.write();
        let index = rules
            .iter()
            .position(|r| r.rule.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("rule {}", id)))?;
        let removed = rules.remove(index);
        self.match_counts.remove(id);
        info!(rule = %id, "Removed routing rule");
        Ok(removed.rule)
    }

    /// Replace a rule in place, recompiling its pattern
    pub fn update_rule(&self, id: &str, mut rule: RoutingRule) -> Result<RoutingRule> {
        let pattern = PathPattern::compile(&rule.pattern)?;
        rule.id = id.to_string();

        let mut rules = self.rules.write();
        let existing = rules
            .iter_mut()
            .find(|r| r.rule.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("rule {}", id)))?;
        existing.rule = rule.clone();
        existing.pattern = pattern;
        info!(rule = %id, "Updated routing rule");
        Ok(rule)
    }

    /// Enable or disable a rule
    pub fn toggle_rule(&self, id: &str, enabled: bool) -> Result<()> {
        let mut rules = self.rules.write();
        let existing = rules
            .iter_mut()
            .find(|r| r.rule.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("rule {}", id)))?;
        existing.rule.enabled = enabled;
        info!(rule = %id, enabled, "Toggled routing rule");
        Ok(())
    }

    /// Look up a rule by id
    pub fn get_rule(&self, id: &str) -> Option<RoutingRule> {
        self.rules
            .read()
            .iter()
            .find(|r| r.rule.id == id)
            .map(|r| r.rule.clone())
    }

    /// All rules, sorted descending by priority
    pub fn list_rules(&self) -> Vec<RoutingRule> {
        let mut rules: Vec<RoutingRule> =
            self.rules.read().iter().map(|r| r.rule.clone()).collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    /// Auto-generated catch-all rule for a freshly registered service
    pub fn create_default_rule(&self, service_name: &str) -> Result<RoutingRule> {
        self.add_rule(RoutingRule {
            id: format!("default-{}", service_name),
            pattern: format!("/api/{}/*", service_name),
            service_name: service_name.to_string(),
            priority: self.config.default_rule_priority,
            enabled: true,
            ..RoutingRule::default()
        })
    }

    /// Whether default rules should be created on service registration
    pub fn auto_default_rules(&self) -> bool {
        self.config.auto_default_rules
    }

    /// Resolve a request to a target
    ///
    /// Enabled rules are scanned descending by priority. A rule whose
    /// predicates hold but whose service is absent or has no healthy
    /// endpoint is skipped and scanning continues; when the scan exhausts
    /// with only such rules, the outcome is `NoHealthyTarget` rather than
    /// `NoRoute`. Neither is an error here: the caller decides the
    /// response.
    pub fn find_route(&self, request: &RouteRequest) -> RouteResolution {
        let mut candidates: Vec<CompiledRule> = self
            .rules
            .read()
            .iter()
            .filter(|r| r.rule.enabled)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));

        let mut blocked_service: Option<String> = None;
        for candidate in &candidates {
            let Some(captures) = self.rule_matches(candidate, request) else {
                continue;
            };

            let Some(service) = self.registry.get_service(&candidate.rule.service_name) else {
                trace!(rule = %candidate.rule.id, service = %candidate.rule.service_name, "Rule target absent, continuing scan");
                blocked_service.get_or_insert_with(|| candidate.rule.service_name.clone());
                continue;
            };
            let healthy = service.healthy_endpoints();
            let Some(endpoint) = self.balancer.select(
                &service.name,
                &healthy,
                request.client_ip.as_deref(),
                request.session_id.as_deref(),
            ) else {
                trace!(rule = %candidate.rule.id, service = %service.name, "No healthy endpoint, continuing scan");
                blocked_service.get_or_insert_with(|| service.name.clone());
                continue;
            };

            let upstream_path = match &candidate.rule.rewrite_path {
                Some(template) => candidate.pattern.rewrite(template, &captures),
                None => request.path.clone(),
            };

            self.match_counts
                .entry(candidate.rule.id.clone())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
            debug!(rule = %candidate.rule.id, service = %service.name, endpoint = %endpoint.id, path = %upstream_path, "Route matched");

            return RouteResolution::Matched(RouteMatch {
                rule_id: candidate.rule.id.clone(),
                service,
                endpoint,
                params: captures.params,
                upstream_path,
            });
        }
        match blocked_service {
            Some(service) => RouteResolution::NoHealthyTarget { service },
            None => RouteResolution::NoRoute,
        }
    }

    fn rule_matches(&self, candidate: &CompiledRule, request: &RouteRequest) -> Option<PathCaptures> {
        let rule = &candidate.rule;

        if !rule.methods.is_empty()
            && !rule
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return None;
        }
        if let Some(tenant) = &rule.tenant_id {
            if request.tenant_id.as_deref() != Some(tenant.as_str()) {
                return None;
            }
        }
        if let Some(project) = &rule.project_code {
            if request.project_code.as_deref() != Some(project.as_str()) {
                return None;
            }
        }
        for (name, expected) in &rule.headers {
            if request.headers.get(name) != Some(expected) {
                return None;
            }
        }
        for (name, expected) in &rule.query {
            if request.query.get(name) != Some(expected) {
                return None;
            }
        }
        candidate.pattern.matches(&request.path)
    }

    /// Match counts per rule id, for the admin surface
    pub fn match_counts(&self) -> HashMap<String, u64> {
        self.match_counts
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }
}
