//! Tenant resolution
//!
//! Strategies are tried in descending priority order; the first raw
//! identity wins and is then validated against tenant/project state.
//! Validated contexts are cached with a TTL; tenant mutations become
//! visible when the entry expires (acceptable staleness window).

use super::metrics::TenantMetrics;
use super::types::{
    CachedContext, ProjectStatus, RawResolution, ResolutionSource, TenantContext, TenantStatus,
};
use crate::config::{TenantConfig, TenantStrategyKind};
use crate::storage::TenantStore;
use crate::utils::error::{GatewayError, Result};
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// The request fields resolution strategies inspect
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Header map with lowercase names
    pub headers: HashMap<String, String>,
    /// Host the client addressed, without scheme
    pub host: String,
    pub path: String,
}

/// Extension point for deployment-specific resolution strategies
pub trait CustomResolver: Send + Sync {
    fn name(&self) -> &str;
    /// Interleaved with built-in strategy priorities
    fn priority(&self) -> i32;
    /// Return a raw tenant id (and optionally a project code)
    fn resolve(&self, request: &ResolveRequest) -> Option<(String, Option<String>)>;
}

/// Claims read without signature verification; verification belongs to
/// the authentication component
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    tenant_id: Option<String>,
    #[serde(default)]
    project_codes: Vec<String>,
}

enum Strategy {
    BuiltIn(TenantStrategyKind),
    Custom(Arc<dyn CustomResolver>),
}

/// Strategy-driven tenant resolution with a TTL-bound context cache
pub struct TenantResolver {
    config: TenantConfig,
    store: Arc<dyn TenantStore>,
    /// `tenantId:projectCode` → cached validated context
    cache: DashMap<String, CachedContext>,
    custom: RwLock<Vec<Arc<dyn CustomResolver>>>,
    metrics: TenantMetrics,
}

impl TenantResolver {
    pub fn new(config: TenantConfig, store: Arc<dyn TenantStore>) -> Self {
        Self {
            config,
            store,
            cache: DashMap::new(),
            custom: RwLock::new(Vec::new()),
            metrics: TenantMetrics::new(),
        }
    }

    /// Register a deployment-specific strategy
    pub fn add_custom_resolver(&self, resolver: Arc<dyn CustomResolver>) {
        debug!(resolver = resolver.name(), priority = resolver.priority(), "Registered custom tenant resolver");
        self.custom.write().push(resolver);
    }

    /// Resolve and validate the tenant identity for one request
    ///
    /// `Ok(None)` means no tenant and no strict requirement; the request
    /// proceeds without a tenant context.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Option<TenantContext>> {
        let start = Instant::now();
        let result = self.resolve_inner(request).await;
        self.metrics.record_latency(start.elapsed());

        if let Ok(Some(context)) = &result {
            self.metrics
                .record_request(&context.tenant_id, context.project_code.as_deref());
        }
        result
    }

    async fn resolve_inner(&self, request: &ResolveRequest) -> Result<Option<TenantContext>> {
        if let Some(raw) = self.resolve_raw(request).await? {
            trace!(tenant = %raw.tenant_id, source = ?raw.source, "Raw tenant identity resolved");
            let context = self
                .validate_and_create_context(&raw.tenant_id, raw.project_code.as_deref(), raw.source)
                .await?;
            return Ok(Some(context));
        }

        if let Some(fallback) = &self.config.fallback_tenant {
            debug!(tenant = %fallback, "No strategy resolved a tenant, using fallback");
            let context = self
                .validate_and_create_context(fallback, None, ResolutionSource::Fallback)
                .await?;
            return Ok(Some(context));
        }

        if self.config.strict {
            warn!(path = %request.path, "No tenant resolved in strict mode");
            return Err(GatewayError::TenantNotFound(
                "no tenant identity in request".into(),
            ));
        }
        Ok(None)
    }

    /// Try each enabled strategy in descending priority order
    async fn resolve_raw(&self, request: &ResolveRequest) -> Result<Option<RawResolution>> {
        let mut strategies: Vec<(i32, Strategy)> = self
            .config
            .strategies
            .iter()
            .filter(|s| s.enabled)
            .map(|s| (s.priority, Strategy::BuiltIn(s.strategy)))
            .collect();
        for resolver in self.custom.read().iter() {
            strategies.push((resolver.priority(), Strategy::Custom(Arc::clone(resolver))));
        }
        strategies.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, strategy) in strategies {
            let raw = match strategy {
                Strategy::BuiltIn(TenantStrategyKind::Header) => self.from_headers(request),
                Strategy::BuiltIn(TenantStrategyKind::Subdomain) => {
                    self.from_subdomain(request).await?
                }
                Strategy::BuiltIn(TenantStrategyKind::Path) => self.from_path(request),
                Strategy::BuiltIn(TenantStrategyKind::JwtClaim) => self.from_jwt_claims(request),
                Strategy::Custom(resolver) => resolver.resolve(request).map(|(tenant, project)| {
                    RawResolution {
                        tenant_id: tenant,
                        project_code: project,
                        source: ResolutionSource::Custom(resolver.name().to_string()),
                    }
                }),
            };
            if raw.is_some() {
                return Ok(raw);
            }
        }
        Ok(None)
    }

    fn from_headers(&self, request: &ResolveRequest) -> Option<RawResolution> {
        let tenant = request.headers.get(&self.config.tenant_header)?;
        if tenant.is_empty() {
            return None;
        }
        Some(RawResolution {
            tenant_id: tenant.clone(),
            project_code: request
                .headers
                .get(&self.config.project_header)
                .filter(|p| !p.is_empty())
                .cloned(),
            source: ResolutionSource::Strategy(TenantStrategyKind::Header),
        })
    }

    /// Strip the configured base domain and look the subdomain up
    async fn from_subdomain(&self, request: &ResolveRequest) -> Result<Option<RawResolution>> {
        let Some(base) = &self.config.base_domain else {
            return Ok(None);
        };
        let host = request.host.split(':').next().unwrap_or(&request.host);
        let Some(subdomain) = host.strip_suffix(&format!(".{}", base)) else {
            return Ok(None);
        };
        if subdomain.is_empty() || subdomain.contains('.') {
            return Ok(None);
        }

        Ok(self
            .store
            .get_tenant_by_subdomain(subdomain)
            .await?
            .map(|tenant| RawResolution {
                tenant_id: tenant.id,
                project_code: None,
                source: ResolutionSource::Strategy(TenantStrategyKind::Subdomain),
            }))
    }

    /// `<prefix>/<tenant>/<project>/...` → tenant and optional project
    fn from_path(&self, request: &ResolveRequest) -> Option<RawResolution> {
        let prefix = self.config.path_prefix.as_deref()?;
        let rest = request.path.strip_prefix(prefix)?;
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let tenant = segments.next()?;
        Some(RawResolution {
            tenant_id: tenant.to_string(),
            project_code: segments.next().map(str::to_string),
            source: ResolutionSource::Strategy(TenantStrategyKind::Path),
        })
    }

    /// Read `tenant_id`/`project_codes` from a bearer token without
    /// verifying it; a forged claim still fails later validation and
    /// authentication
    fn from_jwt_claims(&self, request: &ResolveRequest) -> Option<RawResolution> {
        let token = request
            .headers
            .get("authorization")?
            .strip_prefix("Bearer ")
            .or_else(|| request.headers.get("authorization")?.strip_prefix("bearer "))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims =
            jsonwebtoken::decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
                .ok()?
                .claims;
        let tenant_id = claims.tenant_id?;
        Some(RawResolution {
            tenant_id,
            project_code: claims.project_codes.first().cloned(),
            source: ResolutionSource::Strategy(TenantStrategyKind::JwtClaim),
        })
    }

    /// Validate a raw identity and build (or fetch) its context
    pub async fn validate_and_create_context(
        &self,
        tenant_id: &str,
        project_code: Option<&str>,
        source: ResolutionSource,
    ) -> Result<TenantContext> {
        let cache_key = format!("{}:{}", tenant_id, project_code.unwrap_or("-"));
        if let Some(cached) = self.cache.get(&cache_key) {
            if cached.expires_at > Instant::now() {
                self.metrics.record_cache_hit();
                return Ok(cached.context.clone());
            }
        }
        self.metrics.record_cache_miss();

        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GatewayError::TenantNotFound(tenant_id.to_string()))?;
        match tenant.status {
            TenantStatus::Suspended => {
                return Err(GatewayError::TenantSuspended(tenant_id.to_string()))
            }
            TenantStatus::Deleted => return Err(GatewayError::TenantDeleted(tenant_id.to_string())),
            TenantStatus::Active => {}
        }

        let project = match project_code {
            Some(code) => {
                let project = self
                    .store
                    .get_project(code)
                    .await?
                    .filter(|p| p.tenant_id == tenant.id)
                    .ok_or_else(|| GatewayError::ProjectNotFound(code.to_string()))?;
                if project.status == ProjectStatus::Archived {
                    return Err(GatewayError::ProjectArchived(code.to_string()));
                }
                Some(project)
            }
            None => None,
        };

        let context = TenantContext {
            tenant_id: tenant.id.clone(),
            tenant_name: tenant.name,
            tier: tenant.tier,
            features: tenant.features,
            quotas: tenant.quotas,
            project_code: project.as_ref().map(|p| p.code.clone()),
            project_name: project.map(|p| p.name),
            source,
            resolved_at: Utc::now(),
        };

        let now = Instant::now();
        self.cache.insert(
            cache_key,
            CachedContext {
                context: context.clone(),
                cached_at: now,
                expires_at: now + Duration::from_secs(self.config.cache_ttl_secs),
            },
        );
        Ok(context)
    }

    /// Resolution metrics for the admin surface
    pub fn metrics(&self) -> &TenantMetrics {
        &self.metrics
    }

    /// Live cache entry count
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tenant::types::{Project, Tenant};
    use crate::storage::MemoryStore;

    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut acme = Tenant::new("acme", "Acme Corp");
        acme.subdomain = Some("acme".into());
        store.upsert_tenant(acme).await.unwrap();

        let mut frozen = Tenant::new("frozen", "Frozen Inc");
        frozen.status = TenantStatus::Suspended;
        store.upsert_tenant(frozen).await.unwrap();

        store
            .upsert_project(Project::new("web", "Web App", "acme"))
            .await
            .unwrap();
        let mut old = Project::new("old", "Legacy", "acme");
        old.status = ProjectStatus::Archived;
        store.upsert_project(old).await.unwrap();
        store
    }

    fn resolver_with(config: TenantConfig, store: Arc<MemoryStore>) -> TenantResolver {
        TenantResolver::new(config, store)
    }

    fn request_with_header(tenant: &str) -> ResolveRequest {
        ResolveRequest {
            headers: HashMap::from([("x-tenant-id".to_string(), tenant.to_string())]),
            ..ResolveRequest::default()
        }
    }

    fn token_with_tenant(tenant: &str) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};
        #[derive(serde::Serialize)]
        struct C<'a> {
            tenant_id: &'a str,
            exp: i64,
        }
        encode(
            &Header::default(),
            &C {
                tenant_id: tenant,
                exp: (Utc::now().timestamp()) + 600,
            },
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_header_resolution_and_validation() {
        let r = resolver_with(TenantConfig::default(), store().await);
        let mut req = request_with_header("acme");
        req.headers
            .insert("x-project-code".into(), "web".into());

        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.project_code.as_deref(), Some("web"));
        assert_eq!(
            ctx.source,
            ResolutionSource::Strategy(TenantStrategyKind::Header)
        );
    }

    #[tokio::test]
    async fn test_header_beats_jwt_claim() {
        let r = resolver_with(TenantConfig::default(), store().await);
        let mut req = request_with_header("acme");
        req.headers.insert(
            "authorization".into(),
            format!("Bearer {}", token_with_tenant("frozen")),
        );

        // Header strategy has priority 100, JWT claim 40
        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_jwt_claim_resolution_without_verification() {
        let r = resolver_with(TenantConfig::default(), store().await);
        let req = ResolveRequest {
            headers: HashMap::from([(
                "authorization".to_string(),
                format!("Bearer {}", token_with_tenant("acme")),
            )]),
            ..ResolveRequest::default()
        };
        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(
            ctx.source,
            ResolutionSource::Strategy(TenantStrategyKind::JwtClaim)
        );
    }

    #[tokio::test]
    async fn test_subdomain_resolution() {
        let config = TenantConfig {
            base_domain: Some("example.com".into()),
            ..TenantConfig::default()
        };
        let r = resolver_with(config, store().await);
        let req = ResolveRequest {
            host: "acme.example.com:8080".into(),
            ..ResolveRequest::default()
        };
        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_path_resolution() {
        let config = TenantConfig {
            path_prefix: Some("/t".into()),
            ..TenantConfig::default()
        };
        let r = resolver_with(config, store().await);
        let req = ResolveRequest {
            path: "/t/acme/web/orders".into(),
            ..ResolveRequest::default()
        };
        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.project_code.as_deref(), Some("web"));
    }

    #[tokio::test]
    async fn test_suspended_tenant_rejected() {
        let r = resolver_with(TenantConfig::default(), store().await);
        let err = r
            .resolve(&request_with_header("frozen"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TenantSuspended(_)));
    }

    #[tokio::test]
    async fn test_unknown_tenant_and_project_rejected() {
        let r = resolver_with(TenantConfig::default(), store().await);
        assert!(matches!(
            r.resolve(&request_with_header("ghost")).await.unwrap_err(),
            GatewayError::TenantNotFound(_)
        ));

        let mut req = request_with_header("acme");
        req.headers
            .insert("x-project-code".into(), "nope".into());
        assert!(matches!(
            r.resolve(&req).await.unwrap_err(),
            GatewayError::ProjectNotFound(_)
        ));

        req.headers
            .insert("x-project-code".into(), "old".into());
        assert!(matches!(
            r.resolve(&req).await.unwrap_err(),
            GatewayError::ProjectArchived(_)
        ));
    }

    #[tokio::test]
    async fn test_strict_mode_and_fallback() {
        let strict = resolver_with(
            TenantConfig {
                strict: true,
                ..TenantConfig::default()
            },
            store().await,
        );
        assert!(matches!(
            strict.resolve(&ResolveRequest::default()).await.unwrap_err(),
            GatewayError::TenantNotFound(_)
        ));

        let lax = resolver_with(TenantConfig::default(), store().await);
        assert!(lax.resolve(&ResolveRequest::default()).await.unwrap().is_none());

        let with_fallback = resolver_with(
            TenantConfig {
                fallback_tenant: Some("acme".into()),
                ..TenantConfig::default()
            },
            store().await,
        );
        let ctx = with_fallback
            .resolve(&ResolveRequest::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.source, ResolutionSource::Fallback);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = store().await;
        let r = resolver_with(TenantConfig::default(), store.clone());
        let req = request_with_header("acme");

        r.resolve(&req).await.unwrap();
        // Mutate the backing record; the cached context stays visible
        let mut acme = Tenant::new("acme", "Renamed");
        acme.status = TenantStatus::Suspended;
        store.upsert_tenant(acme).await.unwrap();

        let ctx = r.resolve(&req).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_name, "Acme Corp");

        let snap = r.metrics().snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_custom_resolver_priority() {
        struct FixedResolver;
        impl CustomResolver for FixedResolver {
            fn name(&self) -> &str {
                "fixed"
            }
            fn priority(&self) -> i32 {
                200
            }
            fn resolve(&self, _request: &ResolveRequest) -> Option<(String, Option<String>)> {
                Some(("acme".into(), None))
            }
        }

        let r = resolver_with(TenantConfig::default(), store().await);
        r.add_custom_resolver(Arc::new(FixedResolver));

        // Custom priority 200 outranks the header strategy
        let ctx = r.resolve(&request_with_header("frozen")).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.source, ResolutionSource::Custom("fixed".into()));
    }
}
