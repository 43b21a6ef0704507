//! Request dispatch
//!
//! The default service for everything that is not an admin or auth
//! route. Pipeline: tenant resolution, authentication, authorization,
//! route match, endpoint selection, breaker-gated proxying.

use super::response::{error_response, trace_id};
use super::state::AppState;
use crate::auth::AuthRequest;
use crate::core::proxy::ProxiedRequest;
use crate::core::router::{RouteRequest, RouteResolution};
use crate::core::tenant::ResolveRequest;
use crate::utils::error::GatewayError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;
use tracing::debug;

/// Lowercase header map of the inbound request
pub fn header_map(req: &HttpRequest) -> HashMap<String, String> {
    req.headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Parsed query parameters of the inbound request
pub fn query_map(req: &HttpRequest) -> HashMap<String, String> {
    url::form_urlencoded::parse(req.query_string().as_bytes())
        .into_owned()
        .collect()
}

pub(super) fn cookie_map(req: &HttpRequest) -> HashMap<String, String> {
    req.cookies()
        .map(|cookies| {
            cookies
                .iter()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub(super) fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        .map(|addr| addr.split(':').next().unwrap_or(addr).to_string())
}

/// Liveness endpoint with registry counts
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let stats = state.registry.stats();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "services": stats.services,
        "endpoints": stats.endpoints,
        "healthyEndpoints": stats.healthy_endpoints,
    }))
}

/// Proxy dispatch for every unmatched path
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let trace = trace_id(&req);
    let expose = state.config.server.expose_internal_errors;
    let headers = header_map(&req);
    let query = query_map(&req);
    let (host, scheme) = {
        let info = req.connection_info();
        (info.host().to_string(), info.scheme().to_string())
    };
    let ip = client_ip(&req);

    // Tenant resolution first; its context gates authorization checks
    let tenant = match state
        .tenants
        .resolve(&ResolveRequest {
            headers: headers.clone(),
            host: host.clone(),
            path: req.path().to_string(),
        })
        .await
    {
        Ok(tenant) => tenant,
        Err(e) => return error_response(&req, &trace, &e, expose),
    };

    // Authentication and authorization, unless the path is public
    if !state.auth.is_public_path(req.path()) {
        let auth_request = AuthRequest {
            headers: headers.clone(),
            query: query.clone(),
            cookies: cookie_map(&req),
            client_ip: ip.clone(),
            request_id: trace.clone(),
        };
        let context = match state.auth.authenticate(&auth_request).await {
            Ok(context) => context,
            Err(e) => return error_response(&req, &trace, &e, expose),
        };
        if let Some(context) = context {
            if let Err(e) = state.auth.authorize(&context, &[], tenant.as_ref()) {
                return error_response(&req, &trace, &e, expose);
            }
        }
    }

    let route_request = RouteRequest {
        method: req.method().as_str().to_string(),
        path: req.path().to_string(),
        session_id: headers.get(&state.config.balancer.session_header).cloned(),
        tenant_id: tenant.as_ref().map(|t| t.tenant_id.clone()),
        project_code: tenant.as_ref().and_then(|t| t.project_code.clone()),
        client_ip: ip.clone(),
        headers,
        query,
    };
    let route = match state.router.find_route(&route_request) {
        RouteResolution::Matched(route) => route,
        RouteResolution::NoHealthyTarget { service } => {
            let err = GatewayError::NoHealthyEndpoint(service);
            return error_response(&req, &trace, &err, expose);
        }
        RouteResolution::NoRoute => {
            let err = GatewayError::NoRoute(req.path().to_string());
            return error_response(&req, &trace, &err, expose);
        }
    };

    let proxied = ProxiedRequest {
        method: match reqwest::Method::from_bytes(req.method().as_str().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                let err = GatewayError::BadRequest("unsupported method".into());
                return error_response(&req, &trace, &err, expose);
            }
        },
        headers: convert_headers(&req),
        query: req.query_string().to_string(),
        body,
        client_ip: ip,
        host,
        scheme,
    };

    match state.proxy.forward(proxied, &route).await {
        Ok(outcome) => {
            debug!(trace_id = %trace, status = outcome.status, attempts = outcome.attempts, "Relaying upstream response");
            relay_response(outcome)
        }
        Err(e) => error_response(&req, &trace, &e, expose),
    }
}

/// Inbound actix headers → outbound reqwest headers
fn convert_headers(req: &HttpRequest) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in req.headers() {
        let name = match reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()) {
            Ok(name) => name,
            Err(_) => continue,
        };
        if let Ok(value) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) {
            out.append(name, value);
        }
    }
    out
}

/// Upstream response → client response, status and headers unchanged
fn relay_response(outcome: crate::core::proxy::ProxyOutcome) -> HttpResponse {
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in outcome.headers.iter() {
        if let Ok(value) = actix_web::http::header::HeaderValue::from_bytes(value.as_bytes()) {
            if let Ok(name) =
                actix_web::http::header::HeaderName::from_bytes(name.as_str().as_bytes())
            {
                builder.append_header((name, value));
            }
        }
    }
    builder.body(outcome.body)
}
