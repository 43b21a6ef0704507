//! Administrative surface under `/_gateway`
//!
//! Service and rule CRUD, breaker resets, and aggregate stats for an
//! external control plane. Every handler starts with an explicit
//! `gateway:admin` authorization check.

use super::handlers::{client_ip, cookie_map, header_map, query_map};
use super::response::{error_response, trace_id};
use super::state::AppState;
use crate::auth::AuthRequest;
use crate::core::registry::{ServiceDefinition, ServiceEndpoint};
use crate::core::router::RoutingRule;
use crate::utils::error::{GatewayError, Result};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

/// Authenticate the caller and require the `gateway:admin` permission
async fn admin_guard(req: &HttpRequest, state: &AppState, trace: &str) -> Result<()> {
    let auth_request = AuthRequest {
        headers: header_map(req),
        query: query_map(req),
        cookies: cookie_map(req),
        client_ip: client_ip(req),
        request_id: trace.to_string(),
    };
    let context = state
        .auth
        .authenticate(&auth_request)
        .await?
        .ok_or(GatewayError::MissingToken)?;
    state.auth.authorize(&context, &["gateway:admin"], None)
}

macro_rules! guard {
    ($req:expr, $state:expr, $trace:expr) => {
        if let Err(e) = admin_guard(&$req, &$state, &$trace).await {
            let expose = $state.config.server.expose_internal_errors;
            return error_response(&$req, &$trace, &e, expose);
        }
    };
}

fn render(req: &HttpRequest, trace: &str, state: &AppState, result: Result<HttpResponse>) -> HttpResponse {
    match result {
        Ok(response) => response,
        Err(e) => error_response(req, trace, &e, state.config.server.expose_internal_errors),
    }
}

// ---- services ----

pub async fn list_services(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    HttpResponse::Ok().json(state.registry.all_services())
}

pub async fn register_service(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ServiceDefinition>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);

    let service = body.into_inner();
    let name = service.name.clone();
    let result = state.registry.register(service).map(|created| {
        if created && state.router.auto_default_rules() {
            // A failing default rule (e.g. duplicate id) is not fatal
            let _ = state.router.create_default_rule(&name);
        }
        let mut builder = if created {
            HttpResponse::Created()
        } else {
            HttpResponse::Ok()
        };
        builder.json(serde_json::json!({ "name": name, "created": created }))
    });
    render(&req, &trace, &state, result)
}

pub async fn unregister_service(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .registry
        .unregister(&path.into_inner())
        .map(|service| HttpResponse::Ok().json(service));
    render(&req, &trace, &state, result)
}

pub async fn add_endpoint(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ServiceEndpoint>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .registry
        .add_endpoint(&path.into_inner(), body.into_inner())
        .map(|_| HttpResponse::Created().finish());
    render(&req, &trace, &state, result)
}

pub async fn remove_endpoint(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let (service, endpoint_id) = path.into_inner();
    let result = state
        .registry
        .remove_endpoint(&service, &endpoint_id)
        .map(|_| HttpResponse::NoContent().finish());
    render(&req, &trace, &state, result)
}

// ---- routing rules ----

pub async fn list_rules(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    HttpResponse::Ok().json(state.router.list_rules())
}

pub async fn add_rule(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RoutingRule>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .router
        .add_rule(body.into_inner())
        .map(|rule| HttpResponse::Created().json(rule));
    render(&req, &trace, &state, result)
}

pub async fn update_rule(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RoutingRule>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .router
        .update_rule(&path.into_inner(), body.into_inner())
        .map(|rule| HttpResponse::Ok().json(rule));
    render(&req, &trace, &state, result)
}

pub async fn remove_rule(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .router
        .remove_rule(&path.into_inner())
        .map(|rule| HttpResponse::Ok().json(rule));
    render(&req, &trace, &state, result)
}

#[derive(Debug, Deserialize)]
pub struct ToggleRule {
    pub enabled: bool,
}

pub async fn toggle_rule(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ToggleRule>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .router
        .toggle_rule(&path.into_inner(), body.enabled)
        .map(|_| HttpResponse::NoContent().finish());
    render(&req, &trace, &state, result)
}

// ---- breakers & stats ----

pub async fn reset_breaker(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    let result = state
        .proxy
        .reset_breaker(&path.into_inner())
        .map(|_| HttpResponse::NoContent().finish());
    render(&req, &trace, &state, result)
}

pub async fn stats(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let trace = trace_id(&req);
    guard!(req, state, trace);
    HttpResponse::Ok().json(serde_json::json!({
        "registry": state.registry.stats(),
        "balancer": state.balancer.stats(),
        "breakers": state.proxy.breaker_snapshots(),
        "ruleMatches": state.router.match_counts(),
        "tenants": state.tenants.metrics().snapshot(),
    }))
}
