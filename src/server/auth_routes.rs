//! Token lifecycle endpoints

use super::response::{error_response, trace_id};
use super::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Password login; issues an access token and a refresh token
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> HttpResponse {
    let trace = trace_id(&req);
    match state.auth.login(&body.username, &body.password).await {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(e) => error_response(&req, &trace, &e, state.config.server.expose_internal_errors),
    }
}

/// Exchange a refresh token for a new access token
pub async fn refresh(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> HttpResponse {
    let trace = trace_id(&req);
    match state.auth.refresh(&body.refresh_token).await {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(e) => error_response(&req, &trace, &e, state.config.server.expose_internal_errors),
    }
}

/// Blacklist the presented access token for its remaining lifetime
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: Option<web::Json<LogoutRequest>>,
) -> HttpResponse {
    let trace = trace_id(&req);
    let expose = state.config.server.expose_internal_errors;

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        let err = crate::utils::error::GatewayError::MissingToken;
        return error_response(&req, &trace, &err, expose);
    };

    let refresh_token = body.and_then(|b| b.into_inner().refresh_token);
    match state.auth.logout(token, refresh_token.as_deref()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&req, &trace, &e, expose),
    }
}
