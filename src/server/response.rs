//! Error rendering
//!
//! Every gateway-originated failure becomes the structured envelope.
//! Operational errors log at `warn` with their message exposed; anything
//! else logs at `error` and is masked unless internals are explicitly
//! exposed.

use crate::utils::error::{ErrorEnvelope, GatewayError};
use actix_web::{HttpRequest, HttpResponse};
use tracing::{error, warn};

/// Trace id for a request: inbound `X-Request-Id` or a fresh UUID
pub fn trace_id(req: &HttpRequest) -> String {
    req.headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Render an error as the envelope response
pub fn error_response(
    req: &HttpRequest,
    trace_id: &str,
    err: &GatewayError,
    expose_internal: bool,
) -> HttpResponse {
    let path = req.path();
    let method = req.method().as_str();

    if err.is_operational() {
        warn!(code = err.code(), trace_id, path, method, "{}", err);
    } else {
        error!(code = err.code(), trace_id, path, method, "{}", err);
    }

    let envelope = ErrorEnvelope::new(err, trace_id, path, method, expose_internal);
    let mut builder = HttpResponse::build(err.status_code());
    if let GatewayError::RateLimited(retry_secs) = err {
        builder.insert_header(("retry-after", retry_secs.to_string()));
    }
    builder.json(envelope)
}
