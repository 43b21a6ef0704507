//! Error types for the gateway
//!
//! Every gateway-originated failure maps to a fixed error code and an HTTP
//! status. Operational errors (expected request-level failures) are logged
//! at `warn` and expose their message; anything else is logged at `error`
//! and replaced with a generic message unless the server is explicitly
//! configured to expose internals.

use actix_web::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tenant could not be found
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Tenant exists but is suspended
    #[error("Tenant is suspended: {0}")]
    TenantSuspended(String),

    /// Tenant exists but is deleted
    #[error("Tenant is deleted: {0}")]
    TenantDeleted(String),

    /// Project could not be found
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// Project exists but is archived
    #[error("Project is archived: {0}")]
    ProjectArchived(String),

    /// No credentials were presented on a route that requires them
    #[error("Missing authentication token")]
    MissingToken,

    /// Presented token failed validation
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Presented token has expired
    #[error("Token has expired")]
    ExpiredToken,

    /// Username/password or API key credentials were wrong
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Caller lacks one or more required permissions
    #[error("Insufficient permissions, missing: {}", missing.join(", "))]
    InsufficientPermissions {
        /// Permissions the caller did not hold
        missing: Vec<String>,
    },

    /// Token tenant/project claims do not match the resolved tenant
    #[error("Tenant mismatch: {0}")]
    TenantMismatch(String),

    /// No routing rule matched the request
    #[error("No route matched: {0}")]
    NoRoute(String),

    /// A rule matched but no healthy endpoint exists for its service
    #[error("No healthy endpoint for service: {0}")]
    NoHealthyEndpoint(String),

    /// Circuit breaker is open for the target endpoint
    #[error("Circuit open for endpoint: {0}")]
    CircuitOpen(String),

    /// Upstream connection was refused or reset
    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    /// Upstream call exceeded the service timeout
    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    /// Other upstream transport failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Too many failed authentication attempts
    #[error("Rate limited, retry in {0}s")]
    RateLimited(u64),

    /// Generic not-found (admin surface)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request (admin surface)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflicting state (admin surface)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convenience constructor for internal errors
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Convenience constructor for configuration errors
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Fixed error code for the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::TenantNotFound(_) => "TENANT_NOT_FOUND",
            Self::TenantSuspended(_) => "TENANT_SUSPENDED",
            Self::TenantDeleted(_) => "TENANT_DELETED",
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::ProjectArchived(_) => "PROJECT_ARCHIVED",
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::TenantMismatch(_) => "TENANT_MISMATCH",
            Self::NoRoute(_) => "NO_ROUTE",
            Self::NoHealthyEndpoint(_) => "NO_HEALTHY_ENDPOINT",
            Self::CircuitOpen(_) => "CIRCUIT_OPEN",
            Self::UpstreamConnect(_) => "UPSTREAM_CONNECT",
            Self::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the response envelope
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TenantNotFound(_) | Self::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            Self::TenantSuspended(_) | Self::TenantDeleted(_) | Self::ProjectArchived(_) => {
                StatusCode::FORBIDDEN
            }
            Self::MissingToken
            | Self::InvalidToken(_)
            | Self::ExpiredToken
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions { .. } | Self::TenantMismatch(_) => StatusCode::FORBIDDEN,
            Self::NoRoute(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoHealthyEndpoint(_) | Self::CircuitOpen(_) | Self::UpstreamConnect(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this is an expected request-level failure
    ///
    /// Operational errors expose their message in the envelope and log at
    /// `warn`; non-operational ones get a generic message and log at `error`.
    pub fn is_operational(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) | Self::Internal(_)
        )
    }
}

/// Structured envelope for gateway-originated error responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Fixed code from the error taxonomy
    pub code: String,
    /// Human-readable message (generic for non-operational errors)
    pub message: String,
    /// Request trace id (inbound `X-Request-Id` or generated)
    pub trace_id: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Request path
    pub path: String,
    /// Request method
    pub method: String,
    /// Permissions missing from the caller, when authorization denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_permissions: Option<Vec<String>>,
}

impl ErrorEnvelope {
    /// Build an envelope for the given error and request identity
    pub fn new(
        error: &GatewayError,
        trace_id: &str,
        path: &str,
        method: &str,
        expose_internal: bool,
    ) -> Self {
        let message = if error.is_operational() || expose_internal {
            error.to_string()
        } else {
            "Internal server error".to_string()
        };

        let missing_permissions = match error {
            GatewayError::InsufficientPermissions { missing } => Some(missing.clone()),
            _ => None,
        };

        Self {
            code: error.code().to_string(),
            message,
            trace_id: trace_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            path: path.to_string(),
            method: method.to_string(),
            missing_permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(GatewayError::ExpiredToken.code(), "EXPIRED_TOKEN");
        assert_eq!(
            GatewayError::CircuitOpen("ep".into()).code(),
            "CIRCUIT_OPEN"
        );
        assert_eq!(GatewayError::NoRoute("/x".into()).code(), "NO_ROUTE");
        assert_eq!(
            GatewayError::TenantSuspended("t1".into()).code(),
            "TENANT_SUSPENDED"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::ExpiredToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::UpstreamTimeout("svc".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::UpstreamConnect("svc".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Upstream("svc".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::NoRoute("/x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = GatewayError::internal("secret detail");
        let envelope = ErrorEnvelope::new(&err, "trace-1", "/api/x", "GET", false);
        assert_eq!(envelope.code, "INTERNAL_ERROR");
        assert_eq!(envelope.message, "Internal server error");

        let exposed = ErrorEnvelope::new(&err, "trace-1", "/api/x", "GET", true);
        assert!(exposed.message.contains("secret detail"));
    }

    #[test]
    fn test_operational_errors_keep_message() {
        let err = GatewayError::TenantSuspended("acme".into());
        let envelope = ErrorEnvelope::new(&err, "trace-2", "/api/y", "POST", false);
        assert!(envelope.message.contains("acme"));
        assert_eq!(envelope.method, "POST");
    }

    #[test]
    fn test_missing_permissions_serialized() {
        let err = GatewayError::InsufficientPermissions {
            missing: vec!["billing:read".into()],
        };
        let envelope = ErrorEnvelope::new(&err, "t", "/p", "GET", false);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["missingPermissions"][0], "billing:read");
        assert!(json["traceId"].is_string());
    }
}
