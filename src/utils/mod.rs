//! Utility modules shared across the gateway
//!
//! - **error**: the gateway error taxonomy and the JSON error envelope
//! - **crypto**: key/token generation, hashing and password verification

pub mod crypto;
pub mod error;

pub use error::{ErrorEnvelope, GatewayError, Result};
