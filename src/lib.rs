//! Switchyard: a multi-tenant API gateway
//!
//! Routes inbound HTTP traffic to registered backend services: tenant
//! resolution, authentication/authorization, rule-based routing, load
//! balancing, and circuit-breaker-gated proxying.
//!
//! # Quick start
//!
//! ```no_run
//! use switchyard::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> switchyard::Result<()> {
//!     let config = Config::from_file("gateway.yaml").await?;
//!     Gateway::new(config).run().await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use utils::error::{GatewayError, Result};

/// The assembled gateway, ready to run
pub struct Gateway {
    config: Config,
}

impl Gateway {
    /// Create a gateway from a validated configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Serve until shutdown
    pub async fn run(self) -> Result<()> {
        server::GatewayServer::new(self.config).run().await
    }
}
