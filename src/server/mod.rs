//! HTTP server
//!
//! Route layout: `/health` liveness, `/auth/*` token lifecycle,
//! `/_gateway/*` admin surface, and a default service that dispatches
//! everything else through the proxy pipeline.

pub mod admin;
pub mod auth_routes;
pub mod handlers;
pub mod response;
pub mod state;

pub use state::AppState;

use crate::config::Config;
use crate::utils::error::Result;
use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpServer};
use tracing::info;
use tracing_actix_web::TracingLogger;

/// Install every route; shared by the binary and the test harness
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .service(
            web::scope("/auth")
                .route("/login", web::post().to(auth_routes::login))
                .route("/refresh", web::post().to(auth_routes::refresh))
                .route("/logout", web::post().to(auth_routes::logout)),
        )
        .service(
            web::scope("/_gateway")
                .route("/services", web::get().to(admin::list_services))
                .route("/services", web::post().to(admin::register_service))
                .route(
                    "/services/{name}",
                    web::delete().to(admin::unregister_service),
                )
                .route(
                    "/services/{name}/endpoints",
                    web::post().to(admin::add_endpoint),
                )
                .route(
                    "/services/{name}/endpoints/{endpoint_id}",
                    web::delete().to(admin::remove_endpoint),
                )
                .route("/rules", web::get().to(admin::list_rules))
                .route("/rules", web::post().to(admin::add_rule))
                .route("/rules/{id}", web::put().to(admin::update_rule))
                .route("/rules/{id}", web::delete().to(admin::remove_rule))
                .route("/rules/{id}/toggle", web::post().to(admin::toggle_rule))
                .route(
                    "/breakers/{endpoint_id}/reset",
                    web::post().to(admin::reset_breaker),
                )
                .route("/stats", web::get().to(admin::stats)),
        )
        .default_service(web::route().to(handlers::dispatch));
}

/// The bound HTTP server and its background tasks
pub struct GatewayServer {
    config: Config,
}

impl GatewayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build state, spawn background loops, bind and serve
    pub async fn run(self) -> Result<()> {
        let server_config = self.config.server.clone();
        let state = web::Data::new(AppState::from_config(self.config)?);
        let background = state.spawn_background_tasks();

        info!(
            host = %server_config.host,
            port = server_config.port,
            "Starting gateway"
        );

        let app_state = state.clone();
        let cors_config = server_config.clone();
        let result = HttpServer::new(move || {
            let cors = if cors_config.cors_allowed_origins.is_empty() {
                Cors::permissive()
            } else {
                let mut cors = Cors::default().allow_any_method().allow_any_header();
                for origin in &cors_config.cors_allowed_origins {
                    cors = cors.allowed_origin(origin);
                }
                cors
            };
            App::new()
                .app_data(app_state.clone())
                .wrap(TracingLogger::default())
                .wrap(Condition::new(cors_config.cors_enabled, cors))
                .configure(configure_routes)
        })
        .bind((server_config.host.as_str(), server_config.port))?
        .run()
        .await;

        for task in background {
            task.abort();
        }
        result.map_err(Into::into)
    }
}
