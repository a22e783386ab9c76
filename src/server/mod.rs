use crate::auth::admin_auth_middleware;
use crate::config::Config;
use crate::crypto::CredentialCipher;
use crate::database::{DatabaseManager, DatabaseManagerImpl};
use crate::error::{AppError, set_debug_errors};
use crate::ingest::IngestPipeline;
use crate::rate_limit::{RateLimitSettings, TokenBucketLimiter, rate_limit_middleware};
use crate::routes;
use crate::utils::request_id_middleware;
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state. Cheap to clone; every field is behind an Arc.
#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub database: Arc<dyn DatabaseManager>,
    pub cipher: Arc<CredentialCipher>,
    pub admin_limiter: Arc<TokenBucketLimiter>,
    pub ingest_limiter: Arc<TokenBucketLimiter>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        set_debug_errors(!config.is_production());

        let database = DatabaseManagerImpl::new_from_config(&config.database)
            .await
            .map_err(|e| AppError::config(format!("database setup failed: {e}")))?;

        let cipher = CredentialCipher::new(&config.encryption.master_key);
        if !cipher.is_configured() {
            warn!("no master encryption key configured, credential storage is disabled");
        }

        let admin_limiter = TokenBucketLimiter::new(RateLimitSettings {
            requests_per_minute: config.rate_limit.rpm,
            burst: config.rate_limit.burst,
            exempt_paths: config.rate_limit.exempt_paths.clone(),
        });

        let ingest_limiter = TokenBucketLimiter::new(RateLimitSettings {
            requests_per_minute: config.ingest.rpm,
            burst: config.ingest.burst,
            exempt_paths: vec![],
        });

        Ok(Self {
            config: Arc::new(config),
            database: Arc::new(database),
            cipher: Arc::new(cipher),
            admin_limiter: Arc::new(admin_limiter),
            ingest_limiter: Arc::new(ingest_limiter),
        })
    }

    pub fn ingest_pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(
            self.config.clone(),
            self.database.clone(),
            self.ingest_limiter.clone(),
        )
    }

    pub fn create_app(&self) -> Router {
        let admin_routes = Router::new()
            .route("/data", get(routes::usage::list_usage))
            .route("/log", post(routes::usage::log_usage))
            .route("/reset", delete(routes::usage::reset_usage))
            .route(
                "/tokens",
                get(routes::tracking_tokens::list_tokens)
                    .post(routes::tracking_tokens::create_token),
            )
            .route(
                "/tokens/{id}",
                axum::routing::patch(routes::tracking_tokens::update_token)
                    .delete(routes::tracking_tokens::delete_token),
            )
            .route(
                "/keys",
                get(routes::credentials::list_credentials)
                    .post(routes::credentials::create_credential),
            )
            .route(
                "/keys/{id}",
                get(routes::credentials::get_credential)
                    .patch(routes::credentials::update_credential)
                    .delete(routes::credentials::delete_credential),
            )
            // Auth runs before rate limiting: a caller failing both gets 401.
            .layer(middleware::from_fn_with_state(
                self.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.clone(),
                admin_auth_middleware,
            ));

        Router::new()
            .route("/ping", get(routes::health::ping))
            .route("/ingest", post(routes::ingest::ingest_event))
            .merge(admin_routes)
            .layer(middleware::from_fn(request_id_middleware))
            .layer(self.cors_layer())
            .with_state(self.clone())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<axum::http::HeaderValue> = self
            .config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        if origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }

    pub async fn run(&self) -> Result<(), AppError> {
        self.database
            .migrate()
            .await
            .map_err(|e| AppError::config(format!("migration failed: {e}")))?;

        let app = self.create_app();
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::config(format!("failed to bind {addr}: {e}")))?;

        info!(addr = %addr, environment = %self.config.environment, "server listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
