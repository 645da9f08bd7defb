use axum::{
    Router,
    http::{HeaderValue, request::Parts},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ConfigHandle;
use crate::retail::RetailClient;

pub mod error;
pub mod handlers;
pub mod models;

/// Everything a handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    retail: RetailClient,
    config: ConfigHandle,
}

impl AppState {
    pub fn new(retail: RetailClient, config: ConfigHandle) -> Self {
        Self { retail, config }
    }

    pub fn retail(&self) -> &RetailClient {
        &self.retail
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }
}

/// CORS driven by the live config's `allowed_origins`.
fn cors_layer(config: ConfigHandle) -> CorsLayer {
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
        origin
            .to_str()
            .map(|origin| config.current().allows_origin(origin))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/search", post(handlers::search_handler))
        .route("/autocomplete", post(handlers::autocomplete_handler))
        .route("/products/:product_id", get(handlers::product_handler));

    Router::new()
        .nest("/api/v1", api)
        .route("/healthz", get(handlers::health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(state.config().clone())),
        )
        .with_state(state)
}
