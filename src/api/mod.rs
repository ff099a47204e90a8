//! API layer - HTTP handlers and routing
//!
//! Everything is served under `/api`:
//! - Identity endpoints (`auth`)
//! - Task endpoints (`tasks`)
//! - Tag suggestion (`suggest`)
//! - Health check

pub mod auth;
pub mod middleware;
pub mod responses;
pub mod suggest;
pub mod tasks;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

use responses::HealthResponse;

/// Build the `/api` router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(tasks::router())
        .merge(suggest::router())
        .route("/health", get(health))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api", build_api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origin)),
        )
        .with_state(state)
}

/// CORS for the configured frontend origin, with cookies allowed
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin; cross-origin requests are disabled");
            cors
        }
    }
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.pool.ping().await.map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
