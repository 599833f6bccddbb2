use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::Cache,
    engine::{Catalog, Recommender, RetrainScheduler},
    middleware::{make_span_with_request_id, request_id_middleware},
};

pub mod admin;
pub mod movies;
pub mod recommendations;
pub mod users;

/// Shared handler state
pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub catalog: Arc<dyn Catalog>,
    pub scheduler: RetrainScheduler,
    /// Similar-item cache; `None` when Redis is not configured
    pub cache: Option<Cache>,
    pub cache_ttl: u64,
}

/// Creates the application router with all routes
///
/// The request id is assigned before the trace span opens so every log line of a
/// request carries it.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Recommendations
        .route("/recommend/rate", post(recommendations::rate))
        .route(
            "/recommend/similar-items/:item_id",
            get(recommendations::similar_items),
        )
        .route("/recommend/export/:user_id", get(recommendations::export))
        .route("/recommend/:user_id", get(recommendations::recommend))
        // Catalog
        .route("/movies", post(movies::create))
        .route("/movies/search", get(movies::search))
        .route("/movies/trending", get(movies::trending))
        .route("/movies/:id", get(movies::get))
        .route("/users", post(users::create))
        // Model administration
        .route("/admin/upload-ratings", post(admin::upload_ratings))
        .route("/admin/retrain", post(admin::retrain))
        .route("/admin/model", get(admin::model_status))
        .route("/admin/users", get(admin::list_users))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
