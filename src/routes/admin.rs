use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    engine::{ModelStatus, RetrainReport},
    error::AppResult,
    middleware::RequestId,
    models::{ImportReport, User},
    routes::AppState,
    services::import,
};

/// Handler for bulk rating upload; the body is CSV text
pub async fn upload_ratings(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    body: String,
) -> AppResult<Json<ImportReport>> {
    tracing::info!(request_id = %request_id, bytes = body.len(), "Processing rating upload");

    let report = import::import_ratings(&state.recommender, &state.scheduler, &body).await?;

    tracing::info!(
        request_id = %request_id,
        imported = report.imported,
        rejected = report.rejected,
        "Rating upload completed"
    );

    Ok(Json(report))
}

/// Handler for a synchronous model rebuild
pub async fn retrain(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<RetrainReport>> {
    tracing::info!(request_id = %request_id, "Manual retrain requested");
    let report = state.recommender.retrain().await?;
    Ok(Json(report))
}

/// Handler for listing registered users
pub async fn list_users(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<User>>> {
    let users = state.catalog.list_users().await?;
    Ok(Json(users))
}

/// Handler for the current model status
pub async fn model_status(State(state): State<Arc<AppState>>) -> Json<ModelStatus> {
    Json(state.recommender.status().await)
}
