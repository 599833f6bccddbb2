use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{
        ItemId, RateRequest, RateResponse, RecommendationResponse, SimilarItemsResponse, UserId,
    },
    routes::AppState,
    services::{export::recommendations_csv, recommendations},
};

const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;
const DEFAULT_SIMILAR_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

/// Handler for personalized recommendations
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<UserId>,
    Query(params): Query<LimitQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
    tracing::info!(request_id = %request_id, user_id, limit, "Processing recommendation request");

    let response = recommendations::get_recommendations(
        &state.recommender,
        state.catalog.as_ref(),
        user_id,
        limit,
    )
    .await?;

    tracing::info!(
        request_id = %request_id,
        user_id,
        returned = response.movies.len(),
        model_generation = ?response.model_generation,
        "Recommendations served"
    );

    Ok(Json(response))
}

/// Handler for items similar to a movie
pub async fn similar_items(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<ItemId>,
    Query(params): Query<LimitQuery>,
) -> AppResult<Json<SimilarItemsResponse>> {
    let response = recommendations::get_similar_items(
        &state.recommender,
        state.catalog.as_ref(),
        state.cache.as_ref(),
        state.cache_ttl,
        item_id,
        params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT),
    )
    .await?;
    Ok(Json(response))
}

/// Handler for rating a movie
pub async fn rate(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RateRequest>,
) -> AppResult<Json<RateResponse>> {
    let response =
        recommendations::rate_movie(&state.recommender, &state.scheduler, request).await?;

    tracing::info!(
        request_id = %request_id,
        user_id = response.user_id,
        movie_id = response.movie_id,
        replaced = response.replaced,
        "Rating recorded"
    );

    Ok(Json(response))
}

/// Handler for downloading a user's recommendations as CSV
pub async fn export(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> AppResult<impl IntoResponse> {
    let response = recommendations::get_recommendations(
        &state.recommender,
        state.catalog.as_ref(),
        user_id,
        DEFAULT_RECOMMENDATION_LIMIT,
    )
    .await?;
    let body = recommendations_csv(&response.movies)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=recommendations.csv",
            ),
        ],
        body,
    ))
}
