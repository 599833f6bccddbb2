use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{ItemId, Movie, NewMovie},
    routes::AppState,
};

const DEFAULT_TRENDING_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    limit: Option<usize>,
}

/// Handler for fetching one movie
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ItemId>,
) -> AppResult<Json<Movie>> {
    state
        .catalog
        .find_movie(id)
        .await?
        .map(Json)
        .ok_or(AppError::ItemNotFound(id))
}

/// Handler for movie search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<Movie>>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput(
            "Search query cannot be empty".to_string(),
        ));
    }

    let movies = state.catalog.search_movies(query).await?;
    Ok(Json(movies))
}

/// Handler for the most-rated movies
pub async fn trending(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendingQuery>,
) -> AppResult<Json<Vec<Movie>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TRENDING_LIMIT)
        .min(state.recommender.config().max_recommendations);

    let movies = state.catalog.trending_movies(limit).await?;
    Ok(Json(movies))
}

/// Handler for adding a movie to the catalog
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(movie): Json<NewMovie>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    if movie.title.trim().is_empty() {
        return Err(AppError::InvalidInput("Movie title cannot be empty".to_string()));
    }

    let movie = state.catalog.create_movie(movie).await?;
    tracing::info!(movie_id = movie.id, title = %movie.title, "Movie created");
    Ok((StatusCode::CREATED, Json(movie)))
}
