use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, Movie, UserId};

/// Request body for rating a movie
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub user_id: UserId,
    pub movie_id: ItemId,
    pub rating: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateResponse {
    pub user_id: UserId,
    pub movie_id: ItemId,
    pub rating: f64,
    /// Whether an earlier rating by the same user was overwritten
    pub replaced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendedMovie {
    #[serde(flatten)]
    pub movie: Movie,
    pub predicted_rating: f64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub movies: Vec<RecommendedMovie>,
    pub algorithm: &'static str,
    /// Generation of the similarity model the ranking used; `None` before the first build
    pub model_generation: Option<u64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarMovie {
    #[serde(flatten)]
    pub movie: Movie,
    pub similarity_score: f64,
}

#[derive(Debug, Serialize)]
pub struct SimilarItemsResponse {
    pub item_id: ItemId,
    pub similar_items: Vec<SimilarMovie>,
    pub algorithm: &'static str,
    pub model_generation: Option<u64>,
}

/// A CSV row that could not be imported
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

/// Outcome of a bulk rating upload
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: usize,
    pub errors: Vec<RejectedRow>,
}
