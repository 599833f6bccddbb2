use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::{
    ranking,
    similarity::{ScoredItem, SimilarityMatrix},
    store::RatingStore,
    EngineConfig,
};
use crate::{
    error::{AppError, AppResult},
    models::{ItemId, Score, UpsertOutcome, UserId},
};

/// A ranked list together with the model generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub items: Vec<ScoredItem>,
    /// `None` when no model had been built yet
    pub generation: Option<u64>,
}

impl Ranked {
    fn empty(generation: Option<u64>) -> Self {
        Self {
            items: Vec::new(),
            generation,
        }
    }
}

/// Summary of a completed rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub generation: u64,
    pub ratings: usize,
    pub items: usize,
    pub pairs: usize,
    pub elapsed_ms: u64,
}

/// Description of the model currently being served
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub generation: Option<u64>,
    pub built_at: Option<DateTime<Utc>>,
    pub ratings: Option<usize>,
    pub items: Option<usize>,
    pub pairs: Option<usize>,
}

/// Item-based collaborative filtering over a [`RatingStore`]
///
/// Readers always see the last completed [`SimilarityMatrix`]. A rebuild works from a
/// store snapshot off the async runtime and only takes the write lock to swap the new
/// matrix in, so reads never wait for a rebuild and never observe a partial matrix.
pub struct Recommender {
    store: Arc<dyn RatingStore>,
    config: EngineConfig,
    current: RwLock<Option<Arc<SimilarityMatrix>>>,
    rebuild: Mutex<()>,
}

impl Recommender {
    pub fn new(store: Arc<dyn RatingStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates and records a rating
    ///
    /// Does not rebuild the model; callers notify the retrain scheduler instead.
    pub async fn upsert_rating(
        &self,
        user_id: UserId,
        item_id: ItemId,
        score: f64,
    ) -> AppResult<(Score, UpsertOutcome)> {
        let score = self.config.bounds.check(score)?;
        let outcome = self.store.upsert_rating(user_id, item_id, score).await?;
        tracing::debug!(
            user_id,
            item_id,
            score = score.value(),
            outcome = ?outcome,
            "Rating recorded"
        );
        Ok((score, outcome))
    }

    /// The matrix currently being served, if one has been built
    pub async fn current_model(&self) -> Option<Arc<SimilarityMatrix>> {
        self.current.read().await.clone()
    }

    /// Top `limit` unrated items for the user by predicted score
    ///
    /// Empty when the user has no ratings or no model exists yet. Store failures are
    /// returned as errors rather than folded into an empty list.
    pub async fn recommend(&self, user_id: UserId, limit: usize) -> AppResult<Ranked> {
        let Some(model) = self.current_model().await else {
            tracing::debug!(user_id, "No similarity model built yet");
            return Ok(Ranked::empty(None));
        };

        let rated = self.store.user_ratings(user_id).await?;
        if rated.is_empty() {
            return Ok(Ranked::empty(Some(model.generation())));
        }

        let items = ranking::recommend(&model, &rated, self.capped(limit));
        tracing::debug!(
            user_id,
            rated = rated.len(),
            recommended = items.len(),
            generation = model.generation(),
            "Recommendations ranked"
        );

        Ok(Ranked {
            items,
            generation: Some(model.generation()),
        })
    }

    /// Top `limit` items by similarity to `item_id`
    pub async fn similar_items(&self, item_id: ItemId, limit: usize) -> Ranked {
        match self.current_model().await {
            Some(model) => Ranked {
                items: ranking::similar_items(&model, item_id, self.capped(limit)),
                generation: Some(model.generation()),
            },
            None => Ranked::empty(None),
        }
    }

    /// Rebuilds the similarity matrix from the store and swaps it in
    ///
    /// Rebuilds are serialized. On failure or timeout the previous matrix stays in place.
    pub async fn retrain(&self) -> AppResult<RetrainReport> {
        let _guard = self.rebuild.lock().await;
        let started = Instant::now();
        let generation = self
            .current_model()
            .await
            .map_or(1, |model| model.generation() + 1);
        let timeout = self.config.retrain_timeout;

        tracing::info!(generation, store = self.store.name(), "Retraining similarity model");

        let build = async {
            let snapshot = self
                .store
                .all_ratings()
                .await
                .map_err(|e| AppError::RetrainFailure(e.to_string()))?;
            let min_co_raters = self.config.min_co_raters;
            tokio::task::spawn_blocking(move || {
                SimilarityMatrix::build(&snapshot, min_co_raters, generation)
            })
            .await
            .map_err(|e| AppError::RetrainFailure(format!("similarity task failed: {}", e)))
        };

        let matrix = match tokio::time::timeout(timeout, build).await {
            Ok(Ok(matrix)) => matrix,
            Ok(Err(e)) => {
                tracing::error!(error = %e, generation, "Retrain failed, keeping previous model");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = timeout.as_millis(),
                    generation,
                    "Retrain timed out, keeping previous model"
                );
                return Err(AppError::RetrainTimeout(timeout));
            }
        };

        let report = RetrainReport {
            generation,
            ratings: matrix.rating_count(),
            items: matrix.item_count(),
            pairs: matrix.pair_count(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        *self.current.write().await = Some(Arc::new(matrix));

        tracing::info!(
            generation,
            ratings = report.ratings,
            items = report.items,
            pairs = report.pairs,
            elapsed_ms = report.elapsed_ms,
            "Similarity model swapped in"
        );

        Ok(report)
    }

    pub async fn status(&self) -> ModelStatus {
        match self.current_model().await {
            Some(model) => ModelStatus {
                generation: Some(model.generation()),
                built_at: Some(model.built_at()),
                ratings: Some(model.rating_count()),
                items: Some(model.item_count()),
                pairs: Some(model.pair_count()),
            },
            None => ModelStatus::default(),
        }
    }

    fn capped(&self, limit: usize) -> usize {
        limit.min(self.config.max_recommendations)
    }
}
