//! Item-based collaborative filtering engine
//!
//! The store adapter ([`RatingStore`]) is the only durable input. Everything else here,
//! the similarity matrix and its rebuild machinery, is derived and can be thrown away
//! and recomputed at any time.

use std::time::Duration;

pub mod ranking;
pub mod recommender;
pub mod scheduler;
pub mod similarity;
pub mod store;

pub use crate::models::ScoreBounds;
pub use recommender::{ModelStatus, Ranked, Recommender, RetrainReport};
pub use scheduler::{RetrainScheduler, RetrainSchedulerHandle};
pub use similarity::{ScoredItem, SimilarityMatrix};
pub use store::{Catalog, RatingSnapshot, RatingStore};

/// Tuning for similarity computation and ranking
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bounds: ScoreBounds,
    /// Pairs with fewer co-raters than this have no defined similarity
    pub min_co_raters: usize,
    /// Upper bound on any ranked list, whatever the caller asks for
    pub max_recommendations: usize,
    pub retrain_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounds: ScoreBounds::default(),
            min_co_raters: 2,
            max_recommendations: 20,
            retrain_timeout: Duration::from_secs(120),
        }
    }
}

/// When the retrain scheduler rebuilds the model
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    pub max_pending: usize,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            max_pending: 100,
            interval: Duration::from_secs(300),
        }
    }
}
