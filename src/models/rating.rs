use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, UserId};
use crate::error::{AppError, AppResult};

/// A rating score that has passed bounds validation
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Inclusive range of accepted rating scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBounds {
    min: f64,
    max: f64,
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self { min: 1.0, max: 5.0 }
    }
}

impl ScoreBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Validates a raw score, rejecting NaN and anything outside the bounds
    pub fn check(&self, score: f64) -> AppResult<Score> {
        if score.is_finite() && score >= self.min && score <= self.max {
            Ok(Score(score))
        } else {
            Err(AppError::InvalidScore {
                score,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// A persisted rating
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub score: f64,
    pub rated_at: DateTime<Utc>,
}

impl Rating {
    pub fn entry(&self) -> RatingEntry {
        RatingEntry {
            user_id: self.user_id,
            item_id: self.item_id,
            score: self.score,
        }
    }
}

/// The (user, item, score) triple the similarity computation consumes
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct RatingEntry {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub score: f64,
}

/// What an upsert did to the (user, item) slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced { previous: f64 },
}
