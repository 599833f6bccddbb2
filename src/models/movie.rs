use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemId;

/// A movie in the catalog, with its running rating aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Movie {
    pub id: ItemId,
    pub title: String,
    pub genres: Vec<String>,
    pub release_year: Option<i32>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub poster_url: Option<String>,
    pub description: Option<String>,
    pub tmdb_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Movie {
    pub fn aggregate(&self) -> ItemAggregate {
        ItemAggregate {
            mean: self.average_rating,
            count: self.rating_count,
        }
    }

    /// Case-insensitive match on title or any genre
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self
                .genres
                .iter()
                .any(|genre| genre.to_lowercase().contains(&query))
    }
}

/// Request body for adding a movie to the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub release_year: Option<i32>,
    pub poster_url: Option<String>,
    pub description: Option<String>,
    pub tmdb_id: Option<i64>,
}

/// Running mean and count of the active ratings on one item
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ItemAggregate {
    pub mean: f64,
    pub count: i64,
}

impl ItemAggregate {
    /// Folds a rating from a user who had not rated the item before
    pub fn record(self, score: f64) -> Self {
        if self.count == 0 {
            return Self {
                mean: score,
                count: 1,
            };
        }
        let count = self.count as f64;
        Self {
            mean: (self.mean * count + score) / (count + 1.0),
            count: self.count + 1,
        }
    }

    /// Swaps one active rating for another; the count is unchanged
    pub fn replace(self, previous: f64, score: f64) -> Self {
        if self.count <= 1 {
            return Self {
                mean: score,
                count: self.count.max(1),
            };
        }
        let count = self.count as f64;
        Self {
            mean: (self.mean * count - previous + score) / count,
            count: self.count,
        }
    }
}
