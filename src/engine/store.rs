use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{ItemId, Movie, NewMovie, NewUser, RatingEntry, Score, UpsertOutcome, User, UserId},
};

/// Immutable, restartable view of every active rating
///
/// Entries are ordered by `(user_id, item_id)` regardless of the backend that produced
/// them, so iterating the same snapshot twice (or two snapshots of an unchanged store)
/// yields the same sequence.
#[derive(Debug, Clone, Default)]
pub struct RatingSnapshot {
    entries: Arc<[RatingEntry]>,
}

impl RatingSnapshot {
    pub fn new(mut entries: Vec<RatingEntry>) -> Self {
        entries.sort_by(|a, b| (a.user_id, a.item_id).cmp(&(b.user_id, b.item_id)));
        Self {
            entries: entries.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RatingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Durable source of truth for ratings
///
/// Implementations must apply an upsert and the matching item aggregate update as one
/// atomic unit, serialized per item, so concurrent raters never lose an aggregate update.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// Inserts or overwrites the (user, item) rating and updates the item aggregate
    ///
    /// Fails with `UserNotFound` / `ItemNotFound` when either identity does not exist.
    async fn upsert_rating(
        &self,
        user_id: UserId,
        item_id: ItemId,
        score: Score,
    ) -> AppResult<UpsertOutcome>;

    /// Snapshot of all active ratings
    async fn all_ratings(&self) -> AppResult<RatingSnapshot>;

    /// The user's active ratings as `(item_id, score)`, ordered by item
    async fn user_ratings(&self, user_id: UserId) -> AppResult<Vec<(ItemId, f64)>>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Movie and user records the HTTP layer resolves identities against
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<User>>;

    async fn create_user(&self, user: NewUser) -> AppResult<User>;

    /// Every registered user, ordered by id
    async fn list_users(&self) -> AppResult<Vec<User>>;

    async fn find_movie(&self, item_id: ItemId) -> AppResult<Option<Movie>>;

    /// Fetches the given movies in no particular order; unknown ids are skipped
    async fn find_movies(&self, item_ids: &[ItemId]) -> AppResult<Vec<Movie>>;

    /// Case-insensitive title or genre search, ordered by id
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>>;

    /// Most-rated movies first, then higher average, then lower id
    async fn trending_movies(&self, limit: usize) -> AppResult<Vec<Movie>>;

    async fn create_movie(&self, movie: NewMovie) -> AppResult<Movie>;
}
