use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    engine::{Catalog, RatingSnapshot, RatingStore},
    error::{AppError, AppResult},
    models::{ItemId, Movie, NewMovie, NewUser, Rating, Score, UpsertOutcome, User, UserId},
};

/// In-process store for tests and `STORAGE_BACKEND=memory`
///
/// Every upsert runs inside one write-lock critical section with no await points, so the
/// rating and the item aggregate always change together.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    movies: BTreeMap<ItemId, Movie>,
    ratings: BTreeMap<(UserId, ItemId), Rating>,
    next_user_id: UserId,
    next_movie_id: ItemId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RatingStore for MemoryStore {
    async fn upsert_rating(
        &self,
        user_id: UserId,
        item_id: ItemId,
        score: Score,
    ) -> AppResult<UpsertOutcome> {
        let mut state = self.inner.write().await;
        let MemoryState {
            users,
            movies,
            ratings,
            ..
        } = &mut *state;

        if !users.contains_key(&user_id) {
            return Err(AppError::UserNotFound(user_id));
        }
        let movie = movies
            .get_mut(&item_id)
            .ok_or(AppError::ItemNotFound(item_id))?;

        let rating = Rating {
            user_id,
            item_id,
            score: score.value(),
            rated_at: Utc::now(),
        };
        let previous = ratings.insert((user_id, item_id), rating);

        let (aggregate, outcome) = match previous {
            Some(previous) => (
                movie.aggregate().replace(previous.score, score.value()),
                UpsertOutcome::Replaced {
                    previous: previous.score,
                },
            ),
            None => (
                movie.aggregate().record(score.value()),
                UpsertOutcome::Inserted,
            ),
        };
        movie.average_rating = aggregate.mean;
        movie.rating_count = aggregate.count;

        Ok(outcome)
    }

    async fn all_ratings(&self) -> AppResult<RatingSnapshot> {
        let state = self.inner.read().await;
        Ok(RatingSnapshot::new(
            state.ratings.values().map(Rating::entry).collect(),
        ))
    }

    async fn user_ratings(&self, user_id: UserId) -> AppResult<Vec<(ItemId, f64)>> {
        let state = self.inner.read().await;
        Ok(state
            .ratings
            .range((user_id, ItemId::MIN)..=(user_id, ItemId::MAX))
            .map(|(&(_, item_id), rating)| (item_id, rating.score))
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait::async_trait]
impl Catalog for MemoryStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.inner.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(AppError::InvalidInput(format!(
                "Username already taken: {}",
                user.username
            )));
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: user.username,
            email: user.email,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn find_movie(&self, item_id: ItemId) -> AppResult<Option<Movie>> {
        Ok(self.inner.read().await.movies.get(&item_id).cloned())
    }

    async fn find_movies(&self, item_ids: &[ItemId]) -> AppResult<Vec<Movie>> {
        let state = self.inner.read().await;
        Ok(item_ids
            .iter()
            .filter_map(|id| state.movies.get(id).cloned())
            .collect())
    }

    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>> {
        let state = self.inner.read().await;
        Ok(state
            .movies
            .values()
            .filter(|movie| movie.matches(query))
            .cloned()
            .collect())
    }

    async fn trending_movies(&self, limit: usize) -> AppResult<Vec<Movie>> {
        let state = self.inner.read().await;
        let mut movies: Vec<&Movie> = state.movies.values().collect();
        movies.sort_by(|a, b| {
            b.rating_count
                .cmp(&a.rating_count)
                .then_with(|| b.average_rating.total_cmp(&a.average_rating))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(movies.into_iter().take(limit).cloned().collect())
    }

    async fn create_movie(&self, movie: NewMovie) -> AppResult<Movie> {
        let mut state = self.inner.write().await;
        state.next_movie_id += 1;
        let movie = Movie {
            id: state.next_movie_id,
            title: movie.title,
            genres: movie.genres,
            release_year: movie.release_year,
            average_rating: 0.0,
            rating_count: 0,
            poster_url: movie.poster_url,
            description: movie.description,
            tmdb_id: movie.tmdb_id,
            created_at: Utc::now(),
        };
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }
}
