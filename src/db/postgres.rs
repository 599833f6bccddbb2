use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    engine::{Catalog, RatingSnapshot, RatingStore},
    error::{AppError, AppResult},
    models::{
        ItemAggregate, ItemId, Movie, NewMovie, NewUser, RatingEntry, Score, UpsertOutcome, User,
        UserId,
    },
};

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const MOVIE_COLUMNS: &str = "id, title, genres, release_year, average_rating, rating_count, \
     poster_url, description, tmdb_id, created_at";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Ratings, movies and users persisted in PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RatingStore for PgStore {
    async fn upsert_rating(
        &self,
        user_id: UserId,
        item_id: ItemId,
        score: Score,
    ) -> AppResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let user: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(AppError::UserNotFound(user_id));
        }

        // The row lock serializes every upsert on this movie until commit
        let (mean, count): (f64, i64) = sqlx::query_as(
            "SELECT average_rating, rating_count FROM movies WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::ItemNotFound(item_id))?;

        let previous: Option<(f64,)> =
            sqlx::query_as("SELECT rating FROM ratings WHERE user_id = $1 AND movie_id = $2")
                .bind(user_id)
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await?;

        sqlx::query(
            "INSERT INTO ratings (user_id, movie_id, rating) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, movie_id) \
             DO UPDATE SET rating = EXCLUDED.rating, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(score.value())
        .execute(&mut *tx)
        .await?;

        let aggregate = ItemAggregate { mean, count };
        let (aggregate, outcome) = match previous {
            Some((previous,)) => (
                aggregate.replace(previous, score.value()),
                UpsertOutcome::Replaced { previous },
            ),
            None => (aggregate.record(score.value()), UpsertOutcome::Inserted),
        };

        sqlx::query("UPDATE movies SET average_rating = $1, rating_count = $2 WHERE id = $3")
            .bind(aggregate.mean)
            .bind(aggregate.count)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(outcome)
    }

    async fn all_ratings(&self) -> AppResult<RatingSnapshot> {
        let entries: Vec<RatingEntry> = sqlx::query_as(
            "SELECT user_id, movie_id AS item_id, rating AS score FROM ratings \
             ORDER BY user_id, movie_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(RatingSnapshot::new(entries))
    }

    async fn user_ratings(&self, user_id: UserId) -> AppResult<Vec<(ItemId, f64)>> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT movie_id, rating FROM ratings WHERE user_id = $1 ORDER BY movie_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait::async_trait]
impl Catalog for PgStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        let user: Option<User> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let result: Result<User, sqlx::Error> = sqlx::query_as(
            "INSERT INTO users (username, email) VALUES ($1, $2) \
             RETURNING id, username, email, created_at",
        )
        .bind(&user.username)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => Err(
                AppError::InvalidInput(format!("Username already taken: {}", user.username)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let users: Vec<User> =
            sqlx::query_as("SELECT id, username, email, created_at FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(users)
    }

    async fn find_movie(&self, item_id: ItemId) -> AppResult<Option<Movie>> {
        let movie: Option<Movie> =
            sqlx::query_as(&format!("SELECT {} FROM movies WHERE id = $1", MOVIE_COLUMNS))
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(movie)
    }

    async fn find_movies(&self, item_ids: &[ItemId]) -> AppResult<Vec<Movie>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let movies: Vec<Movie> = sqlx::query_as(&format!(
            "SELECT {} FROM movies WHERE id = ANY($1)",
            MOVIE_COLUMNS
        ))
        .bind(item_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>> {
        let pattern = format!("%{}%", escape_like(query));
        let movies: Vec<Movie> = sqlx::query_as(&format!(
            "SELECT {} FROM movies \
             WHERE title ILIKE $1 \
                OR EXISTS (SELECT 1 FROM unnest(genres) AS genre WHERE genre ILIKE $1) \
             ORDER BY id",
            MOVIE_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn trending_movies(&self, limit: usize) -> AppResult<Vec<Movie>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let movies: Vec<Movie> = sqlx::query_as(&format!(
            "SELECT {} FROM movies \
             ORDER BY rating_count DESC, average_rating DESC, id \
             LIMIT $1",
            MOVIE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn create_movie(&self, movie: NewMovie) -> AppResult<Movie> {
        let created: Movie = sqlx::query_as(&format!(
            "INSERT INTO movies (title, genres, release_year, poster_url, description, tmdb_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            MOVIE_COLUMNS
        ))
        .bind(&movie.title)
        .bind(&movie.genres)
        .bind(movie.release_year)
        .bind(&movie.poster_url)
        .bind(&movie.description)
        .bind(movie.tmdb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}

/// Escapes LIKE wildcards so user input only matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
