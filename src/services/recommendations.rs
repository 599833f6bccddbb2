use std::collections::HashMap;

use chrono::Utc;

use crate::{
    cached,
    db::{Cache, CacheKey},
    engine::{ranking, Catalog, Ranked, Recommender, RetrainScheduler, ScoredItem},
    error::{AppError, AppResult},
    models::{
        ItemId, Movie, RateRequest, RateResponse, RecommendationResponse, RecommendedMovie,
        SimilarItemsResponse, SimilarMovie, UpsertOutcome, UserId,
    },
};

pub const RECOMMENDATION_ALGORITHM: &str = "Item-Based Collaborative Filtering";
pub const SIMILARITY_ALGORITHM: &str = "Item-Based Similarity";

/// Ranked recommendations for a user, resolved to catalog movies
///
/// Fails with `UserNotFound` for unknown users. A user without ratings, or a service
/// that has not built a model yet, gets an empty list.
pub async fn get_recommendations(
    recommender: &Recommender,
    catalog: &dyn Catalog,
    user_id: UserId,
    limit: usize,
) -> AppResult<RecommendationResponse> {
    if catalog.find_user(user_id).await?.is_none() {
        return Err(AppError::UserNotFound(user_id));
    }

    let ranked = recommender.recommend(user_id, limit).await?;
    let movies = resolve_movies(catalog, &ranked.items)
        .await?
        .into_iter()
        .map(|(movie, predicted_rating)| RecommendedMovie {
            movie,
            predicted_rating,
        })
        .collect();

    Ok(RecommendationResponse {
        user_id,
        movies,
        algorithm: RECOMMENDATION_ALGORITHM,
        model_generation: ranked.generation,
        generated_at: Utc::now(),
    })
}

/// Movies most similar to `item_id`, read through the cache when one is configured
///
/// Cache entries are keyed by model generation, so a retrain never serves stale lists.
pub async fn get_similar_items(
    recommender: &Recommender,
    catalog: &dyn Catalog,
    cache: Option<&Cache>,
    cache_ttl: u64,
    item_id: ItemId,
    limit: usize,
) -> AppResult<SimilarItemsResponse> {
    if catalog.find_movie(item_id).await?.is_none() {
        return Err(AppError::ItemNotFound(item_id));
    }

    let ranked = match (cache, recommender.current_model().await) {
        (Some(cache), Some(model)) => {
            let limit = limit.min(recommender.config().max_recommendations);
            let key = CacheKey::SimilarItems {
                generation: model.generation(),
                item_id,
                limit,
            };
            let items: Vec<ScoredItem> = cached!(cache, key, cache_ttl, async {
                AppResult::Ok(ranking::similar_items(&model, item_id, limit))
            })?;
            Ranked {
                items,
                generation: Some(model.generation()),
            }
        }
        _ => recommender.similar_items(item_id, limit).await,
    };

    let similar_items = resolve_movies(catalog, &ranked.items)
        .await?
        .into_iter()
        .map(|(movie, similarity_score)| SimilarMovie {
            movie,
            similarity_score,
        })
        .collect();

    Ok(SimilarItemsResponse {
        item_id,
        similar_items,
        algorithm: SIMILARITY_ALGORITHM,
        model_generation: ranked.generation,
    })
}

/// Records a rating and tells the scheduler a retrain is due
pub async fn rate_movie(
    recommender: &Recommender,
    scheduler: &RetrainScheduler,
    request: RateRequest,
) -> AppResult<RateResponse> {
    let (score, outcome) = recommender
        .upsert_rating(request.user_id, request.movie_id, request.rating)
        .await?;
    scheduler.notify_rating();

    Ok(RateResponse {
        user_id: request.user_id,
        movie_id: request.movie_id,
        rating: score.value(),
        replaced: matches!(outcome, UpsertOutcome::Replaced { .. }),
    })
}

/// Looks up the ranked items in the catalog, keeping rank order
///
/// Items missing from the catalog are dropped with a warning.
async fn resolve_movies(
    catalog: &dyn Catalog,
    items: &[ScoredItem],
) -> AppResult<Vec<(Movie, f64)>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<ItemId> = items.iter().map(|item| item.item_id).collect();
    let mut movies: HashMap<ItemId, Movie> = catalog
        .find_movies(&ids)
        .await?
        .into_iter()
        .map(|movie| (movie.id, movie))
        .collect();

    Ok(items
        .iter()
        .filter_map(|item| match movies.remove(&item.item_id) {
            Some(movie) => Some((movie, item.score)),
            None => {
                tracing::warn!(item_id = item.item_id, "Ranked item missing from catalog");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::engine::{EngineConfig, SchedulerConfig};
    use crate::models::{NewMovie, NewUser};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        recommender: Arc<Recommender>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let recommender = Arc::new(Recommender::new(store.clone(), EngineConfig::default()));
        Fixture { store, recommender }
    }

    async fn add_user(store: &MemoryStore, name: &str) -> UserId {
        store
            .create_user(NewUser {
                username: name.to_string(),
                email: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn add_movie(store: &MemoryStore, title: &str) -> ItemId {
        store
            .create_movie(NewMovie {
                title: title.to_string(),
                genres: vec!["Drama".to_string()],
                release_year: Some(2001),
                poster_url: None,
                description: None,
                tmdb_id: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_recommendations_unknown_user() {
        let f = fixture().await;
        let result = get_recommendations(&f.recommender, f.store.as_ref(), 99, 10).await;
        assert!(matches!(result, Err(AppError::UserNotFound(99))));
    }

    #[tokio::test]
    async fn test_recommendations_before_first_model() {
        let f = fixture().await;
        let user = add_user(&f.store, "ana").await;

        let response = get_recommendations(&f.recommender, f.store.as_ref(), user, 10)
            .await
            .unwrap();

        assert!(response.movies.is_empty());
        assert_eq!(response.model_generation, None);
        assert_eq!(response.algorithm, RECOMMENDATION_ALGORITHM);
    }

    #[tokio::test]
    async fn test_recommendations_resolve_movies_in_rank_order() {
        let f = fixture().await;
        let u1 = add_user(&f.store, "u1").await;
        let u2 = add_user(&f.store, "u2").await;
        let u3 = add_user(&f.store, "u3").await;
        let a = add_movie(&f.store, "A").await;
        let b = add_movie(&f.store, "B").await;

        let ratings = [
            (u1, a, 5.0),
            (u1, b, 4.0),
            (u2, a, 2.0),
            (u2, b, 1.0),
            (u3, a, 4.0),
        ];
        for (user, item, score) in ratings {
            f.recommender.upsert_rating(user, item, score).await.unwrap();
        }
        f.recommender.retrain().await.unwrap();

        let response = get_recommendations(&f.recommender, f.store.as_ref(), u3, 10)
            .await
            .unwrap();

        assert_eq!(response.model_generation, Some(1));
        assert_eq!(response.movies.len(), 1);
        assert_eq!(response.movies[0].movie.title, "B");
        assert!((response.movies[0].predicted_rating - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_similar_items_unknown_movie() {
        let f = fixture().await;
        let result =
            get_similar_items(&f.recommender, f.store.as_ref(), None, 60, 7, 5).await;
        assert!(matches!(result, Err(AppError::ItemNotFound(7))));
    }

    #[tokio::test]
    async fn test_similar_items_without_cache() {
        let f = fixture().await;
        let u1 = add_user(&f.store, "u1").await;
        let u2 = add_user(&f.store, "u2").await;
        let a = add_movie(&f.store, "A").await;
        let b = add_movie(&f.store, "B").await;

        for (user, item, score) in [(u1, a, 5.0), (u1, b, 4.0), (u2, a, 2.0), (u2, b, 1.0)] {
            f.recommender.upsert_rating(user, item, score).await.unwrap();
        }
        f.recommender.retrain().await.unwrap();

        let response = get_similar_items(&f.recommender, f.store.as_ref(), None, 60, a, 5)
            .await
            .unwrap();

        assert_eq!(response.similar_items.len(), 1);
        assert_eq!(response.similar_items[0].movie.id, b);
        assert!((response.similar_items[0].similarity_score - 1.0).abs() < 1e-9);
        assert_eq!(response.algorithm, SIMILARITY_ALGORITHM);
    }

    #[tokio::test]
    async fn test_rate_movie_notifies_scheduler() {
        let f = fixture().await;
        let user = add_user(&f.store, "ana").await;
        let movie = add_movie(&f.store, "A").await;
        let config = SchedulerConfig {
            debounce: std::time::Duration::from_secs(3600),
            ..SchedulerConfig::default()
        };
        let (scheduler, handle) = RetrainScheduler::spawn(f.recommender.clone(), config);

        let request = RateRequest {
            user_id: user,
            movie_id: movie,
            rating: 4.0,
        };
        let first = rate_movie(&f.recommender, &scheduler, request).await.unwrap();
        assert!(!first.replaced);

        let request = RateRequest {
            user_id: user,
            movie_id: movie,
            rating: 2.0,
        };
        let second = rate_movie(&f.recommender, &scheduler, request).await.unwrap();
        assert!(second.replaced);
        assert_eq!(second.rating, 2.0);
        assert_eq!(scheduler.pending(), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_rate_movie_rejects_out_of_range_without_notifying() {
        let f = fixture().await;
        let user = add_user(&f.store, "ana").await;
        let movie = add_movie(&f.store, "A").await;
        let (scheduler, handle) =
            RetrainScheduler::spawn(f.recommender.clone(), SchedulerConfig::default());

        let request = RateRequest {
            user_id: user,
            movie_id: movie,
            rating: 6.0,
        };
        let result = rate_movie(&f.recommender, &scheduler, request).await;

        assert!(matches!(result, Err(AppError::InvalidScore { .. })));
        assert_eq!(scheduler.pending(), 0);

        handle.shutdown().await;
    }
}
