use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use recommendflix_api::{
    db::MemoryStore,
    engine::{EngineConfig, Recommender, RetrainScheduler, SchedulerConfig},
    routes::{create_router, AppState},
};

fn create_test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let recommender = Arc::new(Recommender::new(store.clone(), EngineConfig::default()));
    let scheduler_config = SchedulerConfig {
        debounce: Duration::from_secs(3600),
        max_pending: usize::MAX,
        interval: Duration::from_secs(3600),
    };
    // Dropping the handle stops the scheduler, so only explicit retrains build models
    let (scheduler, _) = RetrainScheduler::spawn(recommender.clone(), scheduler_config);

    let state = Arc::new(AppState {
        recommender,
        catalog: store,
        scheduler,
        cache: None,
        cache_ttl: 60,
    });
    TestServer::new(create_router(state)).unwrap()
}

async fn create_user(server: &TestServer, username: &str) -> i64 {
    let response = server
        .post("/api/users")
        .json(&json!({ "username": username, "email": format!("{}@example.com", username) }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

async fn create_movie(server: &TestServer, title: &str, genres: &[&str], year: i32) -> i64 {
    let response = server
        .post("/api/movies")
        .json(&json!({
            "title": title,
            "genres": genres,
            "release_year": year,
            "description": format!("About {}", title)
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

async fn rate(server: &TestServer, user_id: i64, movie_id: i64, rating: f64) -> Value {
    let response = server
        .post("/api/recommend/rate")
        .json(&json!({ "user_id": user_id, "movie_id": movie_id, "rating": rating }))
        .await;
    response.assert_status_ok();
    response.json()
}

/// Two users agreeing on A and B, and a third who has only rated A
async fn seed_ratings(server: &TestServer) -> (i64, i64, i64) {
    let u1 = create_user(server, "alice").await;
    let u2 = create_user(server, "bob").await;
    let u3 = create_user(server, "carol").await;
    let a = create_movie(server, "Alien", &["Horror", "Sci-Fi"], 1979).await;
    let b = create_movie(server, "Aliens", &["Action", "Sci-Fi"], 1986).await;

    rate(server, u1, a, 5.0).await;
    rate(server, u1, b, 4.0).await;
    rate(server, u2, a, 2.0).await;
    rate(server, u2, b, 1.0).await;
    rate(server, u3, a, 4.0).await;

    (u3, a, b)
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_request_id_is_generated_and_propagated() {
    let server = create_test_server();

    let response = server.get("/health").await;
    let generated = response.header("x-request-id");
    assert!(!generated.is_empty());

    let response = server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_static("upstream-42"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "upstream-42");
}

#[tokio::test]
async fn test_create_and_get_movie() {
    let server = create_test_server();
    let id = create_movie(&server, "Heat", &["Crime"], 1995).await;

    let response = server.get(&format!("/api/movies/{}", id)).await;
    response.assert_status_ok();
    let movie: Value = response.json();
    assert_eq!(movie["title"], "Heat");
    assert_eq!(movie["genres"], json!(["Crime"]));
    assert_eq!(movie["rating_count"], 0);

    let response = server.get("/api/movies/999").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_movies() {
    let server = create_test_server();
    create_movie(&server, "Heat", &["Crime"], 1995).await;
    create_movie(&server, "Alien", &["Horror"], 1979).await;
    create_movie(&server, "The Heat", &["Comedy"], 2013).await;

    let response = server.get("/api/movies/search").add_query_param("q", "heat").await;
    response.assert_status_ok();
    let titles: Vec<String> = response
        .json::<Vec<Value>>()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Heat", "The Heat"]);

    let response = server.get("/api/movies/search").add_query_param("q", "HORROR").await;
    assert_eq!(response.json::<Vec<Value>>().len(), 1);
}

#[tokio::test]
async fn test_trending_movies() {
    let server = create_test_server();
    let u1 = create_user(&server, "alice").await;
    let u2 = create_user(&server, "bob").await;
    let heat = create_movie(&server, "Heat", &["Crime"], 1995).await;
    let alien = create_movie(&server, "Alien", &["Horror"], 1979).await;
    let ronin = create_movie(&server, "Ronin", &["Action"], 1998).await;

    rate(&server, u1, alien, 3.0).await;
    rate(&server, u2, alien, 3.0).await;
    rate(&server, u1, ronin, 4.0).await;
    rate(&server, u2, ronin, 5.0).await;
    rate(&server, u1, heat, 5.0).await;

    let response = server.get("/api/movies/trending").await;
    response.assert_status_ok();
    let ids: Vec<i64> = response
        .json::<Vec<Value>>()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![ronin, alien, heat]);

    let response = server
        .get("/api/movies/trending")
        .add_query_param("limit", 1)
        .await;
    let movies = response.json::<Vec<Value>>();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0]["title"], "Ronin");
}

#[tokio::test]
async fn test_list_users() {
    let server = create_test_server();

    let response = server.get("/api/admin/users").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!([]));

    let alice = create_user(&server, "alice").await;
    let bob = create_user(&server, "bob").await;

    let users = server.get("/api/admin/users").await.json::<Vec<Value>>();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["id"], alice);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[1]["id"], bob);
    assert_eq!(users[1]["email"], "bob@example.com");
}

#[tokio::test]
async fn test_create_user_rejects_blank_username() {
    let server = create_test_server();
    let response = server
        .post("/api/users")
        .json(&json!({ "username": "  " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_rate_updates_movie_aggregate() {
    let server = create_test_server();
    let u1 = create_user(&server, "alice").await;
    let u2 = create_user(&server, "bob").await;
    let movie = create_movie(&server, "Heat", &["Crime"], 1995).await;

    let first = rate(&server, u1, movie, 4.0).await;
    assert_eq!(first["replaced"], false);
    rate(&server, u2, movie, 2.0).await;
    let overwrite = rate(&server, u1, movie, 5.0).await;
    assert_eq!(overwrite["replaced"], true);
    assert_eq!(overwrite["rating"], 5.0);

    let movie: Value = server.get(&format!("/api/movies/{}", movie)).await.json();
    assert_eq!(movie["rating_count"], 2);
    assert!((movie["average_rating"].as_f64().unwrap() - 3.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_rate_rejects_invalid_input() {
    let server = create_test_server();
    let user = create_user(&server, "alice").await;
    let movie = create_movie(&server, "Heat", &["Crime"], 1995).await;

    let response = server
        .post("/api/recommend/rate")
        .json(&json!({ "user_id": user, "movie_id": movie, "rating": 5.5 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/recommend/rate")
        .json(&json!({ "user_id": 404, "movie_id": movie, "rating": 3.0 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = server
        .post("/api/recommend/rate")
        .json(&json!({ "user_id": user, "movie_id": 404, "rating": 3.0 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recommendations_empty_before_first_model() {
    let server = create_test_server();
    let (user, _, _) = seed_ratings(&server).await;

    let response = server.get(&format!("/api/recommend/{}", user)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["movies"], json!([]));
    assert_eq!(body["model_generation"], Value::Null);
    assert_eq!(body["algorithm"], "Item-Based Collaborative Filtering");
}

#[tokio::test]
async fn test_recommendation_flow() {
    let server = create_test_server();
    let (user, _, b) = seed_ratings(&server).await;

    let response = server.post("/api/admin/retrain").await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["generation"], 1);
    assert_eq!(report["ratings"], 5);
    assert_eq!(report["pairs"], 1);

    let response = server.get(&format!("/api/recommend/{}", user)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user_id"], user);
    assert_eq!(body["model_generation"], 1);
    let movies = body["movies"].as_array().unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0]["id"], b);
    assert_eq!(movies[0]["title"], "Aliens");
    assert!((movies[0]["predicted_rating"].as_f64().unwrap() - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_recommend_unknown_user() {
    let server = create_test_server();
    let response = server.get("/api/recommend/77").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "User not found: 77");
}

#[tokio::test]
async fn test_similar_items() {
    let server = create_test_server();
    let (_, a, b) = seed_ratings(&server).await;
    server.post("/api/admin/retrain").await.assert_status_ok();

    let response = server
        .get(&format!("/api/recommend/similar-items/{}", a))
        .add_query_param("limit", 3)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["item_id"], a);
    assert_eq!(body["algorithm"], "Item-Based Similarity");
    let similar = body["similar_items"].as_array().unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0]["id"], b);
    assert!((similar[0]["similarity_score"].as_f64().unwrap() - 1.0).abs() < 1e-9);

    let response = server.get("/api/recommend/similar-items/999").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_recommendations_csv() {
    let server = create_test_server();
    let (user, _, _) = seed_ratings(&server).await;
    server.post("/api/admin/retrain").await.assert_status_ok();

    let response = server.get(&format!("/api/recommend/export/{}", user)).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "text/csv");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=recommendations.csv"
    );

    let text = response.text();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Title,Genres,Year,Rating,Description"));
    assert_eq!(
        lines.next(),
        Some("\"Aliens\",\"Action; Sci-Fi\",\"1986\",\"2.5\",\"About Aliens\"")
    );
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn test_upload_ratings() {
    let server = create_test_server();
    let u1 = create_user(&server, "alice").await;
    let u2 = create_user(&server, "bob").await;
    let a = create_movie(&server, "Alien", &["Horror"], 1979).await;
    let b = create_movie(&server, "Aliens", &["Action"], 1986).await;

    let body = format!(
        "user_id,movie_id,rating\n{u1},{a},5\n{u1},{b},4\n{u2},{a},2\n{u2},{b},1\n{u2},{b},0\n"
    );
    let response = server.post("/api/admin/upload-ratings").text(body).await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["imported"], 4);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["errors"][0]["line"], 6);

    server.post("/api/admin/retrain").await.assert_status_ok();
    let status: Value = server.get("/api/admin/model").await.json();
    assert_eq!(status["ratings"], 4);
    assert_eq!(status["pairs"], 1);
}

#[tokio::test]
async fn test_model_status() {
    let server = create_test_server();

    let status: Value = server.get("/api/admin/model").await.json();
    assert_eq!(status["generation"], Value::Null);
    assert_eq!(status["built_at"], Value::Null);

    server.post("/api/admin/retrain").await.assert_status_ok();
    server.post("/api/admin/retrain").await.assert_status_ok();

    let status: Value = server.get("/api/admin/model").await.json();
    assert_eq!(status["generation"], 2);
    assert_eq!(status["ratings"], 0);
    assert!(status["built_at"].is_string());
}
