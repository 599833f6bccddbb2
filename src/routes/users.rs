use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{NewUser, User},
    routes::AppState,
};

/// Handler for registering a user
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(user): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    if user.username.trim().is_empty() {
        return Err(AppError::InvalidInput("Username cannot be empty".to_string()));
    }

    let user = state.catalog.create_user(user).await?;
    tracing::info!(user_id = user.id, username = %user.username, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}
