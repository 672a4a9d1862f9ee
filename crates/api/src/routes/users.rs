//! User registration.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::services::User;
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

const MAX_NICKNAME_LEN: usize = 32;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub nickname: String,
}

/// POST /users
#[tracing::instrument(skip(state, req))]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let nickname = req.nickname.trim();
    if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "nickname must be 1 to {MAX_NICKNAME_LEN} characters"
        )));
    }

    let user = state.users.register(nickname);
    metrics::counter!("users_registered_total").increment(1);
    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}
