//! Friend request endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{RequestId, UserId};
use domain::{
    FriendRequestAction, FriendRequestHandled, ListFriendRequests, ManageFriendRequest,
    SendFriendRequest,
};
use serde::Deserialize;
use store::FriendRequest;

use super::{AppState, CurrentUser, parse_numeric_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SendRequest {
    pub receiver_id: UserId,
    #[serde(default)]
    pub remark: String,
}

/// POST /friend-requests
#[tracing::instrument(skip(state, req), fields(user_id = %user.0))]
pub async fn send(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<SendRequest>,
) -> Result<(StatusCode, Json<FriendRequest>), ApiError> {
    let request = state
        .handlers
        .send_friend_request
        .handle(SendFriendRequest {
            sender_id: user.0,
            receiver_id: req.receiver_id,
            remark: req.remark,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /friend-requests
///
/// Pending requests addressed to the caller.
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, ApiError> {
    let requests = state
        .handlers
        .queries
        .list_friend_requests(ListFriendRequests { user_id: user.0 })
        .await?;
    Ok(Json(requests))
}

/// POST /friend-requests/{id}/accept
pub async fn accept(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<FriendRequestHandled>, ApiError> {
    answer(&state, user, &id, FriendRequestAction::Accept).await
}

/// POST /friend-requests/{id}/reject
pub async fn reject(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<FriendRequestHandled>, ApiError> {
    answer(&state, user, &id, FriendRequestAction::Reject).await
}

#[tracing::instrument(skip(state), fields(user_id = %user.0))]
async fn answer(
    state: &AppState,
    user: CurrentUser,
    id: &str,
    action: FriendRequestAction,
) -> Result<Json<FriendRequestHandled>, ApiError> {
    let request_id = RequestId::new(parse_numeric_id(id)?);
    let handled = state
        .handlers
        .manage_friend_request
        .handle(ManageFriendRequest {
            user_id: user.0,
            request_id,
            action,
        })
        .await?;
    Ok(Json(handled))
}
