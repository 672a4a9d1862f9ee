//! Friend list endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{DeleteFriend, Friend, FriendDeleted, ListFriends};

use super::{AppState, CurrentUser, parse_user_id};
use crate::error::ApiError;

/// GET /friends
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Friend>>, ApiError> {
    let friends = state
        .handlers
        .queries
        .list_friends(ListFriends { user_id: user.0 })
        .await?;
    Ok(Json(friends))
}

/// DELETE /friends/{friend_id}
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(friend_id): Path<String>,
) -> Result<Json<FriendDeleted>, ApiError> {
    let friend_id = parse_user_id(&friend_id)?;
    let deleted = state
        .handlers
        .delete_friend
        .handle(DeleteFriend {
            user_id: user.0,
            friend_id,
        })
        .await?;
    Ok(Json(deleted))
}
