//! HTTP route handlers.

pub mod friend_requests;
pub mod friends;
pub mod groups;
pub mod health;
pub mod metrics;
pub mod users;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::Handlers;
use domain::services::InMemoryUserService;

use crate::error::ApiError;

/// Header carrying the authenticated caller, set by the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub handlers: Handlers,
    pub users: InMemoryUserService,
}

/// The caller, read from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let value = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;
        let uuid = uuid::Uuid::parse_str(value)
            .map_err(|e| ApiError::Unauthorized(format!("malformed {USER_ID_HEADER} header: {e}")))?;
        Ok(CurrentUser(UserId::from_uuid(uuid)))
    }
}

pub(crate) fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}

pub(crate) fn parse_numeric_id(id: &str) -> Result<i64, ApiError> {
    id.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid id: {id:?}")))
}
