//! Group endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{GroupId, UserId};
use domain::{
    CreateGroup, DeleteGroup, GetGroup, GroupCreated, GroupDeleted, GroupMember,
    ListGroupMembers, MembersRemoved, RemoveGroupMember,
};
use serde::Deserialize;
use store::{Group, GroupKind};

use super::{AppState, CurrentUser, parse_numeric_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

#[derive(Deserialize)]
pub struct RemoveMembersRequest {
    pub member_ids: Vec<UserId>,
}

fn parse_group_id(id: &str) -> Result<GroupId, ApiError> {
    parse_numeric_id(id).map(GroupId::new)
}

/// POST /groups
#[tracing::instrument(skip(state, req), fields(user_id = %user.0))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupCreated>), ApiError> {
    let created = state
        .handlers
        .create_group
        .handle(CreateGroup {
            creator_id: user.0,
            name: req.name,
            kind: req.kind,
            avatar: req.avatar,
            member_ids: req.member_ids,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /groups/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Group>, ApiError> {
    let group_id = parse_group_id(&id)?;
    let group = state.handlers.queries.get_group(GetGroup { group_id }).await?;
    Ok(Json(group))
}

/// DELETE /groups/{id}
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<GroupDeleted>, ApiError> {
    let group_id = parse_group_id(&id)?;
    let deleted = state
        .handlers
        .delete_group
        .handle(DeleteGroup {
            user_id: user.0,
            group_id,
        })
        .await?;
    Ok(Json(deleted))
}

/// GET /groups/{id}/members
#[tracing::instrument(skip(state), fields(user_id = %user.0))]
pub async fn members(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<GroupMember>>, ApiError> {
    let group_id = parse_group_id(&id)?;
    let members = state
        .handlers
        .queries
        .list_group_members(ListGroupMembers {
            user_id: user.0,
            group_id,
        })
        .await?;
    Ok(Json(members))
}

/// DELETE /groups/{id}/members
#[tracing::instrument(skip(state, req), fields(user_id = %user.0))]
pub async fn remove_members(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<RemoveMembersRequest>,
) -> Result<Json<MembersRemoved>, ApiError> {
    let group_id = parse_group_id(&id)?;
    let removed = state
        .handlers
        .remove_group_member
        .handle(RemoveGroupMember {
            operator_id: user.0,
            group_id,
            member_ids: req.member_ids,
        })
        .await?;
    Ok(Json(removed))
}
