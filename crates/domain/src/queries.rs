//! Read-side handlers.

use common::{DialogId, GroupId, UserId};
use serde::{Deserialize, Serialize};
use store::{FriendRequest, Group, GroupIdentity, RelationStatus};

use crate::error::AppError;
use crate::services::Participants;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetGroup {
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListGroupMembers {
    pub user_id: UserId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFriends {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFriendRequests {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub nickname: String,
    pub identity: GroupIdentity,
    pub joined_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: UserId,
    pub nickname: String,
    pub dialog_id: DialogId,
    pub remark: String,
}

/// Answers queries by composing reads across participants.
#[derive(Debug, Clone)]
pub struct QueryHandler {
    participants: Participants,
}

impl QueryHandler {
    pub fn new(participants: Participants) -> Self {
        Self { participants }
    }

    /// Served from the group cache when warm.
    #[tracing::instrument(skip(self))]
    pub async fn get_group(&self, query: GetGroup) -> Result<Group, AppError> {
        self.participants.groups.get_group(query.group_id).await
    }

    /// Members in join order. The caller must be a member.
    #[tracing::instrument(skip(self))]
    pub async fn list_group_members(
        &self,
        query: ListGroupMembers,
    ) -> Result<Vec<GroupMember>, AppError> {
        let relations = &self.participants.relations;
        self.participants.groups.get_group(query.group_id).await?;
        match relations
            .get_group_relation(query.group_id, query.user_id)
            .await
        {
            Ok(_) => {}
            Err(AppError::NotFound(_)) => {
                return Err(AppError::forbidden("not a member of this group"));
            }
            Err(e) => return Err(e),
        }

        let members = relations.get_group_members(query.group_id).await?;
        let ids: Vec<UserId> = members.iter().map(|m| m.user_id).collect();
        let users = self.participants.users.get_users(&ids).await?;
        Ok(members
            .into_iter()
            .map(|m| GroupMember {
                nickname: users
                    .iter()
                    .find(|u| u.id == m.user_id)
                    .map(|u| u.nickname.clone())
                    .unwrap_or_default(),
                user_id: m.user_id,
                identity: m.identity,
                joined_at: m.joined_at,
            })
            .collect())
    }

    /// Unblocked friends of the caller.
    #[tracing::instrument(skip(self))]
    pub async fn list_friends(&self, query: ListFriends) -> Result<Vec<Friend>, AppError> {
        let relations = self
            .participants
            .relations
            .get_friends(query.user_id)
            .await?;
        let relations: Vec<_> = relations
            .into_iter()
            .filter(|r| r.status == RelationStatus::Normal)
            .collect();
        let ids: Vec<UserId> = relations.iter().map(|r| r.friend_id).collect();
        let users = self.participants.users.get_users(&ids).await?;
        Ok(relations
            .into_iter()
            .map(|r| Friend {
                nickname: users
                    .iter()
                    .find(|u| u.id == r.friend_id)
                    .map(|u| u.nickname.clone())
                    .unwrap_or_default(),
                user_id: r.friend_id,
                dialog_id: r.dialog_id,
                remark: r.remark,
            })
            .collect())
    }

    /// Pending requests addressed to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn list_friend_requests(
        &self,
        query: ListFriendRequests,
    ) -> Result<Vec<FriendRequest>, AppError> {
        self.participants
            .relations
            .get_pending_friend_requests(query.user_id)
            .await
    }
}
