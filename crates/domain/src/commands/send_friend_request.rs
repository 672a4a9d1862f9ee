//! Send a friend request.

use common::{Deadline, UserId};
use serde::{Deserialize, Serialize};
use store::{FriendRequest, RelationStatus};

use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{Notification, Participants, PushEvent};

const MAX_REMARK_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFriendRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub remark: String,
}

/// A single write on the relation service; no saga needed.
pub struct SendFriendRequestHandler {
    participants: Participants,
    config: HandlerConfig,
}

impl SendFriendRequestHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Self {
        Self {
            participants,
            config,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(sender_id = %cmd.sender_id, receiver_id = %cmd.receiver_id))]
    pub async fn handle(&self, cmd: SendFriendRequest) -> Result<FriendRequest, AppError> {
        if cmd.sender_id == cmd.receiver_id {
            return Err(AppError::validation("cannot befriend yourself"));
        }
        if cmd.remark.chars().count() > MAX_REMARK_LEN {
            return Err(AppError::validation(format!(
                "remark must be at most {MAX_REMARK_LEN} characters"
            )));
        }

        let users = &self.participants.users;
        users.get_user(cmd.sender_id).await?;
        users.get_user(cmd.receiver_id).await?;

        let relations = &self.participants.relations;
        match relations.get_user_relation(cmd.sender_id, cmd.receiver_id).await {
            Ok(_) => return Err(AppError::conflict("already friends")),
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        match relations.get_user_relation(cmd.receiver_id, cmd.sender_id).await {
            Ok(relation) if relation.status == RelationStatus::Blocked => {
                return Err(AppError::forbidden("blocked by this user"));
            }
            Ok(_) | Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let pending = relations.get_pending_friend_requests(cmd.receiver_id).await?;
        if pending.iter().any(|r| r.sender_id == cmd.sender_id) {
            return Err(AppError::conflict("a request is already pending"));
        }

        let deadline = Deadline::after(self.config.request_timeout);
        let request = relations
            .send_friend_request(cmd.sender_id, cmd.receiver_id, cmd.remark, deadline)
            .await?;
        tracing::info!(request_id = %request.id, "friend request sent");

        self.participants
            .notify(Notification {
                recipient_id: cmd.receiver_id,
                event: PushEvent::FriendRequestReceived {
                    request_id: request.id,
                    sender_id: cmd.sender_id,
                },
            })
            .await;
        Ok(request)
    }
}
