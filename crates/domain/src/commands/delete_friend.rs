//! Remove a friend.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GlobalId, UserId};
use saga::{Saga, SagaCoordinator, SagaHandle, Workflow};
use serde::{Deserialize, Serialize};
use store::RelationStatus;

use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{MessageService, Notification, Participants, PushEvent, RelationService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFriend {
    pub user_id: UserId,
    pub friend_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendDeleted {
    pub friend_id: UserId,
    pub dialog_id: DialogId,
    pub messages_purged: usize,
}

#[derive(Debug, Clone)]
pub struct Unfriend {
    pub user_id: UserId,
    pub friend_id: UserId,
    pub dialog_id: DialogId,
}

/// Drops the friendship, then purges the pair's private conversation.
///
/// The purge is one-way: it runs last, and nothing runs after it that
/// could fail and ask for it to be undone.
pub struct DeleteFriendWorkflow {
    relations: Arc<dyn RelationService>,
    messages: Arc<dyn MessageService>,
}

#[async_trait]
impl Saga for DeleteFriendWorkflow {
    type Payload = Unfriend;
    type Output = FriendDeleted;
    type Error = AppError;

    fn name(&self) -> &'static str {
        "delete_friend_workflow"
    }

    async fn run(
        &self,
        wf: &mut Workflow<AppError>,
        target: Unfriend,
    ) -> Result<FriendDeleted, AppError> {
        let removal = self
            .relations
            .delete_friend(target.user_id, target.friend_id)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("delete_friend_relation")
            .on_rollback(move || async move { relations.delete_friend_revert(&removal).await });

        let messages_purged = self
            .messages
            .delete_dialog_messages(target.dialog_id)
            .await?;
        wf.step("purge_dialog_messages").one_way();

        Ok(FriendDeleted {
            friend_id: target.friend_id,
            dialog_id: target.dialog_id,
            messages_purged,
        })
    }
}

pub struct DeleteFriendHandler {
    participants: Participants,
    config: HandlerConfig,
    workflow: SagaHandle<DeleteFriendWorkflow>,
}

impl DeleteFriendHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        let workflow = SagaCoordinator::register(DeleteFriendWorkflow {
            relations: Arc::clone(&participants.relations),
            messages: Arc::clone(&participants.messages),
        })?;
        Ok(Self {
            participants,
            config,
            workflow,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn handle(&self, cmd: DeleteFriend) -> Result<FriendDeleted, AppError> {
        if cmd.user_id == cmd.friend_id {
            return Err(AppError::validation("cannot unfriend yourself"));
        }
        let relations = &self.participants.relations;
        let relation = relations.get_user_relation(cmd.user_id, cmd.friend_id).await?;
        if relation.status == RelationStatus::Blocked {
            return Err(AppError::forbidden("unblock this user before deleting them"));
        }
        relations.get_user_relation(cmd.friend_id, cmd.user_id).await?;

        let global_id = GlobalId::new();
        let deadline = Deadline::after(self.config.request_timeout);
        let deleted = self
            .workflow
            .execute(
                global_id,
                deadline,
                Unfriend {
                    user_id: cmd.user_id,
                    friend_id: cmd.friend_id,
                    dialog_id: relation.dialog_id,
                },
            )
            .await?;
        tracing::info!(%global_id, purged = deleted.messages_purged, "friend deleted");

        self.participants
            .notify(Notification {
                recipient_id: cmd.friend_id,
                event: PushEvent::FriendRemoved {
                    user_id: cmd.user_id,
                },
            })
            .await;
        Ok(deleted)
    }
}
