//! Accept or reject a friend request.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GlobalId, RequestId, UserId};
use saga::{Saga, SagaCoordinator, SagaHandle, Workflow};
use serde::{Deserialize, Serialize};
use store::{FriendRequest, RequestStatus};

use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{Notification, Participants, PushEvent, RelationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestAction {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageFriendRequest {
    /// The receiver of the request.
    pub user_id: UserId,
    pub request_id: RequestId,
    pub action: FriendRequestAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestHandled {
    pub request_id: RequestId,
    pub status: RequestStatus,
    /// Private dialog of the new friendship, when accepted.
    pub dialog_id: Option<DialogId>,
}

/// Marks the request accepted, then creates the friendship.
pub struct AcceptFriendRequestWorkflow {
    relations: Arc<dyn RelationService>,
}

#[async_trait]
impl Saga for AcceptFriendRequestWorkflow {
    type Payload = FriendRequest;
    type Output = DialogId;
    type Error = AppError;

    fn name(&self) -> &'static str {
        "accept_friend_request_workflow"
    }

    async fn run(
        &self,
        wf: &mut Workflow<AppError>,
        request: FriendRequest,
    ) -> Result<DialogId, AppError> {
        let request_id = request.id;
        self.relations
            .set_friend_request_status(request_id, RequestStatus::Accepted)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("accept_request").on_rollback(move || async move {
            relations.set_friend_request_status_revert(request_id).await
        });

        let friendship = self
            .relations
            .add_friend(request.sender_id, request.receiver_id, wf.deadline())
            .await?;
        let dialog_id = friendship.dialog_id;
        let relations = Arc::clone(&self.relations);
        wf.step("add_friend_relation")
            .on_rollback(move || async move { relations.add_friend_revert(&friendship).await });

        Ok(dialog_id)
    }
}

pub struct ManageFriendRequestHandler {
    participants: Participants,
    config: HandlerConfig,
    accept: SagaHandle<AcceptFriendRequestWorkflow>,
}

impl ManageFriendRequestHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        let accept = SagaCoordinator::register(AcceptFriendRequestWorkflow {
            relations: Arc::clone(&participants.relations),
        })?;
        Ok(Self {
            participants,
            config,
            accept,
        })
    }

    /// Accepting an already accepted request succeeds without side effects.
    #[tracing::instrument(skip(self))]
    pub async fn handle(&self, cmd: ManageFriendRequest) -> Result<FriendRequestHandled, AppError> {
        let relations = &self.participants.relations;
        let request = relations.get_friend_request(cmd.request_id).await?;
        if request.receiver_id != cmd.user_id {
            return Err(AppError::forbidden("this request is addressed to someone else"));
        }

        match (request.status, cmd.action) {
            (RequestStatus::Pending, _) => {}
            (RequestStatus::Accepted, FriendRequestAction::Accept) => {
                let existing = relations
                    .get_user_relation(request.receiver_id, request.sender_id)
                    .await;
                if let Ok(relation) = existing {
                    return Ok(FriendRequestHandled {
                        request_id: request.id,
                        status: RequestStatus::Accepted,
                        dialog_id: Some(relation.dialog_id),
                    });
                }
                return Err(AppError::conflict("friend request was already handled"));
            }
            _ => return Err(AppError::conflict("friend request was already handled")),
        }

        match cmd.action {
            FriendRequestAction::Reject => {
                relations
                    .set_friend_request_status(request.id, RequestStatus::Rejected)
                    .await?;
                tracing::info!("friend request rejected");
                Ok(FriendRequestHandled {
                    request_id: request.id,
                    status: RequestStatus::Rejected,
                    dialog_id: None,
                })
            }
            FriendRequestAction::Accept => self.accept(request).await,
        }
    }

    async fn accept(&self, request: FriendRequest) -> Result<FriendRequestHandled, AppError> {
        let relations = &self.participants.relations;
        self.participants.users.get_user(request.sender_id).await?;
        match relations
            .get_user_relation(request.receiver_id, request.sender_id)
            .await
        {
            Ok(_) => return Err(AppError::conflict("already friends")),
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let request_id = request.id;
        let sender_id = request.sender_id;
        let receiver_id = request.receiver_id;
        let global_id = GlobalId::new();
        let deadline = Deadline::after(self.config.request_timeout);
        let dialog_id = self.accept.execute(global_id, deadline, request).await?;
        tracing::info!(%global_id, %dialog_id, "friend request accepted");

        self.participants
            .notify(Notification {
                recipient_id: sender_id,
                event: PushEvent::FriendRequestAccepted {
                    request_id,
                    receiver_id,
                },
            })
            .await;
        Ok(FriendRequestHandled {
            request_id,
            status: RequestStatus::Accepted,
            dialog_id: Some(dialog_id),
        })
    }
}
