//! Dissolve a group.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GlobalId, GroupId, UserId};
use saga::{Saga, SagaCoordinator, SagaHandle, Workflow};
use serde::{Deserialize, Serialize};
use store::GroupIdentity;

use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{GroupService, Notification, Participants, PushEvent, RelationService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteGroup {
    pub user_id: UserId,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDeleted {
    pub group_id: GroupId,
    pub dialog_id: DialogId,
}

/// Tears down a group from the leaves inward: dialog members, the dialog,
/// memberships, then the group row itself.
pub struct DeleteGroupWorkflow {
    groups: Arc<dyn GroupService>,
    relations: Arc<dyn RelationService>,
}

#[async_trait]
impl Saga for DeleteGroupWorkflow {
    type Payload = GroupDeleted;
    type Output = GroupDeleted;
    type Error = AppError;

    fn name(&self) -> &'static str {
        "delete_group_workflow"
    }

    async fn run(
        &self,
        wf: &mut Workflow<AppError>,
        target: GroupDeleted,
    ) -> Result<GroupDeleted, AppError> {
        let GroupDeleted {
            group_id,
            dialog_id,
        } = target;

        let dialog_users = self
            .relations
            .delete_dialog_users_by_dialog(dialog_id)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("delete_dialog_users").on_rollback(move || async move {
            relations
                .delete_dialog_users_by_dialog_revert(dialog_id, &dialog_users)
                .await
        });

        self.relations.delete_dialog(dialog_id).await?;
        let relations = Arc::clone(&self.relations);
        wf.step("delete_dialog")
            .on_rollback(move || async move { relations.delete_dialog_revert(dialog_id).await });

        let memberships = self
            .relations
            .delete_group_relations_by_group(group_id)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("delete_group_relations").on_rollback(move || async move {
            relations
                .delete_group_relations_by_group_revert(group_id, &memberships)
                .await
        });

        self.groups.delete_group(group_id).await?;
        let groups = Arc::clone(&self.groups);
        wf.step("delete_group")
            .on_rollback(move || async move { groups.delete_group_revert(group_id).await });

        Ok(GroupDeleted {
            group_id,
            dialog_id,
        })
    }
}

pub struct DeleteGroupHandler {
    participants: Participants,
    config: HandlerConfig,
    workflow: SagaHandle<DeleteGroupWorkflow>,
}

impl DeleteGroupHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        let workflow = SagaCoordinator::register(DeleteGroupWorkflow {
            groups: Arc::clone(&participants.groups),
            relations: Arc::clone(&participants.relations),
        })?;
        Ok(Self {
            participants,
            config,
            workflow,
        })
    }

    /// Only the owner may dissolve a group.
    #[tracing::instrument(skip(self))]
    pub async fn handle(&self, cmd: DeleteGroup) -> Result<GroupDeleted, AppError> {
        let relations = &self.participants.relations;
        self.participants.groups.get_group(cmd.group_id).await?;

        let caller = match relations.get_group_relation(cmd.group_id, cmd.user_id).await {
            Ok(relation) => relation,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::forbidden("not a member of this group"));
            }
            Err(e) => return Err(e),
        };
        if caller.identity != GroupIdentity::Owner {
            return Err(AppError::forbidden("only the owner can delete a group"));
        }
        let dialog = relations.get_group_dialog(cmd.group_id).await?;
        let members = relations.get_group_members(cmd.group_id).await?;

        let global_id = GlobalId::new();
        let deadline = Deadline::after(self.config.request_timeout);
        let deleted = self
            .workflow
            .execute(
                global_id,
                deadline,
                GroupDeleted {
                    group_id: cmd.group_id,
                    dialog_id: dialog.id,
                },
            )
            .await?;
        tracing::info!(%global_id, "group deleted");

        for member in members.iter().filter(|m| m.user_id != cmd.user_id) {
            self.participants
                .notify(Notification {
                    recipient_id: member.user_id,
                    event: PushEvent::GroupDissolved {
                        group_id: cmd.group_id,
                    },
                })
                .await;
        }
        Ok(deleted)
    }
}
