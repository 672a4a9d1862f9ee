//! Remove members from a group.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GlobalId, GroupId, UserId};
use saga::{Saga, SagaCoordinator, SagaHandle, Workflow};
use serde::{Deserialize, Serialize};
use store::GroupIdentity;

use super::ensure_distinct;
use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{Notification, Participants, PushEvent, RelationService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveGroupMember {
    pub operator_id: UserId,
    pub group_id: GroupId,
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersRemoved {
    pub group_id: GroupId,
    pub removed: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct Eviction {
    pub group_id: GroupId,
    pub dialog_id: DialogId,
    pub member_ids: Vec<UserId>,
}

/// Drops the memberships, then the members' seats in the group dialog.
pub struct RemoveGroupMemberWorkflow {
    relations: Arc<dyn RelationService>,
}

#[async_trait]
impl Saga for RemoveGroupMemberWorkflow {
    type Payload = Eviction;
    type Output = MembersRemoved;
    type Error = AppError;

    fn name(&self) -> &'static str {
        "remove_group_member_workflow"
    }

    async fn run(
        &self,
        wf: &mut Workflow<AppError>,
        eviction: Eviction,
    ) -> Result<MembersRemoved, AppError> {
        let Eviction {
            group_id,
            dialog_id,
            member_ids,
        } = eviction;

        let memberships = self
            .relations
            .remove_group_members(group_id, &member_ids)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("remove_group_members").on_rollback(move || async move {
            relations
                .remove_group_members_revert(group_id, &memberships)
                .await
        });

        let seats = self
            .relations
            .remove_dialog_users(dialog_id, &member_ids)
            .await?;
        let relations = Arc::clone(&self.relations);
        wf.step("remove_dialog_users").on_rollback(move || async move {
            relations.remove_dialog_users_revert(dialog_id, &seats).await
        });

        Ok(MembersRemoved {
            group_id,
            removed: member_ids,
        })
    }
}

pub struct RemoveGroupMemberHandler {
    participants: Participants,
    config: HandlerConfig,
    workflow: SagaHandle<RemoveGroupMemberWorkflow>,
}

impl RemoveGroupMemberHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        let workflow = SagaCoordinator::register(RemoveGroupMemberWorkflow {
            relations: Arc::clone(&participants.relations),
        })?;
        Ok(Self {
            participants,
            config,
            workflow,
        })
    }

    /// Owners may remove anyone but themselves; admins may remove plain
    /// members only.
    #[tracing::instrument(skip(self))]
    pub async fn handle(&self, cmd: RemoveGroupMember) -> Result<MembersRemoved, AppError> {
        if cmd.member_ids.is_empty() {
            return Err(AppError::validation("member_ids must not be empty"));
        }
        ensure_distinct(&cmd.member_ids, "member_ids")?;
        if cmd.member_ids.contains(&cmd.operator_id) {
            return Err(AppError::validation("use leave group to remove yourself"));
        }

        let relations = &self.participants.relations;
        self.participants.groups.get_group(cmd.group_id).await?;
        let operator = match relations
            .get_group_relation(cmd.group_id, cmd.operator_id)
            .await
        {
            Ok(relation) => relation,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::forbidden("not a member of this group"));
            }
            Err(e) => return Err(e),
        };
        if !operator.identity.can_manage_members() {
            return Err(AppError::forbidden("only owners and admins can remove members"));
        }
        for member_id in &cmd.member_ids {
            let target = relations.get_group_relation(cmd.group_id, *member_id).await?;
            match (operator.identity, target.identity) {
                (_, GroupIdentity::Owner) => {
                    return Err(AppError::forbidden("the owner cannot be removed"));
                }
                (GroupIdentity::Admin, GroupIdentity::Admin) => {
                    return Err(AppError::forbidden("admins cannot remove other admins"));
                }
                _ => {}
            }
        }
        let dialog = relations.get_group_dialog(cmd.group_id).await?;

        let global_id = GlobalId::new();
        let deadline = Deadline::after(self.config.request_timeout);
        let removed = self
            .workflow
            .execute(
                global_id,
                deadline,
                Eviction {
                    group_id: cmd.group_id,
                    dialog_id: dialog.id,
                    member_ids: cmd.member_ids,
                },
            )
            .await?;
        tracing::info!(%global_id, count = removed.removed.len(), "group members removed");

        for member_id in &removed.removed {
            self.participants
                .notify(Notification {
                    recipient_id: *member_id,
                    event: PushEvent::RemovedFromGroup {
                        group_id: cmd.group_id,
                        operator_id: cmd.operator_id,
                    },
                })
                .await;
        }
        Ok(removed)
    }
}
