//! Create a group and invite the creator's friends into it.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GlobalId, UserId};
use saga::{Saga, SagaCoordinator, SagaHandle, Workflow};
use serde::{Deserialize, Serialize};
use store::{Group, GroupKind};

use super::{ensure_distinct, ensure_mutual_friends};
use crate::config::HandlerConfig;
use crate::error::AppError;
use crate::services::{
    GroupInvitation, GroupService, Notification, Participants, PushEvent, RelationService,
};

const MAX_NAME_LEN: usize = 64;

/// Command to create a group with an initial set of invitees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub creator_id: UserId,
    pub name: String,
    #[serde(default)]
    pub kind: GroupKind,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group: Group,
    pub dialog_id: DialogId,
}

/// Input of [`CreateGroupWorkflow`], after validation.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub group: Group,
    pub member_ids: Vec<UserId>,
}

/// Creates the group row, then its dialog and memberships.
pub struct CreateGroupWorkflow {
    groups: Arc<dyn GroupService>,
    relations: Arc<dyn RelationService>,
}

#[async_trait]
impl Saga for CreateGroupWorkflow {
    type Payload = NewGroup;
    type Output = GroupCreated;
    type Error = AppError;

    fn name(&self) -> &'static str {
        "create_group_workflow"
    }

    async fn run(
        &self,
        wf: &mut Workflow<AppError>,
        new: NewGroup,
    ) -> Result<GroupCreated, AppError> {
        let deadline = wf.deadline();
        let owner_id = new.group.creator_id;

        let group = self.groups.create_group(new.group, deadline).await?;
        let group_id = group.id;
        let groups = Arc::clone(&self.groups);
        wf.step("create_group")
            .on_rollback(move || async move { groups.create_group_revert(group_id).await });

        let invitation = GroupInvitation {
            group_id,
            owner_id,
            member_ids: new.member_ids,
        };
        let membership = self
            .relations
            .create_group_and_invite_users(invitation, deadline)
            .await?;
        let dialog_id = membership.dialog_id;
        let relations = Arc::clone(&self.relations);
        wf.step("create_group_relations").on_rollback(move || async move {
            relations
                .create_group_and_invite_users_revert(group_id, &membership)
                .await
        });

        Ok(GroupCreated { group, dialog_id })
    }
}

pub struct CreateGroupHandler {
    participants: Participants,
    config: HandlerConfig,
    workflow: SagaHandle<CreateGroupWorkflow>,
}

impl CreateGroupHandler {
    pub fn new(participants: Participants, config: HandlerConfig) -> Result<Self, AppError> {
        let workflow = SagaCoordinator::register(CreateGroupWorkflow {
            groups: Arc::clone(&participants.groups),
            relations: Arc::clone(&participants.relations),
        })?;
        Ok(Self {
            participants,
            config,
            workflow,
        })
    }

    #[tracing::instrument(skip(self, cmd), fields(creator_id = %cmd.creator_id))]
    pub async fn handle(&self, cmd: CreateGroup) -> Result<GroupCreated, AppError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("group name must not be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation(format!(
                "group name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        ensure_distinct(&cmd.member_ids, "member_ids")?;
        if cmd.member_ids.contains(&cmd.creator_id) {
            return Err(AppError::validation("the creator cannot invite themselves"));
        }
        let capacity = cmd.kind.default_max_members();
        if cmd.member_ids.len() + 1 > capacity as usize {
            return Err(AppError::validation(format!(
                "a {:?} group holds at most {capacity} members",
                cmd.kind
            )));
        }

        let users = &self.participants.users;
        users.get_user(cmd.creator_id).await?;
        let found = users.get_users(&cmd.member_ids).await?;
        if let Some(missing) = cmd
            .member_ids
            .iter()
            .find(|id| !found.iter().any(|user| user.id == **id))
        {
            return Err(AppError::NotFound(format!("user {missing}")));
        }
        for member_id in &cmd.member_ids {
            ensure_mutual_friends(
                self.participants.relations.as_ref(),
                cmd.creator_id,
                *member_id,
            )
            .await?;
        }

        let mut group = Group::new(cmd.creator_id, name, cmd.kind);
        group.avatar = cmd.avatar;
        let global_id = GlobalId::new();
        let deadline = Deadline::after(self.config.request_timeout);
        let created = self
            .workflow
            .execute(
                global_id,
                deadline,
                NewGroup {
                    group,
                    member_ids: cmd.member_ids.clone(),
                },
            )
            .await?;
        tracing::info!(group_id = %created.group.id, %global_id, "group created");

        for member_id in cmd.member_ids {
            self.participants
                .notify(Notification {
                    recipient_id: member_id,
                    event: PushEvent::InvitedToGroup {
                        group_id: created.group.id,
                        inviter_id: cmd.creator_id,
                    },
                })
                .await;
        }
        Ok(created)
    }
}
