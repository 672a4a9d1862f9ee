//! Relation service adapter.
//!
//! The relation service owns group memberships, dialogs, dialog members,
//! friendships and friend requests. Each RPC is one local transaction on
//! the service side: a call that fails part-way leaves nothing behind.
//!
//! Friend requests and dialogs are read by id through the cache. Lookups
//! by group, dialog or user pair scan the table, so for those rows the
//! cache only ever sees invalidations.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, DialogId, GroupId, RequestId, RowId, UserId, now_millis};
use serde::{Deserialize, Serialize};
use store::{
    Cache, CacheConfig, CachedTable, Dialog, DialogKind, DialogUser, EntryMethod, Entity,
    FriendRequest, GroupIdentity, GroupRelation, InMemoryTable, RelationStatus, RequestStatus,
    RetryPolicy, StoreError, Table, UserRelation, create_with_retry,
};

use super::faults::{Fault, Faults};
use crate::error::AppError;

/// Membership rows to create for a new group.
#[derive(Debug, Clone)]
pub struct GroupInvitation {
    pub group_id: GroupId,
    pub owner_id: UserId,
    pub member_ids: Vec<UserId>,
}

/// Rows created by `create_group_and_invite_users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub dialog_id: DialogId,
    pub relation_ids: Vec<RowId>,
    pub dialog_user_ids: Vec<RowId>,
}

/// Rows created by `add_friend`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub dialog_id: DialogId,
    pub relation_ids: Vec<RowId>,
    pub dialog_user_ids: Vec<RowId>,
}

/// Rows soft-deleted by `delete_friend`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRemoval {
    pub dialog_id: DialogId,
    pub relation_ids: Vec<RowId>,
    pub dialog_user_ids: Vec<RowId>,
}

/// RPC surface of the relation service.
///
/// Every mutating call has a `_revert` counterpart taking the forward call's
/// inputs plus the row ids it reported, so a compensation touches exactly
/// the rows its forward action touched. Reverts are idempotent.
#[async_trait]
pub trait RelationService: Send + Sync {
    // Groups.

    /// Creates the group's dialog, a dialog member per user and a group
    /// relation per user, the owner first.
    async fn create_group_and_invite_users(
        &self,
        invitation: GroupInvitation,
        deadline: Deadline,
    ) -> Result<GroupMembership, AppError>;

    async fn create_group_and_invite_users_revert(
        &self,
        group_id: GroupId,
        membership: &GroupMembership,
    ) -> Result<(), AppError>;

    async fn get_group_relation(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<GroupRelation, AppError>;

    async fn get_group_members(&self, group_id: GroupId) -> Result<Vec<GroupRelation>, AppError>;

    async fn get_group_dialog(&self, group_id: GroupId) -> Result<Dialog, AppError>;

    async fn delete_dialog_users_by_dialog(
        &self,
        dialog_id: DialogId,
    ) -> Result<Vec<RowId>, AppError>;

    async fn delete_dialog_users_by_dialog_revert(
        &self,
        dialog_id: DialogId,
        deleted: &[RowId],
    ) -> Result<(), AppError>;

    async fn delete_dialog(&self, dialog_id: DialogId) -> Result<(), AppError>;

    async fn delete_dialog_revert(&self, dialog_id: DialogId) -> Result<(), AppError>;

    async fn delete_group_relations_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<RowId>, AppError>;

    async fn delete_group_relations_by_group_revert(
        &self,
        group_id: GroupId,
        deleted: &[RowId],
    ) -> Result<(), AppError>;

    async fn remove_group_members(
        &self,
        group_id: GroupId,
        user_ids: &[UserId],
    ) -> Result<Vec<RowId>, AppError>;

    async fn remove_group_members_revert(
        &self,
        group_id: GroupId,
        removed: &[RowId],
    ) -> Result<(), AppError>;

    async fn remove_dialog_users(
        &self,
        dialog_id: DialogId,
        user_ids: &[UserId],
    ) -> Result<Vec<RowId>, AppError>;

    async fn remove_dialog_users_revert(
        &self,
        dialog_id: DialogId,
        removed: &[RowId],
    ) -> Result<(), AppError>;

    // Friends.

    /// The relation row `user_id -> friend_id`.
    async fn get_user_relation(
        &self,
        user_id: UserId,
        friend_id: UserId,
    ) -> Result<UserRelation, AppError>;

    /// Every live relation row owned by `user_id`, blocked ones included.
    async fn get_friends(&self, user_id: UserId) -> Result<Vec<UserRelation>, AppError>;

    async fn set_user_relation_status(
        &self,
        user_id: UserId,
        friend_id: UserId,
        status: RelationStatus,
    ) -> Result<UserRelation, AppError>;

    /// Removes the friendship in both directions along with both users'
    /// membership of the private dialog.
    async fn delete_friend(
        &self,
        user_id: UserId,
        friend_id: UserId,
    ) -> Result<FriendRemoval, AppError>;

    async fn delete_friend_revert(&self, removal: &FriendRemoval) -> Result<(), AppError>;

    /// Creates a private dialog for the pair and a relation row in each
    /// direction.
    async fn add_friend(
        &self,
        user_id: UserId,
        friend_id: UserId,
        deadline: Deadline,
    ) -> Result<Friendship, AppError>;

    async fn add_friend_revert(&self, friendship: &Friendship) -> Result<(), AppError>;

    async fn send_friend_request(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        remark: String,
        deadline: Deadline,
    ) -> Result<FriendRequest, AppError>;

    async fn get_friend_request(&self, request_id: RequestId) -> Result<FriendRequest, AppError>;

    /// Pending requests addressed to `receiver_id`, oldest first.
    async fn get_pending_friend_requests(
        &self,
        receiver_id: UserId,
    ) -> Result<Vec<FriendRequest>, AppError>;

    /// Resolves a pending request. Fails with `Conflict` if it is not pending.
    async fn set_friend_request_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<FriendRequest, AppError>;

    /// Puts a resolved request back to pending.
    async fn set_friend_request_status_revert(&self, request_id: RequestId)
    -> Result<(), AppError>;
}

/// The relation service's tables, before caching.
#[derive(Debug, Clone, Default)]
pub struct RelationTables {
    pub group_relations: InMemoryTable<GroupRelation>,
    pub dialogs: InMemoryTable<Dialog>,
    pub dialog_users: InMemoryTable<DialogUser>,
    pub user_relations: InMemoryTable<UserRelation>,
    pub friend_requests: InMemoryTable<FriendRequest>,
}

impl RelationTables {
    pub fn new() -> Self {
        Self::default()
    }
}

type Shared<E> = Arc<dyn Table<E>>;

fn cached<E: Entity, C: Cache + Clone + 'static>(
    table: InMemoryTable<E>,
    cache: &C,
    config: CacheConfig,
) -> Shared<E> {
    Arc::new(CachedTable::new(table, cache.clone(), config))
}

/// Best-effort local rollback of rows written earlier in the same call.
async fn discard<E: Entity>(table: &dyn Table<E>, ids: &[E::Id]) {
    if ids.is_empty() {
        return;
    }
    if let Err(e) = table.soft_delete(ids).await {
        tracing::warn!(entity = E::KIND, error = %e, "local rollback failed");
    }
}

async fn reinstate<E: Entity>(table: &dyn Table<E>, ids: &[E::Id]) {
    if ids.is_empty() {
        return;
    }
    if let Err(e) = table.restore(ids).await {
        tracing::warn!(entity = E::KIND, error = %e, "local rollback failed");
    }
}

/// Reports revert ids that belong to another group or dialog and were left alone.
fn log_skipped<E: Entity>(requested: &[E::Id], restored: &[E::Id]) {
    let skipped: Vec<E::Id> = requested
        .iter()
        .filter(|id| !restored.contains(*id))
        .copied()
        .collect();
    if !skipped.is_empty() {
        tracing::warn!(entity = E::KIND, ?skipped, "revert skipped rows it does not own");
    }
}

fn dialog_user(dialog_id: DialogId, user_id: UserId, now: i64) -> DialogUser {
    DialogUser {
        id: RowId::default(),
        dialog_id,
        user_id,
        created_at: now,
        updated_at: now,
        deleted_at: 0,
    }
}

fn user_relation(user_id: UserId, friend_id: UserId, dialog_id: DialogId, now: i64) -> UserRelation {
    UserRelation {
        id: RowId::default(),
        user_id,
        friend_id,
        status: RelationStatus::Normal,
        dialog_id,
        remark: String::new(),
        created_at: now,
        updated_at: now,
        deleted_at: 0,
    }
}

/// Relation service running in-process over cached in-memory tables.
#[derive(Clone)]
pub struct LocalRelationService {
    group_relations: Shared<GroupRelation>,
    dialogs: Shared<Dialog>,
    dialog_users: Shared<DialogUser>,
    user_relations: Shared<UserRelation>,
    friend_requests: Shared<FriendRequest>,
    retry: RetryPolicy,
    faults: Faults,
}

impl LocalRelationService {
    pub fn new<C: Cache + Clone + 'static>(
        tables: RelationTables,
        cache: C,
        cache_config: CacheConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            group_relations: cached(tables.group_relations, &cache, cache_config),
            dialogs: cached(tables.dialogs, &cache, cache_config),
            dialog_users: cached(tables.dialog_users, &cache, cache_config),
            user_relations: cached(tables.user_relations, &cache, cache_config),
            friend_requests: cached(tables.friend_requests, &cache, cache_config),
            retry,
            faults: Faults::new("relation"),
        }
    }

    /// Makes calls to `method` fail with `fault`, or succeed again with `None`.
    pub fn set_fail_on(&self, method: &'static str, fault: Option<Fault>) {
        self.faults.set(method, fault);
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    async fn insert<E: Entity>(
        &self,
        table: &dyn Table<E>,
        row: E,
        deadline: Deadline,
    ) -> Result<E, AppError> {
        Ok(create_with_retry(table, row, deadline, self.retry).await?)
    }

    async fn write_group_membership(
        &self,
        invitation: &GroupInvitation,
        deadline: Deadline,
        created: &mut GroupMembership,
    ) -> Result<(), AppError> {
        let now = now_millis();
        let dialog = Dialog {
            id: DialogId::default(),
            kind: DialogKind::Group,
            owner_id: invitation.owner_id,
            group_id: Some(invitation.group_id),
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        };
        created.dialog_id = self.insert(self.dialogs.as_ref(), dialog, deadline).await?.id;

        let members = std::iter::once((invitation.owner_id, GroupIdentity::Owner)).chain(
            invitation
                .member_ids
                .iter()
                .map(|id| (*id, GroupIdentity::Member)),
        );
        for (user_id, identity) in members {
            let row = dialog_user(created.dialog_id, user_id, now);
            let row = self.insert(self.dialog_users.as_ref(), row, deadline).await?;
            created.dialog_user_ids.push(row.id);

            let relation = GroupRelation {
                id: RowId::default(),
                group_id: invitation.group_id,
                user_id,
                identity,
                entry_method: EntryMethod::Invitation,
                inviter_id: (identity != GroupIdentity::Owner).then_some(invitation.owner_id),
                joined_at: now,
                updated_at: now,
                deleted_at: 0,
            };
            let relation = self
                .insert(self.group_relations.as_ref(), relation, deadline)
                .await?;
            created.relation_ids.push(relation.id);
        }
        Ok(())
    }

    async fn write_friendship(
        &self,
        user_id: UserId,
        friend_id: UserId,
        deadline: Deadline,
        created: &mut Friendship,
    ) -> Result<(), AppError> {
        let now = now_millis();
        let dialog = Dialog {
            id: DialogId::default(),
            kind: DialogKind::User,
            owner_id: user_id,
            group_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        };
        created.dialog_id = self.insert(self.dialogs.as_ref(), dialog, deadline).await?.id;

        for (owner, other) in [(user_id, friend_id), (friend_id, user_id)] {
            let relation = user_relation(owner, other, created.dialog_id, now);
            let relation = self
                .insert(self.user_relations.as_ref(), relation, deadline)
                .await?;
            created.relation_ids.push(relation.id);

            let member = dialog_user(created.dialog_id, owner, now);
            let member = self.insert(self.dialog_users.as_ref(), member, deadline).await?;
            created.dialog_user_ids.push(member.id);
        }
        Ok(())
    }

    async fn discard_rows(&self, dialog_id: DialogId, relations: &[RowId], members: &[RowId]) {
        discard(self.dialog_users.as_ref(), members).await;
        if dialog_id != DialogId::default() {
            discard(self.dialogs.as_ref(), &[dialog_id]).await;
        }
        discard(self.group_relations.as_ref(), relations).await;
    }
}

impl std::fmt::Debug for LocalRelationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRelationService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RelationService for LocalRelationService {
    #[tracing::instrument(skip(self, invitation, deadline), fields(group_id = %invitation.group_id))]
    async fn create_group_and_invite_users(
        &self,
        invitation: GroupInvitation,
        deadline: Deadline,
    ) -> Result<GroupMembership, AppError> {
        self.faults.check("create_group_and_invite_users")?;
        let mut created = GroupMembership::default();
        match self
            .write_group_membership(&invitation, deadline, &mut created)
            .await
        {
            Ok(()) => Ok(created),
            Err(e) => {
                self.discard_rows(
                    created.dialog_id,
                    &created.relation_ids,
                    &created.dialog_user_ids,
                )
                .await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, membership), fields(dialog_id = %membership.dialog_id))]
    async fn create_group_and_invite_users_revert(
        &self,
        group_id: GroupId,
        membership: &GroupMembership,
    ) -> Result<(), AppError> {
        self.faults.check("create_group_and_invite_users_revert")?;
        let relations: Vec<RowId> = self
            .group_relations
            .scan(&|r: &GroupRelation| {
                r.group_id == group_id && membership.relation_ids.contains(&r.id)
            })
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        self.group_relations.soft_delete(&relations).await?;

        let dialog = match self.dialogs.get(membership.dialog_id).await {
            Ok(dialog) => Some(dialog),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(dialog) = dialog.filter(|d| d.group_id == Some(group_id)) {
            let members: Vec<RowId> = self
                .dialog_users
                .scan(&|u: &DialogUser| {
                    u.dialog_id == dialog.id && membership.dialog_user_ids.contains(&u.id)
                })
                .await?
                .iter()
                .map(|u| u.id)
                .collect();
            self.dialog_users.soft_delete(&members).await?;
            self.dialogs.soft_delete(&[dialog.id]).await?;
        }
        Ok(())
    }

    async fn get_group_relation(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<GroupRelation, AppError> {
        self.faults.check("get_group_relation")?;
        self.group_relations
            .scan(&|r: &GroupRelation| r.group_id == group_id && r.user_id == user_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} in group {group_id}")))
    }

    async fn get_group_members(&self, group_id: GroupId) -> Result<Vec<GroupRelation>, AppError> {
        self.faults.check("get_group_members")?;
        Ok(self
            .group_relations
            .scan(&|r: &GroupRelation| r.group_id == group_id)
            .await?)
    }

    async fn get_group_dialog(&self, group_id: GroupId) -> Result<Dialog, AppError> {
        self.faults.check("get_group_dialog")?;
        self.dialogs
            .scan(&|d: &Dialog| d.group_id == Some(group_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("dialog of group {group_id}")))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_dialog_users_by_dialog(
        &self,
        dialog_id: DialogId,
    ) -> Result<Vec<RowId>, AppError> {
        self.faults.check("delete_dialog_users_by_dialog")?;
        let ids: Vec<RowId> = self
            .dialog_users
            .scan(&|u: &DialogUser| u.dialog_id == dialog_id)
            .await?
            .iter()
            .map(|u| u.id)
            .collect();
        Ok(self.dialog_users.soft_delete(&ids).await?)
    }

    #[tracing::instrument(skip(self, deleted))]
    async fn delete_dialog_users_by_dialog_revert(
        &self,
        dialog_id: DialogId,
        deleted: &[RowId],
    ) -> Result<(), AppError> {
        self.faults.check("delete_dialog_users_by_dialog_revert")?;
        let restored = self
            .dialog_users
            .restore_matching(deleted, &|row: &DialogUser| row.dialog_id == dialog_id)
            .await?;
        log_skipped::<DialogUser>(deleted, &restored);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_dialog(&self, dialog_id: DialogId) -> Result<(), AppError> {
        self.faults.check("delete_dialog")?;
        self.dialogs.soft_delete(&[dialog_id]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_dialog_revert(&self, dialog_id: DialogId) -> Result<(), AppError> {
        self.faults.check("delete_dialog_revert")?;
        Ok(self.dialogs.restore(&[dialog_id]).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_group_relations_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<RowId>, AppError> {
        self.faults.check("delete_group_relations_by_group")?;
        let ids: Vec<RowId> = self
            .group_relations
            .scan(&|r: &GroupRelation| r.group_id == group_id)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        Ok(self.group_relations.soft_delete(&ids).await?)
    }

    #[tracing::instrument(skip(self, deleted))]
    async fn delete_group_relations_by_group_revert(
        &self,
        group_id: GroupId,
        deleted: &[RowId],
    ) -> Result<(), AppError> {
        self.faults.check("delete_group_relations_by_group_revert")?;
        let restored = self
            .group_relations
            .restore_matching(deleted, &|row: &GroupRelation| row.group_id == group_id)
            .await?;
        log_skipped::<GroupRelation>(deleted, &restored);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_group_members(
        &self,
        group_id: GroupId,
        user_ids: &[UserId],
    ) -> Result<Vec<RowId>, AppError> {
        self.faults.check("remove_group_members")?;
        let ids: Vec<RowId> = self
            .group_relations
            .scan(&|r: &GroupRelation| r.group_id == group_id && user_ids.contains(&r.user_id))
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        Ok(self.group_relations.soft_delete(&ids).await?)
    }

    #[tracing::instrument(skip(self, removed))]
    async fn remove_group_members_revert(
        &self,
        group_id: GroupId,
        removed: &[RowId],
    ) -> Result<(), AppError> {
        self.faults.check("remove_group_members_revert")?;
        let restored = self
            .group_relations
            .restore_matching(removed, &|row: &GroupRelation| row.group_id == group_id)
            .await?;
        log_skipped::<GroupRelation>(removed, &restored);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_dialog_users(
        &self,
        dialog_id: DialogId,
        user_ids: &[UserId],
    ) -> Result<Vec<RowId>, AppError> {
        self.faults.check("remove_dialog_users")?;
        let ids: Vec<RowId> = self
            .dialog_users
            .scan(&|u: &DialogUser| u.dialog_id == dialog_id && user_ids.contains(&u.user_id))
            .await?
            .iter()
            .map(|u| u.id)
            .collect();
        Ok(self.dialog_users.soft_delete(&ids).await?)
    }

    #[tracing::instrument(skip(self, removed))]
    async fn remove_dialog_users_revert(
        &self,
        dialog_id: DialogId,
        removed: &[RowId],
    ) -> Result<(), AppError> {
        self.faults.check("remove_dialog_users_revert")?;
        let restored = self
            .dialog_users
            .restore_matching(removed, &|row: &DialogUser| row.dialog_id == dialog_id)
            .await?;
        log_skipped::<DialogUser>(removed, &restored);
        Ok(())
    }

    async fn get_user_relation(
        &self,
        user_id: UserId,
        friend_id: UserId,
    ) -> Result<UserRelation, AppError> {
        self.faults.check("get_user_relation")?;
        self.user_relations
            .scan(&|r: &UserRelation| r.user_id == user_id && r.friend_id == friend_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("relation {user_id} -> {friend_id}")))
    }

    async fn get_friends(&self, user_id: UserId) -> Result<Vec<UserRelation>, AppError> {
        self.faults.check("get_friends")?;
        Ok(self
            .user_relations
            .scan(&|r: &UserRelation| r.user_id == user_id)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn set_user_relation_status(
        &self,
        user_id: UserId,
        friend_id: UserId,
        status: RelationStatus,
    ) -> Result<UserRelation, AppError> {
        self.faults.check("set_user_relation_status")?;
        let mut relation = self.get_user_relation(user_id, friend_id).await?;
        relation.status = status;
        Ok(self.user_relations.update(relation).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_friend(
        &self,
        user_id: UserId,
        friend_id: UserId,
    ) -> Result<FriendRemoval, AppError> {
        self.faults.check("delete_friend")?;
        let pair = [user_id, friend_id];
        let relations = self
            .user_relations
            .scan(&|r: &UserRelation| {
                (r.user_id == user_id && r.friend_id == friend_id)
                    || (r.user_id == friend_id && r.friend_id == user_id)
            })
            .await?;
        let Some(dialog_id) = relations.first().map(|r| r.dialog_id) else {
            return Err(AppError::NotFound(format!("relation {user_id} -> {friend_id}")));
        };
        let members: Vec<RowId> = self
            .dialog_users
            .scan(&|u: &DialogUser| u.dialog_id == dialog_id && pair.contains(&u.user_id))
            .await?
            .iter()
            .map(|u| u.id)
            .collect();

        let ids: Vec<RowId> = relations.iter().map(|r| r.id).collect();
        let relation_ids = self.user_relations.soft_delete(&ids).await?;
        let dialog_user_ids = match self.dialog_users.soft_delete(&members).await {
            Ok(ids) => ids,
            Err(e) => {
                reinstate(self.user_relations.as_ref(), &relation_ids).await;
                return Err(e.into());
            }
        };
        Ok(FriendRemoval {
            dialog_id,
            relation_ids,
            dialog_user_ids,
        })
    }

    #[tracing::instrument(skip(self, removal), fields(dialog_id = %removal.dialog_id))]
    async fn delete_friend_revert(&self, removal: &FriendRemoval) -> Result<(), AppError> {
        self.faults.check("delete_friend_revert")?;
        self.user_relations.restore(&removal.relation_ids).await?;
        self.dialog_users.restore(&removal.dialog_user_ids).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, deadline))]
    async fn add_friend(
        &self,
        user_id: UserId,
        friend_id: UserId,
        deadline: Deadline,
    ) -> Result<Friendship, AppError> {
        self.faults.check("add_friend")?;
        let mut created = Friendship::default();
        match self
            .write_friendship(user_id, friend_id, deadline, &mut created)
            .await
        {
            Ok(()) => Ok(created),
            Err(e) => {
                discard(self.user_relations.as_ref(), &created.relation_ids).await;
                self.discard_rows(created.dialog_id, &[], &created.dialog_user_ids)
                    .await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, friendship), fields(dialog_id = %friendship.dialog_id))]
    async fn add_friend_revert(&self, friendship: &Friendship) -> Result<(), AppError> {
        self.faults.check("add_friend_revert")?;
        self.user_relations
            .soft_delete(&friendship.relation_ids)
            .await?;
        self.dialog_users
            .soft_delete(&friendship.dialog_user_ids)
            .await?;
        self.dialogs.soft_delete(&[friendship.dialog_id]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, remark, deadline))]
    async fn send_friend_request(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        remark: String,
        deadline: Deadline,
    ) -> Result<FriendRequest, AppError> {
        self.faults.check("send_friend_request")?;
        let now = now_millis();
        let request = FriendRequest {
            id: RequestId::default(),
            sender_id,
            receiver_id,
            remark,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: 0,
        };
        self.insert(self.friend_requests.as_ref(), request, deadline)
            .await
    }

    async fn get_friend_request(&self, request_id: RequestId) -> Result<FriendRequest, AppError> {
        self.faults.check("get_friend_request")?;
        Ok(self.friend_requests.get(request_id).await?)
    }

    async fn get_pending_friend_requests(
        &self,
        receiver_id: UserId,
    ) -> Result<Vec<FriendRequest>, AppError> {
        self.faults.check("get_pending_friend_requests")?;
        Ok(self
            .friend_requests
            .scan(&|r: &FriendRequest| {
                r.receiver_id == receiver_id && r.status == RequestStatus::Pending
            })
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn set_friend_request_status(
        &self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<FriendRequest, AppError> {
        self.faults.check("set_friend_request_status")?;
        let mut request = self.friend_requests.get(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(AppError::conflict(format!(
                "friend request {request_id} is already {:?}",
                request.status
            )));
        }
        request.status = status;
        Ok(self.friend_requests.update(request).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn set_friend_request_status_revert(
        &self,
        request_id: RequestId,
    ) -> Result<(), AppError> {
        self.faults.check("set_friend_request_status_revert")?;
        let mut request = self.friend_requests.get(request_id).await?;
        if request.status != RequestStatus::Pending {
            request.status = RequestStatus::Pending;
            self.friend_requests.update(request).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use store::InMemoryCache;

    fn service() -> (LocalRelationService, RelationTables) {
        let tables = RelationTables::new();
        let service = LocalRelationService::new(
            tables.clone(),
            InMemoryCache::new(),
            CacheConfig::default(),
            RetryPolicy::default(),
        );
        (service, tables)
    }

    fn invitation(owner: UserId, members: &[UserId]) -> GroupInvitation {
        GroupInvitation {
            group_id: GroupId::new(7),
            owner_id: owner,
            member_ids: members.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_create_group_membership() {
        let (service, _) = service();
        let owner = UserId::new();
        let members = [UserId::new(), UserId::new()];

        let membership = service
            .create_group_and_invite_users(invitation(owner, &members), Deadline::none())
            .await
            .unwrap();
        assert_eq!(membership.relation_ids.len(), 3);
        assert_eq!(membership.dialog_user_ids.len(), 3);

        let owner_row = service
            .get_group_relation(GroupId::new(7), owner)
            .await
            .unwrap();
        assert_eq!(owner_row.identity, GroupIdentity::Owner);
        assert_eq!(owner_row.inviter_id, None);

        let member_row = service
            .get_group_relation(GroupId::new(7), members[0])
            .await
            .unwrap();
        assert_eq!(member_row.identity, GroupIdentity::Member);
        assert_eq!(member_row.inviter_id, Some(owner));

        let dialog = service.get_group_dialog(GroupId::new(7)).await.unwrap();
        assert_eq!(dialog.id, membership.dialog_id);
        assert_eq!(dialog.kind, DialogKind::Group);
    }

    #[tokio::test]
    async fn test_failed_membership_leaves_nothing_live() {
        let (service, tables) = service();
        let owner = UserId::new();
        let member = UserId::new();
        tables
            .group_relations
            .fail_next(store::TableOp::Insert)
            .await;

        let err = service
            .create_group_and_invite_users(invitation(owner, &[member]), Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let dialog = service.get_group_dialog(GroupId::new(7)).await;
        assert!(dialog.is_err());
        assert!(
            service
                .get_group_members(GroupId::new(7))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_dialog_user_delete_and_revert() {
        let (service, tables) = service();
        let membership = service
            .create_group_and_invite_users(
                invitation(UserId::new(), &[UserId::new()]),
                Deadline::none(),
            )
            .await
            .unwrap();

        let deleted = service
            .delete_dialog_users_by_dialog(membership.dialog_id)
            .await
            .unwrap();
        assert_eq!(deleted, membership.dialog_user_ids);
        for id in &deleted {
            assert!(tables.dialog_users.get_raw(*id).await.unwrap().deleted_at > 0);
        }

        service
            .delete_dialog_users_by_dialog_revert(membership.dialog_id, &deleted)
            .await
            .unwrap();
        service
            .delete_dialog_users_by_dialog_revert(membership.dialog_id, &deleted)
            .await
            .unwrap();
        for id in &deleted {
            assert_eq!(tables.dialog_users.get_raw(*id).await.unwrap().deleted_at, 0);
        }
    }

    #[tokio::test]
    async fn test_revert_ignores_rows_of_another_group() {
        let (service, tables) = service();
        let group_a = GroupId::new(1);
        let group_b = GroupId::new(2);
        for group_id in [group_a, group_b] {
            let invitation = GroupInvitation {
                group_id,
                owner_id: UserId::new(),
                member_ids: vec![UserId::new()],
            };
            service
                .create_group_and_invite_users(invitation, Deadline::none())
                .await
                .unwrap();
        }

        let deleted_b = service
            .delete_group_relations_by_group(group_b)
            .await
            .unwrap();
        assert_eq!(deleted_b.len(), 2);

        service
            .delete_group_relations_by_group_revert(group_a, &deleted_b)
            .await
            .unwrap();
        assert!(service.get_group_members(group_b).await.unwrap().is_empty());
        for id in &deleted_b {
            assert!(tables.group_relations.get_raw(*id).await.unwrap().deleted_at > 0);
        }

        service
            .delete_group_relations_by_group_revert(group_b, &deleted_b)
            .await
            .unwrap();
        assert_eq!(service.get_group_members(group_b).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dialog_user_revert_ignores_other_dialogs() {
        let (service, tables) = service();
        let first = service
            .create_group_and_invite_users(
                invitation(UserId::new(), &[UserId::new()]),
                Deadline::none(),
            )
            .await
            .unwrap();
        let second = service
            .create_group_and_invite_users(
                GroupInvitation {
                    group_id: GroupId::new(8),
                    owner_id: UserId::new(),
                    member_ids: vec![],
                },
                Deadline::none(),
            )
            .await
            .unwrap();

        let removed = service
            .delete_dialog_users_by_dialog(first.dialog_id)
            .await
            .unwrap();
        service
            .delete_dialog_users_by_dialog_revert(second.dialog_id, &removed)
            .await
            .unwrap();
        service
            .remove_dialog_users_revert(second.dialog_id, &removed)
            .await
            .unwrap();
        for id in &removed {
            assert!(tables.dialog_users.get_raw(*id).await.unwrap().deleted_at > 0);
        }
    }

    #[tokio::test]
    async fn test_membership_revert_leaves_other_group_intact() {
        let (service, tables) = service();
        let membership = service
            .create_group_and_invite_users(
                invitation(UserId::new(), &[UserId::new()]),
                Deadline::none(),
            )
            .await
            .unwrap();

        service
            .create_group_and_invite_users_revert(GroupId::new(99), &membership)
            .await
            .unwrap();
        assert_eq!(service.get_group_members(GroupId::new(7)).await.unwrap().len(), 2);
        assert!(service.get_group_dialog(GroupId::new(7)).await.is_ok());

        service
            .create_group_and_invite_users_revert(GroupId::new(7), &membership)
            .await
            .unwrap();
        assert!(service.get_group_members(GroupId::new(7)).await.unwrap().is_empty());
        assert!(service.get_group_dialog(GroupId::new(7)).await.is_err());
        for id in &membership.dialog_user_ids {
            assert!(tables.dialog_users.get_raw(*id).await.unwrap().deleted_at > 0);
        }
    }

    #[tokio::test]
    async fn test_add_and_delete_friend() {
        let (service, _) = service();
        let alice = UserId::new();
        let bob = UserId::new();

        let friendship = service.add_friend(alice, bob, Deadline::none()).await.unwrap();
        let forward = service.get_user_relation(alice, bob).await.unwrap();
        let backward = service.get_user_relation(bob, alice).await.unwrap();
        assert_eq!(forward.dialog_id, friendship.dialog_id);
        assert_eq!(backward.dialog_id, friendship.dialog_id);

        let removal = service.delete_friend(alice, bob).await.unwrap();
        assert_eq!(removal.relation_ids.len(), 2);
        assert_eq!(removal.dialog_user_ids.len(), 2);
        assert!(service.get_user_relation(alice, bob).await.is_err());

        service.delete_friend_revert(&removal).await.unwrap();
        assert!(service.get_user_relation(bob, alice).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_friend_twice_conflicts() {
        let (service, _) = service();
        let alice = UserId::new();
        let bob = UserId::new();
        service.add_friend(alice, bob, Deadline::none()).await.unwrap();

        let err = service
            .add_friend(alice, bob, Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(service.get_friends(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_friend_request_status_transitions() {
        let (service, _) = service();
        let request = service
            .send_friend_request(UserId::new(), UserId::new(), "hi".into(), Deadline::none())
            .await
            .unwrap();

        service
            .set_friend_request_status(request.id, RequestStatus::Accepted)
            .await
            .unwrap();
        let err = service
            .set_friend_request_status(request.id, RequestStatus::Rejected)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        service
            .set_friend_request_status_revert(request.id)
            .await
            .unwrap();
        let reverted = service.get_friend_request(request.id).await.unwrap();
        assert_eq!(reverted.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_friend_request_reads_go_through_cache() {
        let cache = InMemoryCache::new();
        let service = LocalRelationService::new(
            RelationTables::new(),
            cache.clone(),
            CacheConfig::default(),
            RetryPolicy::default(),
        );
        let request = service
            .send_friend_request(UserId::new(), UserId::new(), String::new(), Deadline::none())
            .await
            .unwrap();
        let key = FriendRequest::cache_key(request.id);
        assert!(!cache.contains(&key).await);

        service.get_friend_request(request.id).await.unwrap();
        assert!(cache.contains(&key).await);

        service
            .set_friend_request_status(request.id, RequestStatus::Rejected)
            .await
            .unwrap();
        assert!(!cache.contains(&key).await);
        let reloaded = service.get_friend_request(request.id).await.unwrap();
        assert_eq!(reloaded.status, RequestStatus::Rejected);
    }

    #[tokio::test]
    async fn test_timeout_fault() {
        let (service, _) = service();
        service.set_fail_on("delete_dialog", Some(Fault::Timeout));
        let err = service.delete_dialog(DialogId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                service: "relation",
                method: "delete_dialog"
            }
        ));

        service.clear_faults();
        assert!(service.delete_dialog(DialogId::new(1)).await.is_ok());
    }
}
