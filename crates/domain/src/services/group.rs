//! Group service adapter.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Deadline, GroupId};
use store::{Group, RetryPolicy, Table, create_with_retry};

use super::faults::{Fault, Faults};
use crate::error::AppError;

/// RPC surface of the group service, which owns the `groups` table.
#[async_trait]
pub trait GroupService: Send + Sync {
    /// Inserts a group, retrying transient write conflicts until `deadline`.
    async fn create_group(&self, group: Group, deadline: Deadline) -> Result<Group, AppError>;

    /// Undoes `create_group` by soft-deleting the row.
    async fn create_group_revert(&self, group_id: GroupId) -> Result<(), AppError>;

    async fn get_group(&self, group_id: GroupId) -> Result<Group, AppError>;

    async fn get_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>, AppError>;

    async fn delete_group(&self, group_id: GroupId) -> Result<(), AppError>;

    /// Undoes `delete_group`. Restoring a live group is a no-op.
    async fn delete_group_revert(&self, group_id: GroupId) -> Result<(), AppError>;

    async fn update_group(&self, group: Group) -> Result<Group, AppError>;
}

/// Group service running in-process over its own table.
#[derive(Clone)]
pub struct LocalGroupService {
    groups: Arc<dyn Table<Group>>,
    retry: RetryPolicy,
    faults: Faults,
}

impl LocalGroupService {
    pub fn new(groups: impl Table<Group> + 'static, retry: RetryPolicy) -> Self {
        Self {
            groups: Arc::new(groups),
            retry,
            faults: Faults::new("group"),
        }
    }

    /// Makes calls to `method` fail with `fault`, or succeed again with `None`.
    pub fn set_fail_on(&self, method: &'static str, fault: Option<Fault>) {
        self.faults.set(method, fault);
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }
}

impl std::fmt::Debug for LocalGroupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroupService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GroupService for LocalGroupService {
    #[tracing::instrument(skip(self, group, deadline), fields(creator_id = %group.creator_id))]
    async fn create_group(&self, group: Group, deadline: Deadline) -> Result<Group, AppError> {
        self.faults.check("create_group")?;
        let created = create_with_retry(self.groups.as_ref(), group, deadline, self.retry).await?;
        tracing::debug!(group_id = %created.id, "group created");
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn create_group_revert(&self, group_id: GroupId) -> Result<(), AppError> {
        self.faults.check("create_group_revert")?;
        self.groups.soft_delete(&[group_id]).await?;
        Ok(())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Group, AppError> {
        self.faults.check("get_group")?;
        Ok(self.groups.get(group_id).await?)
    }

    async fn get_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>, AppError> {
        self.faults.check("get_groups")?;
        Ok(self.groups.get_many(group_ids).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_group(&self, group_id: GroupId) -> Result<(), AppError> {
        self.faults.check("delete_group")?;
        self.groups.soft_delete(&[group_id]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_group_revert(&self, group_id: GroupId) -> Result<(), AppError> {
        self.faults.check("delete_group_revert")?;
        self.groups.restore(&[group_id]).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, group), fields(group_id = %group.id))]
    async fn update_group(&self, mut group: Group) -> Result<Group, AppError> {
        self.faults.check("update_group")?;
        group.updated_at = common::now_millis();
        Ok(self.groups.update(group).await?)
    }
}
