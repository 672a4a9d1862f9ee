use async_trait::async_trait;
use common::{GroupId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{Group, GroupKind, GroupStatus};
use crate::table::{Entity, Filter, Table};
use crate::{Result, StoreError};

/// SQLSTATE codes the store reports for transient write conflicts.
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const UNIQUE_VIOLATION: &str = "23505";

const GROUP_COLUMNS: &str =
    "id, kind, status, max_members, creator_id, name, avatar, created_at, updated_at, deleted_at";

/// Maps a driver error onto the store taxonomy.
///
/// Deadlocks and serialization failures become `WriteConflict`, which the
/// insert retry loop absorbs.
pub(crate) fn map_db_error(kind: &'static str, key: impl ToString, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some(DEADLOCK_DETECTED) | Some(SERIALIZATION_FAILURE) => {
                return StoreError::WriteConflict { kind };
            }
            Some(UNIQUE_VIOLATION) => {
                return StoreError::Duplicate {
                    kind,
                    key: key.to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

/// PostgreSQL-backed group table.
#[derive(Clone)]
pub struct PgGroupTable {
    pool: PgPool,
}

impl PgGroupTable {
    /// Creates a new group table over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_group(row: PgRow) -> Result<Group> {
        Ok(Group {
            id: GroupId::new(row.try_get("id")?),
            kind: GroupKind::from_i16(row.try_get("kind")?),
            status: GroupStatus::from_i16(row.try_get("status")?),
            max_members: row.try_get("max_members")?,
            creator_id: UserId::from_uuid(row.try_get::<Uuid, _>("creator_id")?),
            name: row.try_get("name")?,
            avatar: row.try_get("avatar")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

fn raw_ids(ids: &[GroupId]) -> Vec<i64> {
    ids.iter().map(GroupId::as_i64).collect()
}

#[async_trait]
impl Table<Group> for PgGroupTable {
    async fn insert(&self, group: Group) -> Result<Group> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO groups (kind, status, max_members, creator_id, name, avatar, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(group.kind.as_i16())
        .bind(group.status.as_i16())
        .bind(group.max_members)
        .bind(group.creator_id.as_uuid())
        .bind(&group.name)
        .bind(&group.avatar)
        .bind(group.created_at)
        .bind(group.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(Group::KIND, &group.name, e))?;

        Self::row_to_group(row)
    }

    async fn get(&self, id: GroupId) -> Result<Group> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1 AND deleted_at = 0"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_group(row),
            None => Err(StoreError::not_found(Group::KIND, id)),
        }
    }

    async fn get_many(&self, ids: &[GroupId]) -> Result<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = ANY($1) AND deleted_at = 0 ORDER BY id"
        ))
        .bind(raw_ids(ids))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_group).collect()
    }

    async fn update(&self, group: Group) -> Result<Group> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE groups
            SET kind = $2, status = $3, max_members = $4, name = $5, avatar = $6, updated_at = $7
            WHERE id = $1 AND deleted_at = 0
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(group.id.as_i64())
        .bind(group.kind.as_i16())
        .bind(group.status.as_i16())
        .bind(group.max_members)
        .bind(&group.name)
        .bind(&group.avatar)
        .bind(common::now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(Group::KIND, group.id, e))?;

        match row {
            Some(row) => Self::row_to_group(row),
            None => Err(StoreError::not_found(Group::KIND, group.id)),
        }
    }

    async fn soft_delete(&self, ids: &[GroupId]) -> Result<Vec<GroupId>> {
        let deleted: Vec<i64> = sqlx::query_scalar(
            "UPDATE groups SET deleted_at = $2 WHERE id = ANY($1) AND deleted_at = 0 RETURNING id",
        )
        .bind(raw_ids(ids))
        .bind(common::now_millis().max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error(Group::KIND, format!("{ids:?}"), e))?;

        Ok(deleted.into_iter().map(GroupId::new).collect())
    }

    async fn restore(&self, ids: &[GroupId]) -> Result<()> {
        let raw = raw_ids(ids);
        let mut tx = self.pool.begin().await?;

        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE id = ANY($1)")
            .bind(&raw)
            .fetch_all(&mut *tx)
            .await?;
        if let Some(missing) = raw.iter().find(|id| !known.contains(*id)) {
            return Err(StoreError::not_found(Group::KIND, missing));
        }

        sqlx::query("UPDATE groups SET deleted_at = 0 WHERE id = ANY($1) AND deleted_at <> 0")
            .bind(&raw)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(Group::KIND, format!("{ids:?}"), e))?;

        tx.commit().await?;
        Ok(())
    }

    async fn restore_matching(
        &self,
        ids: &[GroupId],
        filter: Filter<'_, Group>,
    ) -> Result<Vec<GroupId>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(raw_ids(ids))
        .fetch_all(&mut *tx)
        .await?;
        let mut matched = Vec::new();
        for row in rows {
            let group = Self::row_to_group(row)?;
            if filter(&group) {
                matched.push(group.id);
            }
        }

        sqlx::query("UPDATE groups SET deleted_at = 0 WHERE id = ANY($1) AND deleted_at <> 0")
            .bind(raw_ids(&matched))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(Group::KIND, format!("{matched:?}"), e))?;

        tx.commit().await?;
        Ok(matched)
    }

    async fn scan(&self, filter: Filter<'_, Group>) -> Result<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE deleted_at = 0 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let group = Self::row_to_group(row)?;
            if filter(&group) {
                groups.push(group);
            }
        }
        Ok(groups)
    }
}
