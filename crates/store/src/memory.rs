//! In-memory participant table with fault injection.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::table::{Entity, Filter, Table};
use crate::{Result, StoreError};

/// Operations of a [`Table`], used to target fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOp {
    Insert,
    Get,
    Update,
    SoftDelete,
    Restore,
    Scan,
}

#[derive(Debug)]
struct TableState<E: Entity> {
    rows: BTreeMap<E::Id, E>,
    next_id: i64,
    pending_conflicts: usize,
    fail_next: HashSet<TableOp>,
}

impl<E: Entity> Default for TableState<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 0,
            pending_conflicts: 0,
            fail_next: HashSet::new(),
        }
    }
}

impl<E: Entity> TableState<E> {
    fn take_failure(&mut self, op: TableOp) -> Result<()> {
        if self.fail_next.remove(&op) {
            return Err(StoreError::Unavailable(format!(
                "{} {:?} failed (injected)",
                E::KIND,
                op
            )));
        }
        Ok(())
    }
}

/// In-memory participant table.
///
/// Behaves like a relational table with an auto-increment key and a
/// soft-delete marker, and can be told to fail in the ways the real store
/// does.
#[derive(Debug, Clone)]
pub struct InMemoryTable<E: Entity> {
    state: Arc<RwLock<TableState<E>>>,
}

impl<E: Entity> Default for InMemoryTable<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(TableState::default())),
        }
    }
}

impl<E: Entity> InMemoryTable<E> {
    /// Creates a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` inserts fail with a transient write conflict.
    pub async fn inject_write_conflicts(&self, count: usize) {
        self.state.write().await.pending_conflicts = count;
    }

    /// Makes the next call of `op` fail with `Unavailable`.
    pub async fn fail_next(&self, op: TableOp) {
        self.state.write().await.fail_next.insert(op);
    }

    /// Total number of rows, including soft-deleted ones.
    pub async fn row_count(&self) -> usize {
        self.state.read().await.rows.len()
    }

    /// Loads a row regardless of its soft-delete marker.
    pub async fn get_raw(&self, id: E::Id) -> Option<E> {
        self.state.read().await.rows.get(&id).cloned()
    }
}

#[async_trait]
impl<E: Entity> Table<E> for InMemoryTable<E> {
    async fn insert(&self, mut entity: E) -> Result<E> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Insert)?;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(StoreError::WriteConflict { kind: E::KIND });
        }

        if let Some(key) = entity.unique_key()
            && state
                .rows
                .values()
                .any(|row| row.is_live() && row.unique_key().as_deref() == Some(key.as_str()))
        {
            return Err(StoreError::Duplicate { kind: E::KIND, key });
        }

        state.next_id += 1;
        entity.set_id(E::Id::from(state.next_id));
        entity.set_deleted_at(0);
        state.rows.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: E::Id) -> Result<E> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Get)?;
        state
            .rows
            .get(&id)
            .filter(|row| row.is_live())
            .cloned()
            .ok_or_else(|| StoreError::not_found(E::KIND, id))
    }

    async fn get_many(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Get)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.rows.get(id))
            .filter(|row| row.is_live())
            .cloned()
            .collect())
    }

    async fn update(&self, mut entity: E) -> Result<E> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Update)?;
        let id = entity.id();
        match state.rows.get_mut(&id) {
            Some(row) if row.is_live() => {
                entity.set_deleted_at(0);
                entity.touch(common::now_millis());
                *row = entity.clone();
                Ok(entity)
            }
            _ => Err(StoreError::not_found(E::KIND, id)),
        }
    }

    async fn soft_delete(&self, ids: &[E::Id]) -> Result<Vec<E::Id>> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::SoftDelete)?;
        let now = common::now_millis().max(1);
        let mut deleted = Vec::new();
        for id in ids {
            if let Some(row) = state.rows.get_mut(id)
                && row.is_live()
            {
                row.set_deleted_at(now);
                deleted.push(*id);
            }
        }
        Ok(deleted)
    }

    async fn restore(&self, ids: &[E::Id]) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Restore)?;
        if let Some(missing) = ids.iter().find(|id| !state.rows.contains_key(id)) {
            return Err(StoreError::not_found(E::KIND, missing));
        }
        for id in ids {
            if let Some(row) = state.rows.get_mut(id) {
                row.set_deleted_at(0);
            }
        }
        Ok(())
    }

    async fn restore_matching(
        &self,
        ids: &[E::Id],
        filter: Filter<'_, E>,
    ) -> Result<Vec<E::Id>> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Restore)?;
        let mut matched = Vec::new();
        for id in ids {
            if let Some(row) = state.rows.get_mut(id)
                && filter(&*row)
            {
                row.set_deleted_at(0);
                matched.push(*id);
            }
        }
        Ok(matched)
    }

    async fn scan(&self, filter: Filter<'_, E>) -> Result<Vec<E>> {
        let mut state = self.state.write().await;
        state.take_failure(TableOp::Scan)?;
        Ok(state
            .rows
            .values()
            .filter(|row| row.is_live() && filter(row))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, GroupKind};
    use common::{GroupId, UserId};

    fn group(name: &str) -> Group {
        Group::new(UserId::new(), name, GroupKind::Private)
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let table = InMemoryTable::<Group>::new();
        let a = table.insert(group("a")).await.unwrap();
        let b = table.insert(group("b")).await.unwrap();
        assert_eq!(a.id, GroupId::new(1));
        assert_eq!(b.id, GroupId::new(2));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_row_and_restore_brings_it_back() {
        let table = InMemoryTable::<Group>::new();
        let g = table.insert(group("a")).await.unwrap();

        let deleted = table.soft_delete(&[g.id]).await.unwrap();
        assert_eq!(deleted, vec![g.id]);
        assert!(matches!(
            table.get(g.id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(table.row_count().await, 1);
        assert!(table.get_raw(g.id).await.unwrap().deleted_at > 0);

        table.restore(&[g.id]).await.unwrap();
        assert_eq!(table.get(g.id).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let table = InMemoryTable::<Group>::new();
        let g = table.insert(group("a")).await.unwrap();
        table.soft_delete(&[g.id]).await.unwrap();

        table.restore(&[g.id]).await.unwrap();
        let once = table.get(g.id).await.unwrap();
        table.restore(&[g.id]).await.unwrap();
        let twice = table.get(g.id).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_soft_delete_skips_already_deleted_rows() {
        let table = InMemoryTable::<Group>::new();
        let g = table.insert(group("a")).await.unwrap();
        table.soft_delete(&[g.id]).await.unwrap();
        let again = table.soft_delete(&[g.id]).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_restore_unknown_id_fails() {
        let table = InMemoryTable::<Group>::new();
        let result = table.restore(&[GroupId::new(99)]).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_write_conflicts_then_success() {
        let table = InMemoryTable::<Group>::new();
        table.inject_write_conflicts(2).await;

        assert!(table.insert(group("a")).await.unwrap_err().is_transient());
        assert!(table.insert(group("a")).await.unwrap_err().is_transient());
        table.insert(group("a")).await.unwrap();
        assert_eq!(table.row_count().await, 1);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let table = InMemoryTable::<Group>::new();
        table.fail_next(TableOp::Insert).await;
        assert!(matches!(
            table.insert(group("a")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(table.insert(group("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_matching_skips_rows_outside_filter() {
        let table = InMemoryTable::<Group>::new();
        let a = table.insert(group("a")).await.unwrap();
        let b = table.insert(group("b")).await.unwrap();
        table.soft_delete(&[a.id, b.id]).await.unwrap();

        let restored = table
            .restore_matching(&[a.id, b.id, GroupId::new(99)], &|g: &Group| g.name == "a")
            .await
            .unwrap();
        assert_eq!(restored, vec![a.id]);
        assert!(table.get(a.id).await.is_ok());
        assert!(table.get_raw(b.id).await.unwrap().deleted_at > 0);
    }

    #[tokio::test]
    async fn test_scan_returns_live_rows_only() {
        let table = InMemoryTable::<Group>::new();
        let a = table.insert(group("a")).await.unwrap();
        table.insert(group("b")).await.unwrap();
        table.soft_delete(&[a.id]).await.unwrap();

        let rows = table.scan(&|_: &Group| true).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "b");
    }
}
