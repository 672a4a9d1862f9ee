//! Cache invalidation hook around a participant table.

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::cache::{Cache, CacheConfig};
use crate::table::{Entity, Filter, Table};
use crate::Result;

/// A table whose rows are cached by id.
///
/// Every committed mutation deletes the affected cache entries before it
/// returns, so a caller that observed the mutation can never read the
/// pre-mutation snapshot from the cache. Cache failures are logged and
/// never fail the mutation.
///
/// Reads are read-through: hits are served from the cache, misses are read
/// from the table and written back. Only live rows are ever written back.
#[derive(Debug, Clone)]
pub struct CachedTable<E, T, C> {
    table: T,
    cache: C,
    config: CacheConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, T, C> CachedTable<E, T, C> {
    pub fn new(table: T, cache: C, config: CacheConfig) -> Self {
        Self {
            table,
            cache,
            config,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, T, C: Cache> CachedTable<E, T, C> {
    async fn invalidate(&self, ids: &[E::Id]) {
        if ids.is_empty() {
            return;
        }
        let keys: Vec<String> = ids.iter().map(|id| E::cache_key(*id)).collect();
        if let Err(e) = self.cache.delete_many(&keys).await {
            metrics::counter!("cache_invalidation_failures_total", "entity" => E::KIND)
                .increment(1);
            tracing::warn!(entity = E::KIND, ?keys, error = %e, "cache invalidation failed");
        }
    }

    async fn cached(&self, ids: &[E::Id]) -> Vec<Option<E>> {
        let keys: Vec<String> = ids.iter().map(|id| E::cache_key(*id)).collect();
        match self.cache.get_many(&keys).await {
            Ok(values) => values
                .into_iter()
                .map(|value| value.and_then(|raw| serde_json::from_str::<E>(&raw).ok()))
                .collect(),
            Err(e) => {
                tracing::warn!(entity = E::KIND, error = %e, "cache read failed");
                vec![None; ids.len()]
            }
        }
    }

    async fn populate(&self, rows: &[E]) {
        let entries: Vec<(String, String)> = rows
            .iter()
            .filter(|row| row.is_live())
            .filter_map(|row| {
                serde_json::to_string(row)
                    .ok()
                    .map(|raw| (E::cache_key(row.id()), raw))
            })
            .collect();
        if entries.is_empty() {
            return;
        }
        if let Err(e) = self.cache.set_many(entries, self.config.ttl).await {
            tracing::warn!(entity = E::KIND, error = %e, "cache fill failed");
        }
    }
}

#[async_trait]
impl<E, T, C> Table<E> for CachedTable<E, T, C>
where
    E: Entity,
    T: Table<E>,
    C: Cache,
{
    async fn insert(&self, entity: E) -> Result<E> {
        let created = self.table.insert(entity).await?;
        self.invalidate(&[created.id()]).await;
        Ok(created)
    }

    async fn get(&self, id: E::Id) -> Result<E> {
        if let Some(Some(hit)) = self.cached(&[id]).await.pop() {
            metrics::counter!("cache_hits_total", "entity" => E::KIND).increment(1);
            return Ok(hit);
        }
        metrics::counter!("cache_misses_total", "entity" => E::KIND).increment(1);
        let row = self.table.get(id).await?;
        self.populate(std::slice::from_ref(&row)).await;
        Ok(row)
    }

    async fn get_many(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        let slots = self.cached(ids).await;
        let missing: Vec<E::Id> = ids
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| *id)
            .collect();

        let loaded = if missing.is_empty() {
            Vec::new()
        } else {
            let rows = self.table.get_many(&missing).await?;
            self.populate(&rows).await;
            rows
        };

        let mut rows: Vec<E> = slots.into_iter().flatten().chain(loaded).collect();
        rows.sort_by_key(|row| row.id());
        Ok(rows)
    }

    async fn update(&self, entity: E) -> Result<E> {
        let updated = self.table.update(entity).await?;
        self.invalidate(&[updated.id()]).await;
        Ok(updated)
    }

    async fn soft_delete(&self, ids: &[E::Id]) -> Result<Vec<E::Id>> {
        let deleted = self.table.soft_delete(ids).await?;
        self.invalidate(ids).await;
        Ok(deleted)
    }

    async fn restore(&self, ids: &[E::Id]) -> Result<()> {
        self.table.restore(ids).await?;
        self.invalidate(ids).await;
        Ok(())
    }

    async fn restore_matching(
        &self,
        ids: &[E::Id],
        filter: Filter<'_, E>,
    ) -> Result<Vec<E::Id>> {
        let restored = self.table.restore_matching(ids, filter).await?;
        self.invalidate(&restored).await;
        Ok(restored)
    }

    async fn scan(&self, filter: Filter<'_, E>) -> Result<Vec<E>> {
        self.table.scan(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::memory::InMemoryTable;
    use crate::models::{Group, GroupKind};
    use crate::StoreError;
    use common::UserId;

    fn setup() -> (
        CachedTable<Group, InMemoryTable<Group>, InMemoryCache>,
        InMemoryTable<Group>,
        InMemoryCache,
    ) {
        let table = InMemoryTable::new();
        let cache = InMemoryCache::new();
        let cached = CachedTable::new(table.clone(), cache.clone(), CacheConfig::default());
        (cached, table, cache)
    }

    #[tokio::test]
    async fn test_get_populates_cache() {
        let (cached, _, cache) = setup();
        let g = cached
            .insert(Group::new(UserId::new(), "a", GroupKind::Public))
            .await
            .unwrap();
        assert!(!cache.contains("group:1").await);

        let loaded = cached.get(g.id).await.unwrap();
        assert_eq!(loaded, g);
        assert!(cache.contains("group:1").await);
    }

    #[tokio::test]
    async fn test_soft_delete_invalidates_before_returning() {
        let (cached, _, cache) = setup();
        let g = cached
            .insert(Group::new(UserId::new(), "a", GroupKind::Public))
            .await
            .unwrap();
        cached.get(g.id).await.unwrap();

        cached.soft_delete(&[g.id]).await.unwrap();
        assert!(!cache.contains("group:1").await);
        assert!(matches!(
            cached.get(g.id).await,
            Err(StoreError::NotFound { .. })
        ));
        // deleted rows are never written back
        assert!(!cache.contains("group:1").await);
    }

    #[tokio::test]
    async fn test_restore_invalidates_cache() {
        let (cached, table, cache) = setup();
        let g = cached
            .insert(Group::new(UserId::new(), "a", GroupKind::Public))
            .await
            .unwrap();
        cached.soft_delete(&[g.id]).await.unwrap();

        // a stale snapshot written by someone else
        cache
            .insert_raw(
                "group:1",
                serde_json::to_string(&g).unwrap(),
                std::time::Duration::from_secs(60),
            )
            .await;
        cached.restore(&[g.id]).await.unwrap();
        assert!(!cache.contains("group:1").await);
        assert_eq!(table.get(g.id).await.unwrap().deleted_at, 0);
    }

    #[tokio::test]
    async fn test_cache_delete_failure_does_not_fail_mutation() {
        let (cached, _, cache) = setup();
        let g = cached
            .insert(Group::new(UserId::new(), "a", GroupKind::Public))
            .await
            .unwrap();
        cache.set_fail_deletes(true);

        let mut renamed = g.clone();
        renamed.name = "b".to_string();
        let updated = cached.update(renamed).await.unwrap();
        assert_eq!(updated.name, "b");
    }

    #[tokio::test]
    async fn test_get_many_mixes_hits_and_misses() {
        let (cached, _, _) = setup();
        let a = cached
            .insert(Group::new(UserId::new(), "a", GroupKind::Public))
            .await
            .unwrap();
        let b = cached
            .insert(Group::new(UserId::new(), "b", GroupKind::Public))
            .await
            .unwrap();
        cached.get(a.id).await.unwrap();

        let rows = cached.get_many(&[b.id, a.id]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a.id);
        assert_eq!(rows[1].id, b.id);
    }
}
