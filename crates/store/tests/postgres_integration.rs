//! PostgreSQL integration tests for the group table.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{Deadline, GroupId, UserId};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CacheConfig, CachedTable, Group, GroupKind, InMemoryCache, PgGroupTable, RetryPolicy,
    StoreError, Table, create_with_retry,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_groups_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_table() -> PgGroupTable {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE groups RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PgGroupTable::new(pool)
}

fn new_group(name: &str) -> Group {
    Group::new(UserId::new(), name, GroupKind::Public)
}

#[tokio::test]
#[serial]
async fn test_insert_and_get() {
    let table = get_test_table().await;

    let created = table.insert(new_group("rust")).await.unwrap();
    assert_eq!(created.id, GroupId::new(1));
    assert_eq!(created.deleted_at, 0);

    let loaded = table.get(created.id).await.unwrap();
    assert_eq!(loaded, created);
}

#[tokio::test]
#[serial]
async fn test_soft_delete_and_restore() {
    let table = get_test_table().await;
    let created = table.insert(new_group("rust")).await.unwrap();

    let deleted = table.soft_delete(&[created.id]).await.unwrap();
    assert_eq!(deleted, vec![created.id]);
    assert!(matches!(
        table.get(created.id).await,
        Err(StoreError::NotFound { .. })
    ));

    table.restore(&[created.id]).await.unwrap();
    table.restore(&[created.id]).await.unwrap();
    let restored = table.get(created.id).await.unwrap();
    assert_eq!(restored.deleted_at, 0);
    assert_eq!(restored.name, "rust");
}

#[tokio::test]
#[serial]
async fn test_restore_unknown_group_fails() {
    let table = get_test_table().await;
    let result = table.restore(&[GroupId::new(404)]).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn test_update_and_get_many() {
    let table = get_test_table().await;
    let a = table.insert(new_group("a")).await.unwrap();
    let b = table.insert(new_group("b")).await.unwrap();

    let mut renamed = a.clone();
    renamed.name = "renamed".to_string();
    table.update(renamed).await.unwrap();
    table.soft_delete(&[b.id]).await.unwrap();

    let rows = table.get_many(&[a.id, b.id]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "renamed");
}

#[tokio::test]
#[serial]
async fn test_create_with_retry_through_cache() {
    let table = get_test_table().await;
    let cache = InMemoryCache::new();
    let cached = CachedTable::new(table, cache.clone(), CacheConfig::default());

    let created = create_with_retry(
        &cached,
        new_group("cached"),
        Deadline::after(Duration::from_secs(5)),
        RetryPolicy::default(),
    )
    .await
    .unwrap();

    cached.get(created.id).await.unwrap();
    assert!(cache.contains(&format!("group:{}", created.id)).await);

    cached.soft_delete(&[created.id]).await.unwrap();
    assert!(!cache.contains(&format!("group:{}", created.id)).await);
    assert!(cached.get(created.id).await.is_err());
}
