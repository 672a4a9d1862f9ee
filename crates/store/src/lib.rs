//! Participant store adapters.
//!
//! Each service owns its tables exclusively. This crate provides the table
//! abstraction those services mutate through, with:
//! - soft deletion, so compensations can undelete cheaply
//! - a deadlock-safe insert that retries transient write conflicts
//! - a cache invalidation hook that keeps cached snapshots consistent with
//!   committed mutations, forward or compensating

pub mod cache;
pub mod cached;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod retry;
pub mod table;

pub use cache::{Cache, CacheConfig, InMemoryCache};
pub use cached::CachedTable;
pub use error::{Result, StoreError};
pub use memory::{InMemoryTable, TableOp};
pub use models::{
    Dialog, DialogKind, DialogUser, EntryMethod, FriendRequest, Group, GroupIdentity, GroupKind,
    GroupRelation, GroupStatus, Message, RelationStatus, RequestStatus, UserRelation,
};
pub use postgres::PgGroupTable;
pub use retry::{RetryPolicy, create_with_retry};
pub use table::{Entity, Filter, Table};
