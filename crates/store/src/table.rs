//! Participant store abstraction.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// A row owned by exactly one participant store.
///
/// Rows are never physically removed: deletion sets `deleted_at` to a
/// non-zero unix-millisecond marker and undeletion clears it again.
pub trait Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Numeric primary key type.
    type Id: Copy + Debug + Eq + Hash + Ord + Display + Send + Sync + From<i64> + Into<i64> + 'static;

    /// Entity type name, used for cache keys and error messages.
    const KIND: &'static str;

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);

    fn deleted_at(&self) -> i64;

    fn set_deleted_at(&mut self, at: i64);

    /// Natural key that must be unique among live rows, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Records a modification time. Entities without one ignore it.
    fn touch(&mut self, _at: i64) {}

    fn is_live(&self) -> bool {
        self.deleted_at() == 0
    }

    /// Cache key of the form `{kind}:{id}`.
    fn cache_key(id: Self::Id) -> String {
        format!("{}:{}", Self::KIND, id)
    }
}

/// Row predicate used by [`Table::scan`].
pub type Filter<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// A single participant's table.
///
/// Every method performs exactly one local mutation or read. Reads only
/// ever see live rows.
#[async_trait]
pub trait Table<E: Entity>: Send + Sync {
    /// Inserts a new row and returns it with its assigned id.
    ///
    /// Fails with `Duplicate` when a live row shares the unique key and with
    /// `WriteConflict` on a transient conflict.
    async fn insert(&self, entity: E) -> Result<E>;

    /// Loads a live row.
    async fn get(&self, id: E::Id) -> Result<E>;

    /// Loads the live rows among `ids`. Missing or deleted ids are skipped.
    async fn get_many(&self, ids: &[E::Id]) -> Result<Vec<E>>;

    /// Overwrites a live row.
    async fn update(&self, entity: E) -> Result<E>;

    /// Sets the soft-delete marker on the live rows among `ids`.
    ///
    /// Returns the ids that were actually deleted.
    async fn soft_delete(&self, ids: &[E::Id]) -> Result<Vec<E::Id>>;

    /// Clears the soft-delete marker. Restoring a live row is a no-op.
    ///
    /// Fails with `NotFound` if an id was never inserted.
    async fn restore(&self, ids: &[E::Id]) -> Result<()>;

    /// Clears the soft-delete marker on the rows among `ids` that match
    /// `filter`, live or not. Unknown and non-matching ids are skipped.
    ///
    /// Returns the ids that matched.
    async fn restore_matching(&self, ids: &[E::Id], filter: Filter<'_, E>)
    -> Result<Vec<E::Id>>;

    /// Returns all live rows matching `filter`, ordered by id.
    async fn scan(&self, filter: Filter<'_, E>) -> Result<Vec<E>>;
}
