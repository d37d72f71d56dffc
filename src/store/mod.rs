//! # Stores
//!
//! Storage seams for the orchestration core.
//!
//! Sagas, pipeline executions and agent health records live behind the
//! [`KeyValueStore`] trait so the executors can be exercised without a database.
//! Implementations must make [`KeyValueStore::update`] atomic per key: a
//! read-modify-write on one key never interleaves with another on the same key.
//! Operations on different keys may run in parallel.
//!
//! The [`context`] submodule holds the session context store used to persist
//! human-readable progress notes.

pub mod context;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use context::{ContextStore, ConversationMessage, InMemoryContextStore, SessionContext};
pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
    #[error("Record {key} not found")]
    NotFound { key: String },
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Mutation applied atomically to one stored value
pub type UpdateFn<V> = Box<dyn FnOnce(&mut V) + Send>;

/// Predicate used by [`KeyValueStore::scan`]
pub type ScanFilter<'a, V> = &'a (dyn Fn(&V) -> bool + Send + Sync);

/// Process-wide keyed record storage
#[async_trait]
pub trait KeyValueStore<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> StoreResult<Option<V>>;

    /// Insert or replace a value
    async fn put(&self, key: K, value: V) -> StoreResult<()>;

    /// Apply `mutation` to the value under `key` while holding that key exclusively.
    /// Returns the updated value, or `None` when the key is absent.
    async fn update(&self, key: &K, mutation: UpdateFn<V>) -> StoreResult<Option<V>>;

    /// Like [`KeyValueStore::update`], but inserts `default` first when `key` is
    /// absent. Insert and mutation happen under one exclusive hold.
    async fn upsert(&self, key: K, default: V, mutation: UpdateFn<V>) -> StoreResult<V>;

    async fn remove(&self, key: &K) -> StoreResult<Option<V>>;

    /// Snapshot of all values matching `filter`
    async fn scan(&self, filter: ScanFilter<'_, V>) -> StoreResult<Vec<V>>;

    async fn len(&self) -> StoreResult<usize>;
}
