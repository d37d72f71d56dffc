//! In-memory [`KeyValueStore`] backed by a sharded `DashMap`.
//!
//! Each shard is guarded by its own lock, so an update holds only the shard that
//! owns its key.

use super::{KeyValueStore, ScanFilter, StoreResult, UpdateFn};
use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> Default for InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> KeyValueStore<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> StoreResult<Option<V>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: K, value: V) -> StoreResult<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn update(&self, key: &K, mutation: UpdateFn<V>) -> StoreResult<Option<V>> {
        // The shard write lock is held for the whole closure
        Ok(self.entries.get_mut(key).map(|mut entry| {
            mutation(entry.value_mut());
            entry.value().clone()
        }))
    }

    async fn upsert(&self, key: K, default: V, mutation: UpdateFn<V>) -> StoreResult<V> {
        let mut entry = self.entries.entry(key).or_insert(default);
        mutation(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn remove(&self, key: &K) -> StoreResult<Option<V>> {
        Ok(self.entries.remove(key).map(|(_, value)| value))
    }

    async fn scan(&self, filter: ScanFilter<'_, V>) -> StoreResult<Vec<V>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.len())
    }
}
