use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::RwLock;

use printforge_core::{AggregateRoot, ExpectedVersion};

use super::StoreError;

/// In-memory snapshot store keyed by aggregate id, for tests/dev.
///
/// Saves are compare-and-swap on the aggregate version.
#[derive(Debug)]
pub struct InMemorySnapshotStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemorySnapshotStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemorySnapshotStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemorySnapshotStore<K, V>
where
    K: Clone + Eq + Hash + Display,
    V: AggregateRoot<Id = K> + Clone,
{
    pub fn insert(&self, value: &V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let key = value.id().clone();
        if map.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        map.insert(key, value.clone());
        Ok(())
    }

    /// Replace the stored snapshot if its version still matches `expected`.
    pub fn save(&self, value: &V, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let key = value.id().clone();
        let current = map
            .get(&key)
            .map(|v| v.version())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "{key}: expected {expected:?}, found {current}"
            )));
        }
        map.insert(key, value.clone());
        Ok(())
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(map.get(key).cloned())
    }

    pub fn select<P>(&self, predicate: P) -> Result<Vec<V>, StoreError>
    where
        P: Fn(&V) -> bool,
    {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(map.values().filter(|v| predicate(v)).cloned().collect())
    }
}
