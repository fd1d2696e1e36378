use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use printforge_core::UserId;

use super::StoreError;

/// Per-user count of completed generations.
pub trait GenerationCounter: Send + Sync {
    /// Increment and return the new count.
    fn increment(&self, user_id: UserId) -> Result<u64, StoreError>;

    fn get(&self, user_id: UserId) -> Result<u64, StoreError>;
}

impl<S> GenerationCounter for Arc<S>
where
    S: GenerationCounter + ?Sized,
{
    fn increment(&self, user_id: UserId) -> Result<u64, StoreError> {
        (**self).increment(user_id)
    }

    fn get(&self, user_id: UserId) -> Result<u64, StoreError> {
        (**self).get(user_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGenerationCounter {
    counts: RwLock<HashMap<UserId, u64>>,
}

impl InMemoryGenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenerationCounter for InMemoryGenerationCounter {
    fn increment(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut counts = self.counts.write().map_err(|_| StoreError::poisoned())?;
        let count = counts.entry(user_id).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn get(&self, user_id: UserId) -> Result<u64, StoreError> {
        let counts = self.counts.read().map_err(|_| StoreError::poisoned())?;
        Ok(counts.get(&user_id).copied().unwrap_or(0))
    }
}
