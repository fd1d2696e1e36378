//! Repository ports and in-memory implementations.
//!
//! Stores hold aggregate snapshots. Every save carries an `ExpectedVersion`, so a
//! concurrent writer surfaces as `StoreError::Conflict` instead of a lost update.

pub mod counters;
pub mod credits;
pub mod jobs;
pub mod orders;
pub mod snapshot;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use counters::{GenerationCounter, InMemoryGenerationCounter};
pub use credits::{CreditStore, InMemoryCreditStore};
pub use jobs::{JobFilter, JobRepository};
pub use orders::{OrderFilter, OrderRepository};
pub use snapshot::InMemorySnapshotStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency failure.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A ledger record reuses an idempotency key that was already applied.
    #[error("idempotency key already applied: {0}")]
    DuplicateKey(String),

    /// Backend failure (poisoned lock, IO, ...).
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        StoreError::Storage("lock poisoned".to_string())
    }
}

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }

    /// Cut one page out of an already ordered result set.
    pub fn apply<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        let has_more = u64::from(self.offset) + (page.len() as u64) < total;
        Page {
            items: page,
            total,
            pagination: self,
            has_more,
        }
    }
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}
