use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use printforge_core::{Actor, UserId};

/// Kind of balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credits spent on a generation job.
    Consume,
    /// Credits returned or granted (refunds, delivery bonuses).
    Bonus,
    /// Manual correction by an admin.
    Adjustment,
    /// Credits bought by the user.
    Purchase,
}

/// Dedupe key for credit-granting operations and compensating debits.
///
/// Built from the related entity and a reason code, e.g. `job:<id>:job_failed`.
/// The credit store accepts each key once per user; repeats are acknowledged
/// without effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(related_id: impl core::fmt::Display, reason_code: &str) -> Self {
        Self(format!("{related_id}:{reason_code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable entry of the transaction log.
///
/// Exactly one record is written per balance mutation, so summing `amount` over a
/// user's log reproduces the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: Uuid,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Signed delta applied to the balance.
    pub amount: i64,
    pub balance_after: u64,
    /// Job or order the mutation relates to.
    pub related_id: Option<String>,
    pub reason: Option<String>,
    pub actor: Actor,
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}
