//! Credit ledger service: atomic balance mutations over a `CreditStore`.
//!
//! Each operation loads the account snapshot, runs the pure `CreditAccount`
//! aggregate and commits snapshot + records with `ExpectedVersion::Exact`. A
//! concurrent writer makes the commit fail with a conflict; the operation then
//! reloads and re-decides, so a balance check and its decrement are never split.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use printforge_core::{AdminId, AggregateRoot, ExpectedVersion, UserId};
use printforge_events::execute;
use printforge_ledger::{
    Adjust, CreditAccount, Debit, IdempotencyKey, LedgerCommand, OpenAccount, Purchase, Refund,
    TransactionRecord,
};

use crate::error::ServiceError;
use crate::retry::RetryPolicy;
use crate::store::{CreditStore, Page, Pagination, StoreError};

/// Result of a credit-granting operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied(TransactionRecord),
    /// Same idempotency key already honoured; nothing written.
    Duplicate,
    /// No account for the user; logged and skipped.
    AccountMissing,
}

impl CreditOutcome {
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            CreditOutcome::Applied(r) => Some(r),
            _ => None,
        }
    }
}

enum Committed {
    Records(Vec<TransactionRecord>),
    NoAccount,
}

#[derive(Debug)]
pub struct LedgerService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: CreditStore> LedgerService<S> {
    /// `max_retries` bounds the reloads after optimistic-concurrency conflicts.
    pub fn new(store: S, max_retries: u32) -> Self {
        Self {
            store,
            retry: RetryPolicy::immediate(max_retries.saturating_add(1)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn balance(&self, user_id: UserId) -> Result<u64, ServiceError> {
        Ok(self
            .store
            .load(user_id)?
            .map(|a| a.balance())
            .unwrap_or(0))
    }

    pub fn transactions(
        &self,
        user_id: UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, ServiceError> {
        Ok(self.store.transactions(user_id, page)?)
    }

    pub fn open_account(&self, user_id: UserId) -> Result<(), ServiceError> {
        let cmd = LedgerCommand::OpenAccount(OpenAccount {
            user_id,
            occurred_at: Utc::now(),
        });
        self.commit(user_id, true, &cmd)?;
        Ok(())
    }

    /// Spend credits. Fails with `InsufficientBalance` without writing anything.
    pub fn debit(
        &self,
        user_id: UserId,
        amount: u64,
        related_id: Option<String>,
    ) -> Result<TransactionRecord, ServiceError> {
        let cmd = LedgerCommand::Debit(Debit {
            user_id,
            transaction_id: Uuid::now_v7(),
            amount,
            related_id,
            idempotency_key: None,
            occurred_at: Utc::now(),
        });
        match self.commit(user_id, false, &cmd)? {
            Committed::Records(mut records) if !records.is_empty() => {
                let record = records.remove(0);
                info!(user_id = %user_id, amount, balance = record.balance_after, "credits debited");
                Ok(record)
            }
            Committed::Records(_) => Err(ServiceError::Internal(
                "debit produced no transaction record".to_string(),
            )),
            Committed::NoAccount => Err(ServiceError::InsufficientBalance {
                available: 0,
                requested: amount,
            }),
        }
    }

    /// Take back credits previously returned for `related_id`, once per
    /// `reason_code`. Fails with `InsufficientBalance` like any debit.
    pub fn reclaim(
        &self,
        user_id: UserId,
        amount: u64,
        related_id: &str,
        reason_code: &str,
    ) -> Result<CreditOutcome, ServiceError> {
        let cmd = LedgerCommand::Debit(Debit {
            user_id,
            transaction_id: Uuid::now_v7(),
            amount,
            related_id: Some(related_id.to_string()),
            idempotency_key: Some(IdempotencyKey::new(related_id, reason_code)),
            occurred_at: Utc::now(),
        });
        let outcome = match self.commit(user_id, false, &cmd)? {
            Committed::Records(mut records) if !records.is_empty() => {
                CreditOutcome::Applied(records.remove(0))
            }
            Committed::Records(_) => CreditOutcome::Duplicate,
            Committed::NoAccount => CreditOutcome::AccountMissing,
        };
        if let CreditOutcome::Applied(r) = &outcome {
            info!(user_id = %user_id, amount, related_id, reason_code, balance = r.balance_after, "credits reclaimed");
        }
        Ok(outcome)
    }

    /// Return credits for `related_id`. A repeat of the same `reason_code` is a no-op.
    pub fn refund(
        &self,
        user_id: UserId,
        amount: u64,
        related_id: &str,
        reason_code: &str,
    ) -> Result<CreditOutcome, ServiceError> {
        self.credit(user_id, amount, related_id, reason_code, false)
    }

    /// Grant bonus credits (delivery bonus). Opens the account if needed.
    pub fn grant_bonus(
        &self,
        user_id: UserId,
        amount: u64,
        related_id: &str,
        reason_code: &str,
    ) -> Result<CreditOutcome, ServiceError> {
        self.credit(user_id, amount, related_id, reason_code, true)
    }

    pub fn purchase(
        &self,
        user_id: UserId,
        amount: u64,
        reference: &str,
    ) -> Result<CreditOutcome, ServiceError> {
        let cmd = LedgerCommand::Purchase(Purchase {
            user_id,
            transaction_id: Uuid::now_v7(),
            amount,
            reference: reference.to_string(),
            occurred_at: Utc::now(),
        });
        match self.commit(user_id, true, &cmd)? {
            Committed::Records(mut records) if !records.is_empty() => {
                let record = records.remove(0);
                info!(user_id = %user_id, amount, reference, "credits purchased");
                Ok(CreditOutcome::Applied(record))
            }
            _ => Ok(CreditOutcome::Duplicate),
        }
    }

    /// Admin correction. Negative amounts need a reason and stop at zero.
    pub fn adjust(
        &self,
        user_id: UserId,
        amount: i64,
        admin_id: AdminId,
        reason: &str,
    ) -> Result<TransactionRecord, ServiceError> {
        let cmd = LedgerCommand::Adjust(Adjust {
            user_id,
            transaction_id: Uuid::now_v7(),
            amount,
            admin_id,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        match self.commit(user_id, true, &cmd)? {
            Committed::Records(mut records) if !records.is_empty() => {
                let record = records.remove(0);
                info!(user_id = %user_id, admin_id = %admin_id, amount, "credits adjusted");
                Ok(record)
            }
            _ => Err(ServiceError::Internal(
                "adjustment produced no transaction record".to_string(),
            )),
        }
    }

    fn credit(
        &self,
        user_id: UserId,
        amount: u64,
        related_id: &str,
        reason_code: &str,
        create_if_missing: bool,
    ) -> Result<CreditOutcome, ServiceError> {
        let cmd = LedgerCommand::Refund(Refund {
            user_id,
            transaction_id: Uuid::now_v7(),
            amount,
            related_id: Some(related_id.to_string()),
            reason: Some(reason_code.to_string()),
            idempotency_key: IdempotencyKey::new(related_id, reason_code),
            occurred_at: Utc::now(),
        });
        let outcome = match self.commit(user_id, create_if_missing, &cmd)? {
            Committed::Records(mut records) if !records.is_empty() => {
                CreditOutcome::Applied(records.remove(0))
            }
            Committed::Records(_) => CreditOutcome::Duplicate,
            Committed::NoAccount => CreditOutcome::AccountMissing,
        };
        match &outcome {
            CreditOutcome::Applied(r) => {
                info!(user_id = %user_id, amount, related_id, reason_code, balance = r.balance_after, "credits returned");
            }
            CreditOutcome::Duplicate => {
                debug!(user_id = %user_id, related_id, reason_code, "credit already applied");
            }
            CreditOutcome::AccountMissing => {
                warn!(user_id = %user_id, amount, related_id, "credit skipped: no credit account");
            }
        }
        Ok(outcome)
    }

    /// Load, decide, compare-and-swap; reload on conflict.
    ///
    /// Keyed commands already applied are acknowledged without a decision, so a
    /// replayed debit never reports `InsufficientBalance`.
    fn commit(
        &self,
        user_id: UserId,
        create_if_missing: bool,
        cmd: &LedgerCommand,
    ) -> Result<Committed, ServiceError> {
        let key = cmd.idempotency_key();
        let mut attempts = 0;
        loop {
            attempts += 1;
            if let Some(key) = &key {
                if self.store.has_applied(user_id, key)? {
                    return Ok(Committed::Records(vec![]));
                }
            }
            let current = match self.store.load(user_id)? {
                Some(account) => account,
                None if create_if_missing => CreditAccount::empty(user_id),
                None => return Ok(Committed::NoAccount),
            };
            let expected = ExpectedVersion::Exact(current.version());

            let mut next = current;
            let events = execute(&mut next, cmd)?;
            if events.is_empty() {
                return Ok(Committed::Records(vec![]));
            }
            let records: Vec<TransactionRecord> =
                events.iter().filter_map(|e| e.record().cloned()).collect();

            match self.store.commit(&next, expected, &records) {
                Ok(()) => return Ok(Committed::Records(records)),
                Err(StoreError::DuplicateKey(key)) => {
                    debug!(user_id = %user_id, %key, "idempotency key applied concurrently");
                    return Ok(Committed::Records(vec![]));
                }
                Err(StoreError::Conflict(msg)) if self.retry.should_retry(attempts) => {
                    debug!(user_id = %user_id, attempts, %msg, "credit account changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
