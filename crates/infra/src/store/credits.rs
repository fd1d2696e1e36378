use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use printforge_core::{AggregateRoot, ExpectedVersion, UserId};
use printforge_ledger::{CreditAccount, IdempotencyKey, TransactionRecord};

use super::{Page, Pagination, StoreError};

/// Balance snapshots plus the append-only transaction log and the idempotency
/// keys its records carry.
///
/// `commit` is the single atomic write: the account snapshot and its new records
/// land together or not at all.
pub trait CreditStore: Send + Sync {
    fn load(&self, user_id: UserId) -> Result<Option<CreditAccount>, StoreError>;

    fn has_applied(&self, user_id: UserId, key: &IdempotencyKey) -> Result<bool, StoreError>;

    /// Persist `account` and append `records` if the stored version (0 when the
    /// account does not exist yet) matches `expected` and no record reuses an
    /// applied idempotency key (`StoreError::DuplicateKey`).
    fn commit(
        &self,
        account: &CreditAccount,
        expected: ExpectedVersion,
        records: &[TransactionRecord],
    ) -> Result<(), StoreError>;

    /// Newest first.
    fn transactions(
        &self,
        user_id: UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError>;
}

impl<S> CreditStore for Arc<S>
where
    S: CreditStore + ?Sized,
{
    fn load(&self, user_id: UserId) -> Result<Option<CreditAccount>, StoreError> {
        (**self).load(user_id)
    }

    fn has_applied(&self, user_id: UserId, key: &IdempotencyKey) -> Result<bool, StoreError> {
        (**self).has_applied(user_id, key)
    }

    fn commit(
        &self,
        account: &CreditAccount,
        expected: ExpectedVersion,
        records: &[TransactionRecord],
    ) -> Result<(), StoreError> {
        (**self).commit(account, expected, records)
    }

    fn transactions(
        &self,
        user_id: UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError> {
        (**self).transactions(user_id, page)
    }
}

#[derive(Debug)]
struct Ledger {
    account: CreditAccount,
    log: Vec<TransactionRecord>,
    keys: HashSet<IdempotencyKey>,
}

#[derive(Debug, Default)]
pub struct InMemoryCreditStore {
    ledgers: RwLock<HashMap<UserId, Ledger>>,
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CreditStore for InMemoryCreditStore {
    fn load(&self, user_id: UserId) -> Result<Option<CreditAccount>, StoreError> {
        let ledgers = self.ledgers.read().map_err(|_| StoreError::poisoned())?;
        Ok(ledgers.get(&user_id).map(|l| l.account.clone()))
    }

    fn has_applied(&self, user_id: UserId, key: &IdempotencyKey) -> Result<bool, StoreError> {
        let ledgers = self.ledgers.read().map_err(|_| StoreError::poisoned())?;
        Ok(ledgers.get(&user_id).is_some_and(|l| l.keys.contains(key)))
    }

    fn commit(
        &self,
        account: &CreditAccount,
        expected: ExpectedVersion,
        records: &[TransactionRecord],
    ) -> Result<(), StoreError> {
        let user_id = account.user_id();
        if records.iter().any(|r| r.user_id != user_id) {
            return Err(StoreError::Storage(
                "transaction batch mixes users".to_string(),
            ));
        }

        let mut ledgers = self.ledgers.write().map_err(|_| StoreError::poisoned())?;
        let current = ledgers.get(&user_id).map(|l| l.account.version()).unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "credit account {user_id}: expected {expected:?}, found {current}"
            )));
        }

        let ledger = ledgers.entry(user_id).or_insert_with(|| Ledger {
            account: CreditAccount::empty(user_id),
            log: Vec::new(),
            keys: HashSet::new(),
        });
        let mut batch_keys = HashSet::new();
        for key in records.iter().filter_map(|r| r.idempotency_key.as_ref()) {
            if ledger.keys.contains(key) || !batch_keys.insert(key) {
                return Err(StoreError::DuplicateKey(key.to_string()));
            }
        }
        ledger
            .keys
            .extend(records.iter().filter_map(|r| r.idempotency_key.clone()));
        ledger.account = account.clone();
        ledger.log.extend_from_slice(records);
        Ok(())
    }

    fn transactions(
        &self,
        user_id: UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, StoreError> {
        let ledgers = self.ledgers.read().map_err(|_| StoreError::poisoned())?;
        let newest_first: Vec<TransactionRecord> = ledgers
            .get(&user_id)
            .map(|l| l.log.iter().rev().cloned().collect())
            .unwrap_or_default();
        Ok(page.apply(newest_first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use printforge_core::Actor;
    use printforge_events::execute;
    use printforge_ledger::{LedgerCommand, Refund};
    use uuid::Uuid;

    fn refund(account: &mut CreditAccount, key: &IdempotencyKey) -> Vec<TransactionRecord> {
        let cmd = LedgerCommand::Refund(Refund {
            user_id: account.user_id(),
            transaction_id: Uuid::now_v7(),
            amount: 3,
            related_id: Some("job-1".to_string()),
            reason: Some("job_failed".to_string()),
            idempotency_key: key.clone(),
            occurred_at: Utc::now(),
        });
        execute(account, &cmd)
            .unwrap()
            .iter()
            .filter_map(|e| e.record().cloned())
            .collect()
    }

    #[test]
    fn reused_key_is_rejected_and_nothing_is_written() {
        let store = InMemoryCreditStore::new();
        let user = UserId::new();
        let key = IdempotencyKey::new("job-1", "job_failed");

        let mut account = CreditAccount::empty(user);
        let records = refund(&mut account, &key);
        store
            .commit(&account, ExpectedVersion::Exact(0), &records)
            .unwrap();
        assert!(store.has_applied(user, &key).unwrap());

        let mut again = account.clone();
        let records = refund(&mut again, &key);
        let err = store
            .commit(&again, ExpectedVersion::Exact(account.version()), &records)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        let stored = store.load(user).unwrap().unwrap();
        assert_eq!(stored.balance(), 3);
        let log = store.transactions(user, Pagination::default()).unwrap();
        assert_eq!(log.items.len(), 1);
        assert_eq!(log.items[0].actor, Actor::System);
    }

    #[test]
    fn keys_are_scoped_per_user() {
        let store = InMemoryCreditStore::new();
        let key = IdempotencyKey::new("pay-1", "purchase");
        assert!(!store.has_applied(UserId::new(), &key).unwrap());

        let user = UserId::new();
        let mut account = CreditAccount::empty(user);
        let records = refund(&mut account, &key);
        store
            .commit(&account, ExpectedVersion::Exact(0), &records)
            .unwrap();
        assert!(store.has_applied(user, &key).unwrap());
        assert!(!store.has_applied(UserId::new(), &key).unwrap());
    }
}
