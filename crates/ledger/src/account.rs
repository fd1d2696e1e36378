use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use printforge_core::{Actor, AdminId, Aggregate, AggregateRoot, DomainError, UserId};
use printforge_events::Event;

use crate::error::LedgerError;
use crate::transaction::{IdempotencyKey, TransactionRecord, TransactionType};

/// Aggregate root: one user's credit account.
///
/// Holds the current balance only. The transaction log and the idempotency keys
/// already honoured are owned by the store; every event applied here corresponds
/// to exactly one appended `TransactionRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    user_id: UserId,
    balance: u64,
    version: u64,
    opened: bool,
}

impl CreditAccount {
    /// Empty, not-yet-opened account for `user_id`.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: 0,
            version: 0,
            opened: false,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }
}

impl AggregateRoot for CreditAccount {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount (zero balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Debit credits for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debit {
    pub user_id: UserId,
    pub transaction_id: Uuid,
    pub amount: u64,
    pub related_id: Option<String>,
    /// Set when the debit reclaims earlier compensation and must happen once.
    pub idempotency_key: Option<IdempotencyKey>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Refund (or otherwise grant) credits. Recorded as `bonus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub user_id: UserId,
    pub transaction_id: Uuid,
    pub amount: u64,
    pub related_id: Option<String>,
    pub reason: Option<String>,
    pub idempotency_key: IdempotencyKey,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Purchase credits (payment already captured elsewhere).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub user_id: UserId,
    pub transaction_id: Uuid,
    pub amount: u64,
    /// Payment reference; doubles as the idempotency key.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Admin adjustment (signed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjust {
    pub user_id: UserId,
    pub transaction_id: Uuid,
    pub amount: i64,
    pub admin_id: AdminId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    OpenAccount(OpenAccount),
    Debit(Debit),
    Refund(Refund),
    Purchase(Purchase),
    Adjust(Adjust),
}

impl LedgerCommand {
    /// Key under which the store accepts this command at most once.
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        match self {
            LedgerCommand::Debit(cmd) => cmd.idempotency_key.clone(),
            LedgerCommand::Refund(cmd) => Some(cmd.idempotency_key.clone()),
            LedgerCommand::Purchase(cmd) => Some(IdempotencyKey::new(&cmd.reference, "purchase")),
            LedgerCommand::OpenAccount(_) | LedgerCommand::Adjust(_) => None,
        }
    }
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    AccountOpened(AccountOpened),
    TransactionRecorded(TransactionRecord),
}

impl LedgerEvent {
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            LedgerEvent::TransactionRecorded(r) => Some(r),
            LedgerEvent::AccountOpened(_) => None,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened(_) => "ledger.account.opened",
            LedgerEvent::TransactionRecorded(_) => "ledger.account.transaction_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::AccountOpened(e) => e.occurred_at,
            LedgerEvent::TransactionRecorded(r) => r.created_at,
        }
    }
}

impl Aggregate for CreditAccount {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::AccountOpened(e) => {
                self.user_id = e.user_id;
                self.opened = true;
            }
            LedgerEvent::TransactionRecorded(r) => {
                self.balance = r.balance_after;
                self.opened = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::OpenAccount(cmd) => self.handle_open(cmd),
            LedgerCommand::Debit(cmd) => self.handle_debit(cmd),
            LedgerCommand::Refund(cmd) => self.handle_refund(cmd),
            LedgerCommand::Purchase(cmd) => self.handle_purchase(cmd),
            LedgerCommand::Adjust(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl CreditAccount {
    fn ensure_user(&self, user_id: UserId) -> Result<(), DomainError> {
        if self.user_id != user_id {
            return Err(DomainError::invariant("user_id mismatch"));
        }
        Ok(())
    }

    fn credited_balance(&self, amount: u64) -> Result<u64, DomainError> {
        self.balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::invariant("balance overflow"))
    }

    fn signed(amount: u64) -> Result<i64, DomainError> {
        i64::try_from(amount).map_err(|_| DomainError::validation("amount too large"))
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_user(cmd.user_id)?;
        if self.opened {
            return Ok(vec![]);
        }
        Ok(vec![LedgerEvent::AccountOpened(AccountOpened {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_debit(&self, cmd: &Debit) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_user(cmd.user_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("debit amount must be positive").into());
        }
        if self.balance < cmd.amount {
            return Err(LedgerError::InsufficientBalance {
                available: self.balance,
                requested: cmd.amount,
            });
        }

        Ok(vec![LedgerEvent::TransactionRecorded(TransactionRecord {
            transaction_id: cmd.transaction_id,
            user_id: cmd.user_id,
            kind: TransactionType::Consume,
            amount: -Self::signed(cmd.amount)?,
            balance_after: self.balance - cmd.amount,
            related_id: cmd.related_id.clone(),
            reason: None,
            actor: Actor::User(cmd.user_id),
            idempotency_key: cmd.idempotency_key.clone(),
            created_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &Refund) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_user(cmd.user_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("refund amount must be positive").into());
        }
        Ok(vec![LedgerEvent::TransactionRecorded(TransactionRecord {
            transaction_id: cmd.transaction_id,
            user_id: cmd.user_id,
            kind: TransactionType::Bonus,
            amount: Self::signed(cmd.amount)?,
            balance_after: self.credited_balance(cmd.amount)?,
            related_id: cmd.related_id.clone(),
            reason: cmd.reason.clone(),
            actor: Actor::System,
            idempotency_key: Some(cmd.idempotency_key.clone()),
            created_at: cmd.occurred_at,
        })])
    }

    fn handle_purchase(&self, cmd: &Purchase) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_user(cmd.user_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("purchase amount must be positive").into());
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("purchase reference is required").into());
        }
        let key = IdempotencyKey::new(&cmd.reference, "purchase");

        Ok(vec![LedgerEvent::TransactionRecorded(TransactionRecord {
            transaction_id: cmd.transaction_id,
            user_id: cmd.user_id,
            kind: TransactionType::Purchase,
            amount: Self::signed(cmd.amount)?,
            balance_after: self.credited_balance(cmd.amount)?,
            related_id: Some(cmd.reference.clone()),
            reason: None,
            actor: Actor::User(cmd.user_id),
            idempotency_key: Some(key),
            created_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &Adjust) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_user(cmd.user_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("adjustment amount must be non-zero").into());
        }
        if cmd.amount < 0 && cmd.reason.trim().is_empty() {
            return Err(
                DomainError::validation("a reason is required for negative adjustments").into(),
            );
        }

        let balance_after = if cmd.amount < 0 {
            let decrease = cmd.amount.unsigned_abs();
            if decrease > self.balance {
                return Err(LedgerError::InsufficientBalance {
                    available: self.balance,
                    requested: decrease,
                });
            }
            self.balance - decrease
        } else {
            self.credited_balance(cmd.amount.unsigned_abs())?
        };

        let reason = cmd.reason.trim();
        Ok(vec![LedgerEvent::TransactionRecorded(TransactionRecord {
            transaction_id: cmd.transaction_id,
            user_id: cmd.user_id,
            kind: TransactionType::Adjustment,
            amount: cmd.amount,
            balance_after,
            related_id: None,
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            actor: Actor::Admin(cmd.admin_id),
            idempotency_key: None,
            created_at: cmd.occurred_at,
        })])
    }
}
