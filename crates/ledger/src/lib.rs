//! Credit ledger (per-user balance + append-only transaction log).
//!
//! Pure domain logic only: no IO, no persistence. The infra crate runs these
//! commands inside an atomic read-modify-write against the credit store.

pub mod account;
pub mod error;
pub mod transaction;

pub use account::{
    AccountOpened, Adjust, CreditAccount, Debit, LedgerCommand, LedgerEvent, OpenAccount,
    Purchase, Refund,
};
pub use error::LedgerError;
pub use transaction::{IdempotencyKey, TransactionRecord, TransactionType};
