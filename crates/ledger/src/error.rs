use thiserror::Error;

use printforge_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Not enough credits. Kept distinct from every other failure so callers can
    /// prompt the user to top up instead of reporting an internal error.
    #[error("insufficient credits: {available} available, {requested} required")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LedgerError {
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, LedgerError::InsufficientBalance { .. })
    }
}
