//! Caller-facing error taxonomy of the orchestrator and ledger service.

use thiserror::Error;

use printforge_core::DomainError;
use printforge_generation::JobError;
use printforge_ledger::LedgerError;
use printforge_orders::OrderError;

use crate::ports::{ObjectStoreError, ProviderError};
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("insufficient credits: {available} available, {requested} required")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("order cannot be cancelled while {status}")]
    NotCancellable { status: String },

    #[error("order cannot be refunded while {status}")]
    NotRefundable { status: String },

    #[error("job cannot be retried: {0}")]
    NotRetryable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Deterministic state conflict (duplicate create, stale snapshot after retries).
    #[error("conflict: {0}")]
    Conflict(String),

    /// External provider or storage failure. Transient.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InsufficientBalance { .. } => "insufficient_balance",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::NotCancellable { .. } => "not_cancellable",
            ServiceError::NotRefundable { .. } => "not_refundable",
            ServiceError::NotRetryable(_) => "not_retryable",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Provider(_) => "provider_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Provider(_))
    }

    pub(crate) fn not_found(what: impl core::fmt::Display) -> Self {
        ServiceError::NotFound(what.to_string())
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => ServiceError::Internal(msg),
            DomainError::NotFound => ServiceError::NotFound("entity".to_string()),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::PermissionDenied(msg) => ServiceError::PermissionDenied(msg),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientBalance {
                available,
                requested,
            } => ServiceError::InsufficientBalance {
                available,
                requested,
            },
            LedgerError::Domain(e) => e.into(),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(value: OrderError) -> Self {
        match value {
            OrderError::InvalidTransition { from, to } => ServiceError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrderError::NotCancellable { status } => ServiceError::NotCancellable {
                status: status.to_string(),
            },
            OrderError::NotRefundable { status } => ServiceError::NotRefundable {
                status: status.to_string(),
            },
            OrderError::Domain(e) => e.into(),
        }
    }
}

impl From<JobError> for ServiceError {
    fn from(value: JobError) -> Self {
        match value {
            JobError::InvalidTransition { from, to } => ServiceError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            JobError::NotRetryable { reason, .. } => ServiceError::NotRetryable(reason),
            JobError::Domain(e) => e.into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg)
            | StoreError::AlreadyExists(msg)
            | StoreError::DuplicateKey(msg) => ServiceError::Conflict(msg),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Storage(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(value: ProviderError) -> Self {
        ServiceError::Provider(value.to_string())
    }
}

impl From<ObjectStoreError> for ServiceError {
    fn from(value: ObjectStoreError) -> Self {
        ServiceError::Provider(value.to_string())
    }
}
