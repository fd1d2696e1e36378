use thiserror::Error;

use printforge_core::DomainError;

use crate::status::JobStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job cannot be retried: {reason}")]
    NotRetryable { status: JobStatus, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
