use thiserror::Error;

use printforge_core::DomainError;

use crate::status::OrderStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order cannot be cancelled while {status}")]
    NotCancellable { status: OrderStatus },

    #[error("order cannot be refunded while {status}")]
    NotRefundable { status: OrderStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
