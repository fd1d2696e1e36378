//! Order status lifecycle and its transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Printing,
    QualityCheck,
    Shipping,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Printing,
        OrderStatus::QualityCheck,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Exhaustive transition table. Any pair not listed here is invalid.
    pub fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Printing, Cancelled],
            Printing => &[QualityCheck],
            QualityCheck => &[Shipping, Cancelled],
            Shipping => &[Delivered, Cancelled],
            Delivered => &[Refunded],
            Cancelled => &[Refunded],
            Refunded => &[],
        }
    }

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Statuses from which a cancellation request is honoured.
    ///
    /// Narrower than the table: `confirmed -> cancelled` exists for admin use via
    /// a plain transition but is not offered as a cancellation.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::QualityCheck | OrderStatus::Shipping
        )
    }

    pub fn is_refundable(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Printing => "printing",
            OrderStatus::QualityCheck => "quality_check",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an order's audit trail.
///
/// `from` is `None` only for the placement entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub changed_by: Actor,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
}
