//! Print orders (fulfillment lifecycle).
//!
//! Deterministic domain logic only: placement validation and pricing, the status
//! transition table, cancellation/refund policy and the delivery bonus. No IO.

pub mod error;
pub mod order;
pub mod placement;
pub mod pricing;
pub mod status;

pub use error::OrderError;
pub use order::{
    CancelOrder, ConfirmPayment, DeliveryBonusComputed, MarkDelivered, Order, OrderCommand,
    OrderEvent, OrderId, OrderItem, OrderPlaced, Payment, PaymentConfirmed, PaymentRefunded,
    PaymentStatus, PlaceOrder, RefundOrder, ShippingAddress, StatusChanged, StatusTimestamps,
    Tracking, TransitionStatus,
};
pub use placement::{ItemRequest, NewOrder, place_order};
pub use pricing::{Currency, PriceLookup, Quote, ShippingMethod, ShippingRates};
pub use status::{OrderStatus, OrderStatusChange};
