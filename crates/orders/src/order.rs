use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{Actor, AdminId, Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use printforge_events::Event;

use crate::error::OrderError;
use crate::pricing::{Currency, Quote, ShippingMethod};
use crate::status::{OrderStatus, OrderStatusChange};

/// Print order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One printed item: a generated model in a material, size and colour set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub generation_ref: String,
    pub model_ref: String,
    pub material: String,
    pub size: String,
    pub quantity: u32,
    pub colors: Vec<String>,
    /// Price in the smallest unit of the order currency.
    pub unit_price: u64,
    pub line_total: u64,
    /// Credits spent generating the model; basis of the delivery bonus.
    pub credits_consumed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: String,
    /// ISO 3166 alpha-2 country code.
    pub country: String,
    pub city: String,
    pub address_line: String,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub status: PaymentStatus,
    pub currency: Currency,
    pub subtotal: u64,
    pub shipping_cost: u64,
    pub total_amount: u64,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub carrier: String,
    pub tracking_number: String,
}

/// When the order first entered each status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTimestamps {
    pub confirmed_at: Option<DateTime<Utc>>,
    pub printing_at: Option<DateTime<Utc>>,
    pub quality_check_at: Option<DateTime<Utc>>,
    pub shipping_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl StatusTimestamps {
    fn stamp(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::Pending => return,
            OrderStatus::Confirmed => &mut self.confirmed_at,
            OrderStatus::Printing => &mut self.printing_at,
            OrderStatus::QualityCheck => &mut self.quality_check_at,
            OrderStatus::Shipping => &mut self.shipping_at,
            OrderStatus::Delivered => &mut self.delivered_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            OrderStatus::Refunded => &mut self.refunded_at,
        };
        slot.get_or_insert(at);
    }
}

/// Aggregate root: Order.
///
/// `status_history` is append-only and its last entry always targets `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    status: OrderStatus,
    status_history: Vec<OrderStatusChange>,
    items: Vec<OrderItem>,
    shipping_address: Option<ShippingAddress>,
    shipping_method: ShippingMethod,
    payment: Option<Payment>,
    tracking: Option<Tracking>,
    bonus_credits_awarded: Option<u64>,
    timestamps: StatusTimestamps,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            user_id: None,
            status: OrderStatus::Pending,
            status_history: Vec::new(),
            items: Vec::new(),
            shipping_address: None,
            shipping_method: ShippingMethod::Standard,
            payment: None,
            tracking: None,
            bonus_credits_awarded: None,
            timestamps: StatusTimestamps::default(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[OrderStatusChange] {
        &self.status_history
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    pub fn shipping_method(&self) -> ShippingMethod {
        self.shipping_method
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn tracking(&self) -> Option<&Tracking> {
        self.tracking.as_ref()
    }

    pub fn bonus_credits_awarded(&self) -> Option<u64> {
        self.bonus_credits_awarded
    }

    pub fn timestamps(&self) -> &StatusTimestamps {
        &self.timestamps
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Credits spent generating the models of this order.
    pub fn credits_consumed(&self) -> u64 {
        self.items.iter().map(|i| i.credits_consumed).sum()
    }

    /// `ceil(credits_consumed * percent / 100)`.
    pub fn delivery_bonus(&self, percent: u32) -> u64 {
        let scaled = self.credits_consumed().saturating_mul(u64::from(percent));
        scaled.div_ceil(100)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder (already validated and priced, see [`crate::place_order`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub shipping_method: ShippingMethod,
    pub payment_method: String,
    pub quote: Quote,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionStatus (generic table-driven move).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStatus {
    pub order_id: OrderId,
    pub to: OrderStatus,
    pub changed_by: Actor,
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
    /// Only accepted when entering `shipping`.
    pub tracking: Option<Tracking>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub order_id: OrderId,
    pub admin_id: AdminId,
    pub bonus_percent: u32,
    pub admin_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOrder {
    pub order_id: OrderId,
    pub admin_id: AdminId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmPayment (payment captured by an external gateway).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPayment {
    pub order_id: OrderId,
    pub actor: Actor,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    TransitionStatus(TransitionStatus),
    CancelOrder(CancelOrder),
    MarkDelivered(MarkDelivered),
    RefundOrder(RefundOrder),
    ConfirmPayment(ConfirmPayment),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub shipping_method: ShippingMethod,
    pub payment: Payment,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub change: OrderStatusChange,
    pub tracking: Option<Tracking>,
}

/// Event: DeliveryBonusComputed. The ledger grant happens outside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryBonusComputed {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub credits: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub order_id: OrderId,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

/// Event: PaymentRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    StatusChanged(StatusChanged),
    DeliveryBonusComputed(DeliveryBonusComputed),
    PaymentConfirmed(PaymentConfirmed),
    PaymentRefunded(PaymentRefunded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::DeliveryBonusComputed(_) => "orders.order.delivery_bonus_computed",
            OrderEvent::PaymentConfirmed(_) => "orders.order.payment_confirmed",
            OrderEvent::PaymentRefunded(_) => "orders.order.payment_refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.change.changed_at,
            OrderEvent::DeliveryBonusComputed(e) => e.occurred_at,
            OrderEvent::PaymentConfirmed(e) => e.paid_at,
            OrderEvent::PaymentRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.user_id = Some(e.user_id);
                self.status = OrderStatus::Pending;
                self.items = e.items.clone();
                self.shipping_address = Some(e.shipping_address.clone());
                self.shipping_method = e.shipping_method;
                self.payment = Some(e.payment.clone());
                self.status_history = vec![OrderStatusChange {
                    from: None,
                    to: OrderStatus::Pending,
                    changed_by: Actor::User(e.user_id),
                    changed_at: e.occurred_at,
                    reason: None,
                    admin_notes: None,
                }];
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                let at = e.change.changed_at;
                self.status = e.change.to;
                self.timestamps.stamp(e.change.to, at);
                if let Some(tracking) = &e.tracking {
                    self.tracking = Some(tracking.clone());
                }
                self.status_history.push(e.change.clone());
                self.updated_at = Some(at);
            }
            OrderEvent::DeliveryBonusComputed(e) => {
                self.bonus_credits_awarded = Some(e.credits);
            }
            OrderEvent::PaymentConfirmed(e) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = PaymentStatus::Paid;
                    payment.transaction_id = Some(e.transaction_id.clone());
                    payment.paid_at = Some(e.paid_at);
                }
                self.updated_at = Some(e.paid_at);
            }
            OrderEvent::PaymentRefunded(e) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = PaymentStatus::Refunded;
                }
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::TransitionStatus(cmd) => self.handle_transition(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkDelivered(cmd) => self.handle_mark_delivered(cmd),
            OrderCommand::RefundOrder(cmd) => self.handle_refund(cmd),
            OrderCommand::ConfirmPayment(cmd) => self.handle_confirm_payment(cmd),
        }
    }
}

impl Order {
    fn ensure_placed(&self, order_id: OrderId) -> Result<UserId, DomainError> {
        let owner = match (self.created, self.user_id) {
            (true, Some(owner)) => owner,
            _ => return Err(DomainError::not_found()),
        };
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(owner)
    }

    fn status_change(
        &self,
        to: OrderStatus,
        changed_by: Actor,
        reason: Option<String>,
        admin_notes: Option<String>,
        tracking: Option<Tracking>,
        at: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(OrderEvent::StatusChanged(StatusChanged {
            order_id: self.id,
            change: OrderStatusChange {
                from: Some(self.status),
                to,
                changed_by,
                changed_at: at,
                reason,
                admin_notes,
            },
            tracking,
        }))
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.created {
            return Err(DomainError::conflict("order already exists").into());
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item").into());
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            items: cmd.items.clone(),
            shipping_address: cmd.shipping_address.clone(),
            shipping_method: cmd.shipping_method,
            payment: Payment {
                method: cmd.payment_method.clone(),
                status: PaymentStatus::Pending,
                currency: cmd.quote.currency,
                subtotal: cmd.quote.subtotal,
                shipping_cost: cmd.quote.shipping_cost,
                total_amount: cmd.quote.total_amount,
                transaction_id: None,
                paid_at: None,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionStatus) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed(cmd.order_id)?;

        if cmd.tracking.is_some() && cmd.to != OrderStatus::Shipping {
            return Err(
                DomainError::validation("tracking can only be recorded when shipping").into(),
            );
        }

        Ok(vec![self.status_change(
            cmd.to,
            cmd.changed_by,
            cmd.reason.clone(),
            cmd.admin_notes.clone(),
            cmd.tracking.clone(),
            cmd.occurred_at,
        )?])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, OrderError> {
        let owner = self.ensure_placed(cmd.order_id)?;

        if !cmd.actor.may_act_for(owner) {
            return Err(DomainError::permission_denied("order belongs to another user").into());
        }
        if !self.status.is_cancellable() {
            return Err(OrderError::NotCancellable {
                status: self.status,
            });
        }

        Ok(vec![self.status_change(
            OrderStatus::Cancelled,
            cmd.actor,
            cmd.reason.clone(),
            None,
            None,
            cmd.occurred_at,
        )?])
    }

    fn handle_mark_delivered(&self, cmd: &MarkDelivered) -> Result<Vec<OrderEvent>, OrderError> {
        let owner = self.ensure_placed(cmd.order_id)?;

        let delivered = self.status_change(
            OrderStatus::Delivered,
            Actor::Admin(cmd.admin_id),
            None,
            cmd.admin_notes.clone(),
            None,
            cmd.occurred_at,
        )?;

        Ok(vec![
            delivered,
            OrderEvent::DeliveryBonusComputed(DeliveryBonusComputed {
                order_id: self.id,
                user_id: owner,
                credits: self.delivery_bonus(cmd.bonus_percent),
                occurred_at: cmd.occurred_at,
            }),
        ])
    }

    fn handle_refund(&self, cmd: &RefundOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed(cmd.order_id)?;

        if !self.status.is_refundable() {
            return Err(OrderError::NotRefundable {
                status: self.status,
            });
        }

        Ok(vec![
            self.status_change(
                OrderStatus::Refunded,
                Actor::Admin(cmd.admin_id),
                cmd.reason.clone(),
                None,
                None,
                cmd.occurred_at,
            )?,
            OrderEvent::PaymentRefunded(PaymentRefunded {
                order_id: self.id,
                occurred_at: cmd.occurred_at,
            }),
        ])
    }

    fn handle_confirm_payment(&self, cmd: &ConfirmPayment) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed(cmd.order_id)?;

        if cmd.transaction_id.trim().is_empty() {
            return Err(DomainError::validation("payment transaction_id is required").into());
        }
        match self.payment.as_ref().map(|p| p.status) {
            Some(PaymentStatus::Pending) | Some(PaymentStatus::Failed) => {}
            _ => return Err(DomainError::conflict("payment already settled").into()),
        }

        let mut events = vec![OrderEvent::PaymentConfirmed(PaymentConfirmed {
            order_id: self.id,
            transaction_id: cmd.transaction_id.clone(),
            paid_at: cmd.paid_at,
        })];
        // A captured payment confirms a pending order.
        if self.status == OrderStatus::Pending {
            events.push(self.status_change(
                OrderStatus::Confirmed,
                cmd.actor,
                Some("payment captured".to_string()),
                None,
                None,
                cmd.paid_at,
            )?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{ItemRequest, NewOrder, place_order};
    use crate::pricing::ShippingRates;
    use printforge_events::execute;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn prices(material: &str, size: &str) -> Option<u64> {
        match (material, size) {
            ("pla-single", "5x5x5") => Some(1500),
            ("pla-multi", "10x10x10") => Some(3200),
            _ => None,
        }
    }

    fn item(credits: u64) -> ItemRequest {
        ItemRequest {
            generation_ref: "gen-1".to_string(),
            model_ref: "models/u/j/model.glb".to_string(),
            material: "pla-single".to_string(),
            size: "5x5x5".to_string(),
            quantity: 1,
            colors: vec!["white".to_string()],
            credits_consumed: credits,
        }
    }

    fn new_order(user_id: UserId, items: Vec<ItemRequest>) -> NewOrder {
        NewOrder {
            user_id,
            items,
            shipping_address: ShippingAddress {
                recipient_name: "Lin".to_string(),
                phone: "+886 912 345 678".to_string(),
                country: "TW".to_string(),
                city: "Taipei".to_string(),
                address_line: "No. 1, Section 5, Xinyi Rd".to_string(),
                postal_code: Some("110".to_string()),
            },
            shipping_method: ShippingMethod::Standard,
            payment_method: "card".to_string(),
        }
    }

    fn placed(items: Vec<ItemRequest>) -> Order {
        let user_id = UserId::new();
        let order_id = OrderId::generate();
        let mut order = Order::empty(order_id);
        let cmd = place_order(
            order_id,
            &new_order(user_id, items),
            &prices,
            &ShippingRates::default(),
            test_time(),
        )
        .unwrap();
        execute(&mut order, &OrderCommand::PlaceOrder(cmd)).unwrap();
        order
    }

    fn admin() -> Actor {
        Actor::Admin(AdminId::new())
    }

    fn transition(order: &Order, to: OrderStatus) -> OrderCommand {
        OrderCommand::TransitionStatus(TransitionStatus {
            order_id: order.id_typed(),
            to,
            changed_by: admin(),
            reason: None,
            admin_notes: None,
            tracking: None,
            occurred_at: test_time(),
        })
    }

    /// Walk a fresh order along valid edges until it reaches `target`.
    fn order_in(target: OrderStatus) -> Order {
        use OrderStatus::*;
        let path: &[OrderStatus] = match target {
            Pending => &[],
            Confirmed => &[Confirmed],
            Printing => &[Confirmed, Printing],
            QualityCheck => &[Confirmed, Printing, QualityCheck],
            Shipping => &[Confirmed, Printing, QualityCheck, Shipping],
            Delivered => &[Confirmed, Printing, QualityCheck, Shipping, Delivered],
            Cancelled => &[Cancelled],
            Refunded => &[Cancelled, Refunded],
        };
        let mut order = placed(vec![item(5)]);
        for step in path {
            let cmd = transition(&order, *step);
            execute(&mut order, &cmd).unwrap();
        }
        assert_eq!(order.status(), target);
        order
    }

    fn cancel_by_owner(order: &Order) -> OrderCommand {
        OrderCommand::CancelOrder(CancelOrder {
            order_id: order.id_typed(),
            actor: Actor::User(order.user_id().unwrap()),
            reason: Some("changed my mind".to_string()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn placing_an_order_prices_it_in_the_destination_currency() {
        let order = placed(vec![item(5)]);

        assert_eq!(order.status(), OrderStatus::Pending);
        let payment = order.payment().unwrap();
        assert_eq!(payment.subtotal, 1500);
        assert_eq!(payment.shipping_cost, 100);
        assert_eq!(payment.total_amount, 1600);
        assert_eq!(payment.currency, Currency::Twd);
        assert_eq!(payment.status, PaymentStatus::Pending);

        let history = order.status_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, None);
        assert_eq!(history[0].to, OrderStatus::Pending);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn placing_twice_is_a_conflict() {
        let order = placed(vec![item(5)]);
        let cmd = place_order(
            order.id_typed(),
            &new_order(order.user_id().unwrap(), vec![item(5)]),
            &prices,
            &ShippingRates::default(),
            test_time(),
        )
        .unwrap();
        let err = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap_err();
        match err {
            OrderError::Domain(DomainError::Conflict(msg)) if msg.contains("exists") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn owner_cancels_during_quality_check() {
        let mut order = order_in(OrderStatus::QualityCheck);
        let before = order.status_history().len();

        let cmd = cancel_by_owner(&order);

        execute(&mut order, &cmd).unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.timestamps().cancelled_at.is_some());
        assert_eq!(order.status_history().len(), before + 1);
        let last = order.status_history().last().unwrap();
        assert_eq!(last.from, Some(OrderStatus::QualityCheck));
        assert_eq!(last.to, OrderStatus::Cancelled);
        assert_eq!(last.reason.as_deref(), Some("changed my mind"));
    }

    #[test]
    fn another_user_cannot_cancel() {
        let order = placed(vec![item(5)]);
        let cmd = OrderCommand::CancelOrder(CancelOrder {
            order_id: order.id_typed(),
            actor: Actor::User(UserId::new()),
            reason: None,
            occurred_at: test_time(),
        });
        let err = order.handle(&cmd).unwrap_err();
        assert!(matches!(
            err,
            OrderError::Domain(DomainError::PermissionDenied(_))
        ));
    }

    #[test]
    fn mark_delivered_computes_rounded_up_bonus() {
        let mut order = placed(vec![item(5), item(5)]);
        for step in [
            OrderStatus::Confirmed,
            OrderStatus::Printing,
            OrderStatus::QualityCheck,
        ] {
            let cmd = transition(&order, step);
            execute(&mut order, &cmd).unwrap();
        }
        let ship = OrderCommand::TransitionStatus(TransitionStatus {
            order_id: order.id_typed(),
            to: OrderStatus::Shipping,
            changed_by: admin(),
            reason: None,
            admin_notes: None,
            tracking: Some(Tracking {
                carrier: "sf-express".to_string(),
                tracking_number: "SF123".to_string(),
            }),
            occurred_at: test_time(),
        });
        execute(&mut order, &ship).unwrap();
        assert_eq!(order.tracking().unwrap().tracking_number, "SF123");

        let deliver = OrderCommand::MarkDelivered(MarkDelivered {
            order_id: order.id_typed(),
            admin_id: AdminId::new(),
            bonus_percent: 10,
            admin_notes: None,
            occurred_at: test_time(),
        });
        let events = execute(&mut order, &deliver).unwrap();

        assert_eq!(events.len(), 2);
        match &events[1] {
            OrderEvent::DeliveryBonusComputed(e) => assert_eq!(e.credits, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.bonus_credits_awarded(), Some(1));
        assert!(order.timestamps().delivered_at.is_some());
    }

    #[test]
    fn mark_delivered_outside_shipping_is_invalid() {
        let order = order_in(OrderStatus::Printing);
        let deliver = OrderCommand::MarkDelivered(MarkDelivered {
            order_id: order.id_typed(),
            admin_id: AdminId::new(),
            bonus_percent: 10,
            admin_notes: None,
            occurred_at: test_time(),
        });
        assert_eq!(
            order.handle(&deliver).unwrap_err(),
            OrderError::InvalidTransition {
                from: OrderStatus::Printing,
                to: OrderStatus::Delivered,
            }
        );
    }

    #[test]
    fn refund_marks_payment_refunded() {
        let mut order = order_in(OrderStatus::Cancelled);
        let cmd = OrderCommand::RefundOrder(RefundOrder {
            order_id: order.id_typed(),
            admin_id: AdminId::new(),
            reason: Some("print defect".to_string()),
            occurred_at: test_time(),
        });
        execute(&mut order, &cmd).unwrap();

        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_eq!(order.payment().unwrap().status, PaymentStatus::Refunded);
        assert!(order.timestamps().refunded_at.is_some());
    }

    #[test]
    fn refund_requires_cancelled_or_delivered() {
        let order = order_in(OrderStatus::Shipping);
        let cmd = OrderCommand::RefundOrder(RefundOrder {
            order_id: order.id_typed(),
            admin_id: AdminId::new(),
            reason: None,
            occurred_at: test_time(),
        });
        assert_eq!(
            order.handle(&cmd).unwrap_err(),
            OrderError::NotRefundable {
                status: OrderStatus::Shipping
            }
        );
    }

    #[test]
    fn confirm_payment_confirms_a_pending_order() {
        let mut order = placed(vec![item(5)]);
        let cmd = OrderCommand::ConfirmPayment(ConfirmPayment {
            order_id: order.id_typed(),
            actor: Actor::System,
            transaction_id: "pay_123".to_string(),
            paid_at: test_time(),
        });
        execute(&mut order, &cmd).unwrap();

        assert_eq!(order.status(), OrderStatus::Confirmed);
        let payment = order.payment().unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.transaction_id.as_deref(), Some("pay_123"));

        let err = order.handle(&cmd).unwrap_err();
        assert!(matches!(err, OrderError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn tracking_outside_shipping_is_rejected() {
        let order = placed(vec![item(5)]);
        let cmd = OrderCommand::TransitionStatus(TransitionStatus {
            order_id: order.id_typed(),
            to: OrderStatus::Confirmed,
            changed_by: admin(),
            reason: None,
            admin_notes: None,
            tracking: Some(Tracking {
                carrier: "dhl".to_string(),
                tracking_number: "1".to_string(),
            }),
            occurred_at: test_time(),
        });
        assert!(matches!(
            order.handle(&cmd).unwrap_err(),
            OrderError::Domain(DomainError::Validation(_))
        ));
    }

    #[test]
    fn commands_on_unplaced_order_are_not_found() {
        let order = Order::empty(OrderId::generate());
        let cmd = transition(&order, OrderStatus::Confirmed);
        assert_eq!(
            order.handle(&cmd).unwrap_err(),
            OrderError::Domain(DomainError::NotFound)
        );
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn transitions_outside_the_table_fail_and_change_nothing(
            from in any_status(),
            to in any_status(),
        ) {
            let mut order = order_in(from);
            let snapshot = order.clone();
            let result = execute(&mut order, &transition(&snapshot, to));

            if from.can_transition_to(to) {
                prop_assert!(result.is_ok());
                prop_assert_eq!(order.status(), to);
                let last = order.status_history().last().unwrap();
                prop_assert_eq!(last.to, order.status());
            } else {
                prop_assert_eq!(result.unwrap_err(), OrderError::InvalidTransition { from, to });
                prop_assert_eq!(order, snapshot);
            }
        }

        #[test]
        fn cancel_outside_cancellable_states_fails(status in any_status()) {
            let order = order_in(status);
            let result = order.handle(&cancel_by_owner(&order));
            if status.is_cancellable() {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result.unwrap_err(), OrderError::NotCancellable { status });
            }
        }
    }
}
