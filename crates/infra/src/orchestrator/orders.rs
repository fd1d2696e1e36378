//! Print orders and the credit operations exposed next to them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use printforge_core::{Actor, AggregateRoot, ExpectedVersion, UserId};
use printforge_events::execute;
use printforge_ledger::TransactionRecord;
use printforge_orders::{
    CancelOrder, ConfirmPayment, MarkDelivered, NewOrder, Order, OrderCommand, OrderEvent,
    OrderId, OrderStatus, RefundOrder, Tracking, TransitionStatus, place_order,
};

use super::{Orchestrator, ensure_may_act_for};
use crate::error::ServiceError;
use crate::ledger::CreditOutcome;
use crate::store::{OrderFilter, Page, Pagination};

/// Bonus reason; one delivery bonus per order.
pub const DELIVERY_BONUS_REASON: &str = "delivery_bonus";

/// Admin status change with its optional annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: OrderStatus,
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
    pub tracking: Option<Tracking>,
}

impl TransitionRequest {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            to: status,
            reason: None,
            admin_notes: None,
            tracking: None,
        }
    }
}

impl Orchestrator {
    /// Validate, price and persist a new order in `pending`.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, items = request.items.len()), err)]
    pub fn create_order(&self, actor: &Actor, request: NewOrder) -> Result<Order, ServiceError> {
        ensure_may_act_for(actor, Some(request.user_id))?;

        let order_id = OrderId::generate();
        let cmd = OrderCommand::PlaceOrder(place_order(
            order_id,
            &request,
            self.prices.as_ref(),
            &self.config.shipping_rates,
            Utc::now(),
        )?);
        let mut order = Order::empty(order_id);
        let events = execute(&mut order, &cmd)?;
        self.orders.insert(&order)?;
        self.publish(request.user_id, &order_id.to_string(), &events);

        info!(
            order_id = %order_id,
            total = order.payment().map(|p| p.total_amount),
            "order placed"
        );
        Ok(order)
    }

    /// Admin-driven status change.
    ///
    /// `delivered` also grants the delivery bonus; `refunded` also marks the
    /// payment refunded.
    #[instrument(skip(self, request), fields(order_id = %order_id, to = %request.to), err)]
    pub fn transition_order_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        request: TransitionRequest,
    ) -> Result<Order, ServiceError> {
        let admin_id = actor.require_admin()?;
        let order = self.load_order(order_id)?;

        match request.to {
            OrderStatus::Delivered => {
                let cmd = OrderCommand::MarkDelivered(MarkDelivered {
                    order_id,
                    admin_id,
                    bonus_percent: self.config.delivery_bonus_percent,
                    admin_notes: request.admin_notes,
                    occurred_at: Utc::now(),
                });
                let (order, events) = self.apply_order(&order, &cmd)?;
                self.grant_delivery_bonus(&events);
                Ok(order)
            }
            OrderStatus::Refunded => {
                let cmd = OrderCommand::RefundOrder(RefundOrder {
                    order_id,
                    admin_id,
                    reason: request.reason,
                    occurred_at: Utc::now(),
                });
                Ok(self.apply_order(&order, &cmd)?.0)
            }
            to => {
                let cmd = OrderCommand::TransitionStatus(TransitionStatus {
                    order_id,
                    to,
                    changed_by: *actor,
                    reason: request.reason,
                    admin_notes: request.admin_notes,
                    tracking: request.tracking,
                    occurred_at: Utc::now(),
                });
                Ok(self.apply_order(&order, &cmd)?.0)
            }
        }
    }

    /// Owner (or admin) cancellation while the order is still cancellable.
    #[instrument(skip(self, reason), fields(order_id = %order_id), err)]
    pub fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, ServiceError> {
        let order = self.load_order(order_id)?;
        ensure_may_act_for(actor, order.user_id())?;

        let cmd = OrderCommand::CancelOrder(CancelOrder {
            order_id,
            actor: *actor,
            reason,
            occurred_at: Utc::now(),
        });
        Ok(self.apply_order(&order, &cmd)?.0)
    }

    #[instrument(skip(self, reason), fields(order_id = %order_id), err)]
    pub fn refund_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, ServiceError> {
        self.transition_order_status(
            actor,
            order_id,
            TransitionRequest {
                reason,
                ..TransitionRequest::to(OrderStatus::Refunded)
            },
        )
    }

    /// Record a captured payment. Only the payment gateway (system) or an admin
    /// may confirm.
    #[instrument(skip(self, transaction_id), fields(order_id = %order_id), err)]
    pub fn confirm_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        transaction_id: String,
    ) -> Result<Order, ServiceError> {
        if actor.user_id().is_some() {
            return Err(ServiceError::PermissionDenied(
                "users cannot confirm payments".to_string(),
            ));
        }
        let order = self.load_order(order_id)?;
        let cmd = OrderCommand::ConfirmPayment(ConfirmPayment {
            order_id,
            actor: *actor,
            transaction_id,
            paid_at: Utc::now(),
        });
        Ok(self.apply_order(&order, &cmd)?.0)
    }

    pub fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, ServiceError> {
        let order = self.load_order(order_id)?;
        ensure_may_act_for(actor, order.user_id())?;
        Ok(order)
    }

    /// Users only ever see their own orders.
    pub fn list_orders(
        &self,
        actor: &Actor,
        mut filter: OrderFilter,
        page: Pagination,
    ) -> Result<Page<Order>, ServiceError> {
        if let Some(user_id) = actor.user_id() {
            filter.user_id = Some(user_id);
        }
        Ok(self.orders.list(&filter, page)?)
    }

    /// Admin correction of a user's balance.
    #[instrument(skip(self, reason), fields(user_id = %user_id), err)]
    pub fn credit_adjust(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: i64,
        reason: &str,
    ) -> Result<TransactionRecord, ServiceError> {
        let admin_id = actor.require_admin()?;
        self.ledger.adjust(user_id, amount, admin_id, reason)
    }

    /// Credit a completed purchase. Replays of the same `reference` are no-ops.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub fn credit_purchase(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: u64,
        reference: &str,
    ) -> Result<CreditOutcome, ServiceError> {
        if actor.user_id().is_some() {
            return Err(ServiceError::PermissionDenied(
                "users cannot record purchases".to_string(),
            ));
        }
        self.ledger.purchase(user_id, amount, reference)
    }

    pub fn credit_balance(&self, actor: &Actor, user_id: UserId) -> Result<u64, ServiceError> {
        ensure_may_act_for(actor, Some(user_id))?;
        self.ledger.balance(user_id)
    }

    pub fn credit_history(
        &self,
        actor: &Actor,
        user_id: UserId,
        page: Pagination,
    ) -> Result<Page<TransactionRecord>, ServiceError> {
        ensure_may_act_for(actor, Some(user_id))?;
        self.ledger.transactions(user_id, page)
    }

    fn load_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)?
            .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))
    }

    fn apply_order(
        &self,
        order: &Order,
        cmd: &OrderCommand,
    ) -> Result<(Order, Vec<OrderEvent>), ServiceError> {
        let mut next = order.clone();
        let events = execute(&mut next, cmd)?;
        self.orders
            .save(&next, ExpectedVersion::Exact(order.version()))?;
        if let Some(user_id) = next.user_id() {
            self.publish(user_id, &next.id_typed().to_string(), &events);
        }
        Ok((next, events))
    }

    /// The order is already delivered; a failed grant is logged, not rolled back.
    fn grant_delivery_bonus(&self, events: &[OrderEvent]) {
        for event in events {
            let OrderEvent::DeliveryBonusComputed(bonus) = event else {
                continue;
            };
            if bonus.credits == 0 {
                continue;
            }
            if let Err(err) = self.ledger.grant_bonus(
                bonus.user_id,
                bonus.credits,
                &bonus.order_id.to_string(),
                DELIVERY_BONUS_REASON,
            ) {
                error!(
                    order_id = %bonus.order_id,
                    credits = bonus.credits,
                    error = %err,
                    "delivery bonus not granted"
                );
            }
        }
    }
}
