use std::sync::Arc;

use serde::{Deserialize, Serialize};

use printforge_core::{ExpectedVersion, UserId};
use printforge_orders::{Order, OrderId, OrderStatus};

use super::snapshot::InMemorySnapshotStore;
use super::{Page, Pagination, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.is_none_or(|u| order.user_id() == Some(u))
            && self.status.is_none_or(|s| order.status() == s)
    }
}

/// Order persistence port.
pub trait OrderRepository: Send + Sync {
    fn insert(&self, order: &Order) -> Result<(), StoreError>;

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    fn list(&self, filter: &OrderFilter, page: Pagination) -> Result<Page<Order>, StoreError>;
}

impl<S> OrderRepository for Arc<S>
where
    S: OrderRepository + ?Sized,
{
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).save(order, expected)
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get(order_id)
    }

    fn list(&self, filter: &OrderFilter, page: Pagination) -> Result<Page<Order>, StoreError> {
        (**self).list(filter, page)
    }
}

impl OrderRepository for InMemorySnapshotStore<OrderId, Order> {
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        InMemorySnapshotStore::insert(self, order)
    }

    fn save(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        InMemorySnapshotStore::save(self, order, expected)
    }

    fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        InMemorySnapshotStore::get(self, &order_id)
    }

    fn list(&self, filter: &OrderFilter, page: Pagination) -> Result<Page<Order>, StoreError> {
        let mut orders = self.select(|o| filter.matches(o))?;
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(page.apply(orders))
    }
}
