//! Order creation: request validation and pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_core::{DomainError, UserId};

use crate::error::OrderError;
use crate::order::{OrderId, OrderItem, PlaceOrder, ShippingAddress};
use crate::pricing::{Currency, PriceLookup, Quote, ShippingMethod, ShippingRates};

/// Item as submitted by the user, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub generation_ref: String,
    pub model_ref: String,
    pub material: String,
    pub size: String,
    pub quantity: u32,
    pub colors: Vec<String>,
    pub credits_consumed: u64,
}

/// Order request as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<ItemRequest>,
    pub shipping_address: ShippingAddress,
    pub shipping_method: ShippingMethod,
    pub payment_method: String,
}

fn require(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn validate_address(address: &ShippingAddress) -> Result<(), DomainError> {
    require(&address.recipient_name, "shipping_address.recipient_name")?;
    require(&address.phone, "shipping_address.phone")?;
    require(&address.country, "shipping_address.country")?;
    require(&address.city, "shipping_address.city")?;
    require(&address.address_line, "shipping_address.address_line")
}

fn price_item(
    index: usize,
    item: &ItemRequest,
    prices: &dyn PriceLookup,
) -> Result<OrderItem, DomainError> {
    require(&item.generation_ref, &format!("items[{index}].generation_ref"))?;
    require(&item.model_ref, &format!("items[{index}].model_ref"))?;
    if item.quantity == 0 {
        return Err(DomainError::validation(format!(
            "items[{index}].quantity must be at least 1"
        )));
    }
    if item.colors.iter().all(|c| c.trim().is_empty()) {
        return Err(DomainError::validation(format!(
            "items[{index}] needs at least one color"
        )));
    }

    let unit_price = prices
        .unit_price(&item.material, &item.size)
        .ok_or_else(|| {
            DomainError::validation(format!(
                "no price for material {} in size {}",
                item.material, item.size
            ))
        })?;
    let line_total = unit_price
        .checked_mul(u64::from(item.quantity))
        .ok_or_else(|| DomainError::validation(format!("items[{index}] total overflows")))?;

    Ok(OrderItem {
        generation_ref: item.generation_ref.clone(),
        model_ref: item.model_ref.clone(),
        material: item.material.clone(),
        size: item.size.clone(),
        quantity: item.quantity,
        colors: item.colors.clone(),
        unit_price,
        line_total,
        credits_consumed: item.credits_consumed,
    })
}

/// Validate and price a request, producing the `PlaceOrder` command.
pub fn place_order(
    order_id: OrderId,
    request: &NewOrder,
    prices: &dyn PriceLookup,
    rates: &ShippingRates,
    occurred_at: DateTime<Utc>,
) -> Result<PlaceOrder, OrderError> {
    if request.items.is_empty() {
        return Err(DomainError::validation("order must contain at least one item").into());
    }
    validate_address(&request.shipping_address)?;

    let items = request
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| price_item(i, item, prices))
        .collect::<Result<Vec<_>, _>>()?;

    let subtotal = items
        .iter()
        .try_fold(0u64, |acc, i| acc.checked_add(i.line_total))
        .ok_or_else(|| DomainError::validation("order subtotal overflows"))?;
    let country = &request.shipping_address.country;
    let shipping_cost = rates.cost(country, request.shipping_method);

    Ok(PlaceOrder {
        order_id,
        user_id: request.user_id,
        items,
        shipping_address: request.shipping_address.clone(),
        shipping_method: request.shipping_method,
        payment_method: request.payment_method.clone(),
        quote: Quote {
            currency: Currency::for_country(country),
            subtotal,
            shipping_cost,
            total_amount: subtotal.saturating_add(shipping_cost),
        },
        occurred_at,
    })
}
