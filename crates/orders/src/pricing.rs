//! Item pricing, shipping cost and currency selection.
//!
//! Unit prices come from an injected [`PriceLookup`]; the order aggregate never
//! knows the price matrix.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Standard,
    Express,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Cny,
    Twd,
    Usd,
}

impl Currency {
    /// Currency charged for a destination country (ISO 3166 alpha-2).
    pub fn for_country(country: &str) -> Self {
        match country.trim().to_ascii_uppercase().as_str() {
            "CN" => Currency::Cny,
            "TW" => Currency::Twd,
            _ => Currency::Usd,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Twd => "TWD",
            Currency::Usd => "USD",
        }
    }
}

/// Unit price lookup keyed by material and size.
///
/// Returns `None` when the combination is not offered.
pub trait PriceLookup {
    fn unit_price(&self, material: &str, size: &str) -> Option<u64>;
}

impl<F> PriceLookup for F
where
    F: Fn(&str, &str) -> Option<u64>,
{
    fn unit_price(&self, material: &str, size: &str) -> Option<u64> {
        self(material, size)
    }
}

/// Flat shipping cost per destination country, in the destination currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRates {
    pub by_country: BTreeMap<String, u64>,
    pub fallback: u64,
    pub express_multiplier: u64,
}

impl Default for ShippingRates {
    fn default() -> Self {
        let mut by_country = BTreeMap::new();
        by_country.insert("TW".to_string(), 100);
        by_country.insert("CN".to_string(), 20);
        Self {
            by_country,
            fallback: 30,
            express_multiplier: 2,
        }
    }
}

impl ShippingRates {
    pub fn cost(&self, country: &str, method: ShippingMethod) -> u64 {
        let base = self
            .by_country
            .get(&country.trim().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.fallback);
        match method {
            ShippingMethod::Standard => base,
            ShippingMethod::Express => base.saturating_mul(self.express_multiplier),
        }
    }
}

/// Priced totals for an order at placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub currency: Currency,
    pub subtotal: u64,
    pub shipping_cost: u64,
    pub total_amount: u64,
}
