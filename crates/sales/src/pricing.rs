//! Unit pricing for sale items.
//!
//! Allocation decides *which* batch is sold; pricing only decides *how much*
//! a unit from that batch costs the customer.

use rust_decimal::{Decimal, RoundingStrategy};

use pharmacore_core::{DomainError, DomainResult};

pub trait PricingPolicy: Send + Sync + core::fmt::Debug {
    /// Unit sale price for stock bought at `cost_price`.
    ///
    /// Fails with `Validation` when the price is not representable.
    fn unit_price(&self, cost_price: Decimal) -> DomainResult<Decimal>;
}

/// Fixed markup over cost, with a floor price for stock carried at zero cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupPricing {
    markup: Decimal,
    floor_price: Decimal,
}

impl MarkupPricing {
    pub fn default_markup() -> Decimal {
        Decimal::new(15, 1)
    }

    pub fn default_floor_price() -> Decimal {
        Decimal::ONE
    }

    pub fn new(markup: Decimal, floor_price: Decimal) -> DomainResult<Self> {
        if markup <= Decimal::ZERO {
            return Err(DomainError::validation("markup must be positive"));
        }
        if floor_price <= Decimal::ZERO {
            return Err(DomainError::validation("floor price must be positive"));
        }
        Ok(Self { markup, floor_price })
    }

    pub fn markup(&self) -> Decimal {
        self.markup
    }

    pub fn floor_price(&self) -> Decimal {
        self.floor_price
    }
}

impl Default for MarkupPricing {
    fn default() -> Self {
        Self {
            markup: Self::default_markup(),
            floor_price: Self::default_floor_price(),
        }
    }
}

impl PricingPolicy for MarkupPricing {
    fn unit_price(&self, cost_price: Decimal) -> DomainResult<Decimal> {
        if cost_price <= Decimal::ZERO {
            return Ok(self.floor_price);
        }
        cost_price
            .checked_mul(self.markup)
            .map(|price| price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            .ok_or_else(|| DomainError::validation(format!("unit price for cost {cost_price} overflows")))
    }
}
