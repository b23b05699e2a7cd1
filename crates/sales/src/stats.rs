use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pharmacore_core::{DomainError, DomainResult};

use crate::sale::Sale;

/// Units sold and revenue for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub quantity: i64,
    pub revenue: Decimal,
}

/// Per-day totals for the `days` days ending at `today`, oldest first.
///
/// Days without sales are present with zeros. Sales outside the window are
/// ignored. Fails if a day's units or revenue overflow.
pub fn daily_totals(sales: &[Sale], today: NaiveDate, days: u32) -> DomainResult<Vec<DailySales>> {
    let mut out: Vec<DailySales> = (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
        .map(|date| DailySales {
            date,
            quantity: 0,
            revenue: Decimal::ZERO,
        })
        .collect();

    for sale in sales {
        let day = sale.created_at.date_naive();
        if let Some(slot) = out.iter_mut().find(|d| d.date == day) {
            let overflow = || DomainError::validation(format!("sales on {day} overflow"));
            slot.quantity = slot.quantity.checked_add(sale.total_quantity()).ok_or_else(overflow)?;
            slot.revenue = slot.revenue.checked_add(sale.total_amount).ok_or_else(overflow)?;
        }
    }

    Ok(out)
}
