use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{AccommodationState, DateRange, DayStatus};

use super::resolver::resolve_range;

/// One night of a stay as charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLine {
    pub date: NaiveDate,
    pub price: Decimal,
    pub status: DayStatus,
    pub is_custom_price: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub nights: u64,
    pub total: Decimal,
    pub lines: Vec<PriceLine>,
}

/// Sum of each night's effective price. An empty range costs zero.
pub fn price(state: &AccommodationState, stay: &DateRange) -> Decimal {
    resolve_range(state, stay).map(|day| day.price).sum()
}

pub fn breakdown(state: &AccommodationState, stay: &DateRange) -> Vec<PriceLine> {
    resolve_range(state, stay)
        .map(|day| PriceLine {
            date: day.date,
            price: day.price,
            status: day.status(),
            is_custom_price: day.has_custom_price,
        })
        .collect()
}

pub fn quote(state: &AccommodationState, stay: &DateRange) -> Quote {
    let lines = breakdown(state, stay);
    Quote {
        nights: stay.nights(),
        total: lines.iter().map(|l| l.price).sum(),
        lines,
    }
}
