use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use ulid::Ulid;

use crate::limits::MAX_RANGE_DAYS;
use crate::model::*;

use super::pricing::{self, PriceLine};
use super::resolver;
use super::{Engine, EngineError};

/// One calendar cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub price: Decimal,
    pub default_price: Decimal,
    pub status: DayStatus,
    pub is_available: bool,
    pub is_reserved: bool,
    pub has_custom_price: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub guest_id: Option<Ulid>,
    pub accommodation_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    fn matches(&self, r: &Reservation) -> bool {
        self.guest_id.is_none_or(|g| g == r.guest_id)
            && self.accommodation_id.is_none_or(|a| a == r.accommodation_id)
            && self.status.is_none_or(|s| s == r.status)
    }
}

fn query_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    let range = DateRange::new(start, end)
        .map_err(|e| EngineError::Invalid(e.to_string()))?;
    if range.nights() > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(range)
}

impl Engine {
    pub async fn accommodation(&self, id: &Ulid) -> Option<Accommodation> {
        let shared = self.get_accommodation(id)?;
        let guard = shared.read().await;
        Some(guard.info.clone())
    }

    /// All accommodations, oldest first.
    pub async fn list_accommodations(&self) -> Vec<Accommodation> {
        let shared: Vec<_> = self
            .accommodations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut out = Vec::with_capacity(shared.len());
        for acc in shared {
            out.push(acc.read().await.info.clone());
        }
        out.sort_by_key(|a| (a.created_at, a.id));
        out
    }

    /// Resolved price and status for each date in `[start, end)`.
    pub async fn calendar(
        &self,
        accommodation_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarDay>, EngineError> {
        let range = query_range(start, end)?;
        let guard = self.read_accommodation(&accommodation_id).await?;
        let default_price = guard.info.default_price;
        Ok(resolver::resolve_range(&guard, &range)
            .map(|day| CalendarDay {
                date: day.date,
                price: day.price,
                default_price,
                status: day.calendar_status(),
                is_available: day.is_available(),
                is_reserved: day.is_reserved,
                has_custom_price: day.has_custom_price,
            })
            .collect())
    }

    /// Dates from today on that cannot be booked.
    pub async fn unavailable_dates(
        &self,
        accommodation_id: Ulid,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let guard = self.read_accommodation(&accommodation_id).await?;
        Ok(resolver::unavailable_dates(&guard, self.clock.today()))
    }

    /// Stored day records in `[start, end)`; dates without a record are omitted.
    pub async fn day_records(
        &self,
        accommodation_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, DayRecord)>, EngineError> {
        let range = query_range(start, end)?;
        let guard = self.read_accommodation(&accommodation_id).await?;
        Ok(guard
            .days
            .range(range.start..range.end)
            .map(|(d, r)| (*d, *r))
            .collect())
    }

    /// A reservation and its current per-night breakdown. `owner` hides
    /// other guests' reservations.
    pub async fn reservation(
        &self,
        id: Ulid,
        owner: Option<Ulid>,
    ) -> Result<(Reservation, Vec<PriceLine>), EngineError> {
        let accommodation_id = self
            .accommodation_for_reservation(&id)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        let guard = self.read_accommodation(&accommodation_id).await?;
        let reservation = guard
            .reservation(&id)
            .filter(|r| owner.is_none_or(|o| o == r.guest_id))
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        let lines = pricing::breakdown(&guard, &reservation.stay);
        Ok((reservation, lines))
    }

    /// Matching reservations, newest first.
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        let shared: Vec<_> = match filter.accommodation_id {
            Some(id) => self.get_accommodation(&id).into_iter().collect(),
            None => self
                .accommodations
                .iter()
                .map(|e| e.value().clone())
                .collect(),
        };
        let mut out = Vec::new();
        for acc in shared {
            let guard = acc.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }
}
