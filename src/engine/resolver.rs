//! Effective price and status of a single date.
//!
//! Every read path (calendar, pricing, validation) goes through here so the
//! "no record means available at the default price" rule lives in one place.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{AccommodationState, DateRange, DayStatus};

/// Where a date's status comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "status", rename_all = "snake_case")]
pub enum ResolvedStatus {
    /// No day record.
    Default,
    /// A record exists and says `available`.
    ExplicitAvailable,
    /// A record with any other status.
    ExplicitOverride(DayStatus),
}

impl ResolvedStatus {
    pub fn status(&self) -> DayStatus {
        match self {
            ResolvedStatus::Default | ResolvedStatus::ExplicitAvailable => DayStatus::Available,
            ResolvedStatus::ExplicitOverride(status) => *status,
        }
    }

    pub fn is_explicit(&self) -> bool {
        !matches!(self, ResolvedStatus::Default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDay {
    pub date: NaiveDate,
    pub price: Decimal,
    pub has_custom_price: bool,
    pub resolved: ResolvedStatus,
    /// An active reservation covers this date.
    pub is_reserved: bool,
}

impl ResolvedDay {
    pub fn status(&self) -> DayStatus {
        self.resolved.status()
    }

    /// Free to book: status `available` and no active reservation on it.
    pub fn is_available(&self) -> bool {
        self.status() == DayStatus::Available && !self.is_reserved
    }

    /// Status as shown on the calendar. Dates without a record show
    /// `reserved` while a reservation covers them.
    pub fn calendar_status(&self) -> DayStatus {
        match self.resolved {
            ResolvedStatus::Default if self.is_reserved => DayStatus::Reserved,
            other => other.status(),
        }
    }
}

pub fn resolve_day(state: &AccommodationState, date: NaiveDate) -> ResolvedDay {
    let record = state.day(date);
    let resolved = match record {
        None => ResolvedStatus::Default,
        Some(r) if r.status == DayStatus::Available => ResolvedStatus::ExplicitAvailable,
        Some(r) => ResolvedStatus::ExplicitOverride(r.status),
    };
    let custom = record.and_then(|r| r.price);
    ResolvedDay {
        date,
        price: custom.unwrap_or(state.info.default_price),
        has_custom_price: custom.is_some(),
        resolved,
        is_reserved: state.is_reserved_on(date, None),
    }
}

pub fn resolve_range<'a>(
    state: &'a AccommodationState,
    range: &DateRange,
) -> impl Iterator<Item = ResolvedDay> + 'a {
    range.days().map(move |date| resolve_day(state, date))
}

/// Dates from `from` on that a guest cannot book: nights held by active
/// reservations plus dates with any non-available day record. Sorted, unique.
pub fn unavailable_dates(state: &AccommodationState, from: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();
    for reservation in state.reservations.iter().filter(|r| r.is_active()) {
        dates.extend(reservation.stay.days().filter(|d| *d >= from));
    }
    dates.extend(
        state
            .days
            .range(from..)
            .filter(|(_, record)| record.status != DayStatus::Available)
            .map(|(date, _)| *date),
    );
    dates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Accommodation, DayRecord, Reservation, ReservationStatus};
    use ulid::Ulid;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn state(default_price: i64) -> AccommodationState {
        AccommodationState::new(Accommodation {
            id: Ulid::new(),
            title: "Cabin".into(),
            city: "Rasht".into(),
            province: "Gilan".into(),
            address: String::new(),
            description: String::new(),
            capacity: 4,
            default_price: Decimal::from(default_price),
            created_at: chrono::Utc::now(),
        })
    }

    fn reservation(state: &AccommodationState, from: &str, to: &str, status: ReservationStatus) -> Reservation {
        let now = chrono::Utc::now();
        Reservation {
            id: Ulid::new(),
            accommodation_id: state.info.id,
            guest_id: Ulid::new(),
            stay: DateRange::new(d(from), d(to)).unwrap(),
            guests: 2,
            status,
            total_price: Decimal::ZERO,
            contact_phone: None,
            contact_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_record_uses_defaults() {
        let s = state(100);
        let day = resolve_day(&s, d("2025-06-01"));
        assert_eq!(day.price, Decimal::from(100));
        assert!(!day.has_custom_price);
        assert_eq!(day.resolved, ResolvedStatus::Default);
        assert!(day.is_available());
    }

    #[test]
    fn record_without_price_keeps_default_price() {
        let mut s = state(100);
        s.set_day(d("2025-06-01"), DayRecord { price: None, status: DayStatus::Blocked });
        let day = resolve_day(&s, d("2025-06-01"));
        assert_eq!(day.price, Decimal::from(100));
        assert_eq!(day.resolved, ResolvedStatus::ExplicitOverride(DayStatus::Blocked));
        assert!(!day.is_available());
    }

    #[test]
    fn explicit_available_is_distinguishable_from_default() {
        let mut s = state(100);
        s.set_day(d("2025-06-01"), DayRecord { price: Some(Decimal::from(150)), status: DayStatus::Available });
        let day = resolve_day(&s, d("2025-06-01"));
        assert_eq!(day.resolved, ResolvedStatus::ExplicitAvailable);
        assert!(day.resolved.is_explicit());
        assert_eq!(day.price, Decimal::from(150));
        assert!(day.has_custom_price);
    }

    #[test]
    fn reservation_without_record_marks_day_reserved() {
        let mut s = state(100);
        let r = reservation(&s, "2025-06-01", "2025-06-03", ReservationStatus::Pending);
        s.upsert_reservation(r);
        let day = resolve_day(&s, d("2025-06-02"));
        assert!(day.is_reserved);
        assert_eq!(day.status(), DayStatus::Available);
        assert_eq!(day.calendar_status(), DayStatus::Reserved);
        assert!(!day.is_available());
        assert!(!resolve_day(&s, d("2025-06-03")).is_reserved);
    }

    #[test]
    fn unavailable_dates_unions_reservations_and_overrides() {
        let mut s = state(100);
        let active = reservation(&s, "2025-06-01", "2025-06-04", ReservationStatus::Confirmed);
        let cancelled = reservation(&s, "2025-06-10", "2025-06-12", ReservationStatus::Cancelled);
        s.upsert_reservation(active);
        s.upsert_reservation(cancelled);
        s.set_day(d("2025-06-03"), DayRecord { price: None, status: DayStatus::Reserved });
        s.set_day(d("2025-06-08"), DayRecord { price: None, status: DayStatus::UnderMaintenance });
        s.set_day(d("2025-06-09"), DayRecord { price: Some(Decimal::from(90)), status: DayStatus::Available });
        s.set_day(d("2025-05-20"), DayRecord { price: None, status: DayStatus::Blocked });

        let dates = unavailable_dates(&s, d("2025-06-02"));
        assert_eq!(dates, vec![d("2025-06-02"), d("2025-06-03"), d("2025-06-08")]);
    }

    #[test]
    fn resolve_range_is_half_open() {
        let s = state(100);
        let range = DateRange::new(d("2025-06-01"), d("2025-06-03")).unwrap();
        let dates: Vec<_> = resolve_range(&s, &range).map(|r| r.date).collect();
        assert_eq!(dates, vec![d("2025-06-01"), d("2025-06-02")]);
    }
}
