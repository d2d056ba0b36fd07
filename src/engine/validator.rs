use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_STAY_NIGHTS;
use crate::model::{AccommodationState, DateRange};

use super::error::{DateConflict, EngineError};

/// Check a prospective stay against one accommodation.
///
/// Rules apply in order and the first failing rule wins; date conflicts are
/// collected for every night before failing. `exclude` is the reservation
/// being edited so it never conflicts with itself.
pub fn validate_booking(
    state: &AccommodationState,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    exclude: Option<Ulid>,
    today: NaiveDate,
) -> Result<DateRange, EngineError> {
    let stay = validate_stay(state, check_in, check_out, guests, today)?;
    let conflicts = collect_conflicts(state, &stay, exclude);
    if !conflicts.is_empty() {
        return Err(EngineError::DatesUnavailable(conflicts));
    }
    Ok(stay)
}

/// Range, past check-in and guest count rules without looking at other
/// bookings. Used on its own for reservations that hold no dates.
pub fn validate_stay(
    state: &AccommodationState,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guests: u32,
    today: NaiveDate,
) -> Result<DateRange, EngineError> {
    if check_out <= check_in {
        return Err(EngineError::InvalidDateRange);
    }
    let stay = DateRange {
        start: check_in,
        end: check_out,
    };
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    if check_in < today {
        return Err(EngineError::CheckInInPast(check_in));
    }
    if guests == 0 {
        return Err(EngineError::Invalid("at least one guest is required".into()));
    }
    if guests > state.info.capacity {
        return Err(EngineError::CapacityExceeded {
            guests,
            capacity: state.info.capacity,
        });
    }
    Ok(stay)
}

/// Per-night conflicts in date order.
///
/// An administrative status other than available/reserved blocks the night.
/// Otherwise the night is taken only if another active reservation holds it;
/// a stale `reserved` record with nobody behind it stays bookable.
pub fn collect_conflicts(
    state: &AccommodationState,
    stay: &DateRange,
    exclude: Option<Ulid>,
) -> Vec<DateConflict> {
    let held: Vec<DateRange> = state
        .active_overlapping(stay, exclude)
        .map(|r| r.stay)
        .collect();

    stay.days()
        .filter_map(|date| match state.day(date) {
            Some(record) if !record.status.permits_booking() => {
                Some(DateConflict::from_status(date, record.status))
            }
            _ if held.iter().any(|h| h.contains(date)) => Some(DateConflict::reserved(date)),
            _ => None,
        })
        .collect()
}
