use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::{MAX_CONTACT_EMAIL_LEN, MAX_CONTACT_PHONE_LEN};
use crate::model::*;
use crate::observability;

use super::pricing::{self, PriceLine};
use super::validator::{validate_booking, validate_stay};
use super::{Engine, EngineError};

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub accommodation_id: Ulid,
    pub guest_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    /// Defaults to pending. Cancelled is rejected.
    pub status: Option<ReservationStatus>,
    pub contact_phone: Option<String>,
    /// Falls back to the guest account's email when absent.
    pub contact_email: Option<String>,
}

/// Partial edit. `None` keeps the current value; `Some(None)` clears a
/// contact field.
#[derive(Debug, Clone, Default)]
pub struct ReservationChanges {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
    pub status: Option<ReservationStatus>,
    pub contact_phone: Option<Option<String>>,
    pub contact_email: Option<Option<String>>,
}

impl ReservationChanges {
    pub fn status(status: ReservationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// A saved reservation with its per-night charges.
#[derive(Debug, Clone)]
pub struct Booked {
    pub reservation: Reservation,
    pub breakdown: Vec<PriceLine>,
}

/// Day records an operation will write, keyed by date. Later steps see
/// earlier ones, so a release followed by a reserve composes.
#[derive(Default)]
struct DayPlan(BTreeMap<NaiveDate, DayRecord>);

impl DayPlan {
    fn current(&self, state: &AccommodationState, date: NaiveDate) -> DayRecord {
        self.0
            .get(&date)
            .or_else(|| state.day(date))
            .copied()
            .unwrap_or_default()
    }

    /// Mark every night reserved. Prices are left untouched.
    fn reserve(&mut self, state: &AccommodationState, stay: &DateRange) {
        for date in stay.days() {
            let record = self.current(state, date).with_status(DayStatus::Reserved);
            self.0.insert(date, record);
        }
    }

    /// Hand nights back: reserved if another active reservation still
    /// holds the night, available otherwise.
    fn release(&mut self, state: &AccommodationState, stay: &DateRange, releasing: Ulid) {
        for date in stay.days() {
            let status = if state.is_reserved_on(date, Some(releasing)) {
                DayStatus::Reserved
            } else {
                DayStatus::Available
            };
            let record = self.current(state, date).with_status(status);
            self.0.insert(date, record);
        }
    }

    fn into_days(self) -> Vec<(NaiveDate, DayRecord)> {
        self.0.into_iter().collect()
    }
}

fn check_contact(phone: Option<&str>, email: Option<&str>) -> Result<(), EngineError> {
    if phone.is_some_and(|p| p.len() > MAX_CONTACT_PHONE_LEN) {
        return Err(EngineError::LimitExceeded("contact phone too long"));
    }
    if email.is_some_and(|e| e.len() > MAX_CONTACT_EMAIL_LEN) {
        return Err(EngineError::LimitExceeded("contact email too long"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn count_rejection(err: &EngineError) {
    if matches!(err, EngineError::DatesUnavailable(_)) {
        metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
    }
}

fn count_saved(op: &'static str, status: ReservationStatus) {
    metrics::counter!(
        observability::RESERVATIONS_TOTAL,
        "op" => op,
        "status" => status.as_str()
    )
    .increment(1);
}

impl Engine {
    /// Validate, price and save a new reservation, marking its nights
    /// reserved, as one step under the accommodation's write lock.
    pub async fn create_reservation(&self, req: NewReservation) -> Result<Booked, EngineError> {
        let status = req.status.unwrap_or_default();
        if !status.is_active() {
            return Err(EngineError::Invalid(
                "a reservation cannot be created as cancelled".into(),
            ));
        }
        let contact_phone = non_empty(req.contact_phone);
        let contact_email = non_empty(req.contact_email).or_else(|| {
            self.users
                .get(&req.guest_id)
                .map(|u| u.email.clone())
                .filter(|e| !e.is_empty())
        });
        check_contact(contact_phone.as_deref(), contact_email.as_deref())?;

        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.write_accommodation(&req.accommodation_id).await?;

        let today = self.clock.today();
        let stay = validate_booking(&guard, req.check_in, req.check_out, req.guests, None, today)
            .inspect_err(count_rejection)?;

        let mut plan = DayPlan::default();
        plan.reserve(&guard, &stay);

        let now = self.clock.now();
        let reservation = Reservation {
            id: Ulid::new(),
            accommodation_id: req.accommodation_id,
            guest_id: req.guest_id,
            stay,
            guests: req.guests,
            status,
            total_price: pricing::price(&guard, &stay),
            contact_phone,
            contact_email,
            created_at: now,
            updated_at: now,
        };
        let event = Event::ReservationSaved {
            reservation: reservation.clone(),
            days: plan.into_days(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        count_saved("create", status);
        tracing::info!(
            reservation = %reservation.id,
            accommodation = %reservation.accommodation_id,
            check_in = %stay.start,
            check_out = %stay.end,
            total = %reservation.total_price,
            "reservation created"
        );
        Ok(Booked {
            breakdown: pricing::breakdown(&guard, &stay),
            reservation,
        })
    }

    /// Apply a partial edit. `owner` restricts the edit to that guest's own
    /// reservations; anyone else's look missing.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        owner: Option<Ulid>,
        changes: ReservationChanges,
    ) -> Result<Booked, EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard
            .reservation(&id)
            .filter(|r| owner.is_none_or(|o| o == r.guest_id))
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;

        let status = changes.status.unwrap_or(current.status);
        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        let contact_phone = match changes.contact_phone {
            Some(v) => non_empty(v),
            None => current.contact_phone.clone(),
        };
        let contact_email = match changes.contact_email {
            Some(v) => non_empty(v),
            None => current.contact_email.clone(),
        };
        check_contact(contact_phone.as_deref(), contact_email.as_deref())?;

        let check_in = changes.check_in.unwrap_or(current.stay.start);
        let check_out = changes.check_out.unwrap_or(current.stay.end);
        let guests = changes.guests.unwrap_or(current.guests);
        let today = self.clock.today();
        // A cancelled reservation holds no nights, so only its shape is checked.
        let stay = if status.is_active() {
            validate_booking(&guard, check_in, check_out, guests, Some(id), today)
        } else {
            validate_stay(&guard, check_in, check_out, guests, today)
        }
        .inspect_err(count_rejection)?;

        let mut plan = DayPlan::default();
        if stay != current.stay {
            if current.status.is_active() {
                plan.release(&guard, &current.stay, id);
            }
            if status.is_active() {
                plan.reserve(&guard, &stay);
            }
        } else if status != current.status {
            if status.is_active() {
                plan.reserve(&guard, &stay);
            } else {
                plan.release(&guard, &stay, id);
            }
        }

        let reservation = Reservation {
            stay,
            guests,
            status,
            total_price: pricing::price(&guard, &stay),
            contact_phone,
            contact_email,
            updated_at: self.clock.now(),
            ..current.clone()
        };
        let event = Event::ReservationSaved {
            reservation: reservation.clone(),
            days: plan.into_days(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        count_saved("update", status);
        tracing::info!(
            reservation = %id,
            from_status = %current.status,
            to_status = %status,
            dates_changed = stay != current.stay,
            "reservation updated"
        );
        Ok(Booked {
            breakdown: pricing::breakdown(&guard, &stay),
            reservation,
        })
    }

    /// Release the reservation's nights and remove it.
    pub async fn delete_reservation(
        &self,
        id: Ulid,
        owner: Option<Ulid>,
    ) -> Result<Reservation, EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.resolve_reservation_write(&id).await?;
        let current = guard
            .reservation(&id)
            .filter(|r| owner.is_none_or(|o| o == r.guest_id))
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;

        // Cancelled reservations hold no nights; their dates may have been
        // reassigned since.
        let mut plan = DayPlan::default();
        if current.status.is_active() {
            plan.release(&guard, &current.stay, id);
        }
        let event = Event::ReservationDeleted {
            id,
            accommodation_id: current.accommodation_id,
            days: plan.into_days(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        count_saved("delete", current.status);
        tracing::info!(reservation = %id, accommodation = %current.accommodation_id, "reservation deleted");
        Ok(current)
    }
}
