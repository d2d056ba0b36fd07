use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

#[derive(Debug, Clone)]
pub struct NewAccommodation {
    pub title: String,
    pub city: String,
    pub province: String,
    pub address: String,
    pub description: String,
    pub capacity: u32,
    pub default_price: Decimal,
}

/// One administrative status (and optional price) over `[start, end)`.
#[derive(Debug, Clone)]
pub struct BulkDays {
    pub accommodation_id: Ulid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: DayStatus,
    pub price: Option<Decimal>,
    /// Replace existing records; when false they are left alone.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl BulkOutcome {
    pub fn count(&self) -> usize {
        self.created + self.updated
    }
}

fn check_text(title: &str, fields: &[&str]) -> Result<(), EngineError> {
    if title.trim().is_empty() {
        return Err(EngineError::Invalid("title is required".into()));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if fields.iter().any(|f| f.len() > MAX_TEXT_LEN) {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    Ok(())
}

fn check_price(price: Decimal) -> Result<(), EngineError> {
    if price.is_sign_negative() {
        return Err(EngineError::Invalid("price must not be negative".into()));
    }
    Ok(())
}

fn check_accommodation(acc: &Accommodation) -> Result<(), EngineError> {
    check_text(
        &acc.title,
        &[&acc.city, &acc.province, &acc.address, &acc.description],
    )?;
    if acc.capacity == 0 {
        return Err(EngineError::Invalid("capacity must be at least 1".into()));
    }
    check_price(acc.default_price)
}

impl Engine {
    pub async fn create_accommodation(
        &self,
        new: NewAccommodation,
    ) -> Result<Accommodation, EngineError> {
        let accommodation = Accommodation {
            id: Ulid::new(),
            title: new.title.trim().to_string(),
            city: new.city,
            province: new.province,
            address: new.address,
            description: new.description,
            capacity: new.capacity,
            default_price: new.default_price,
            created_at: self.clock.now(),
        };
        check_accommodation(&accommodation)?;

        let _shared = self.snapshot_gate.read().await;
        let event = Event::AccommodationCreated {
            accommodation: accommodation.clone(),
        };
        self.wal_append(&event).await?;
        let state = AccommodationState::new(accommodation.clone());
        self.accommodations
            .insert(accommodation.id, Arc::new(RwLock::new(state)));
        metrics::gauge!(observability::ACCOMMODATIONS).set(self.accommodations.len() as f64);

        tracing::info!(accommodation = %accommodation.id, title = %accommodation.title, "accommodation created");
        Ok(accommodation)
    }

    /// Edit descriptive fields. Existing reservations keep the price they
    /// were saved with.
    pub async fn update_accommodation(
        &self,
        id: Ulid,
        patch: AccommodationPatch,
    ) -> Result<Accommodation, EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.write_accommodation(&id).await?;
        let mut accommodation = guard.info.clone();
        patch.apply(&mut accommodation);
        accommodation.title = accommodation.title.trim().to_string();
        check_accommodation(&accommodation)?;

        let event = Event::AccommodationUpdated {
            accommodation: accommodation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(accommodation)
    }

    /// Remove the accommodation with its day records and reservations.
    /// Returns how many reservations went with it.
    pub async fn delete_accommodation(&self, id: Ulid) -> Result<usize, EngineError> {
        let _shared = self.snapshot_gate.read().await;
        let guard = self.write_accommodation(&id).await?;

        let event = Event::AccommodationDeleted { id };
        self.wal_append(&event).await?;
        self.unindex_reservations(&guard);
        let removed = guard.reservations.len();
        // Unregister before releasing the lock so queued writers see it gone.
        self.accommodations.remove(&id);
        drop(guard);
        metrics::gauge!(observability::ACCOMMODATIONS).set(self.accommodations.len() as f64);

        tracing::info!(accommodation = %id, reservations = removed, "accommodation deleted");
        Ok(removed)
    }

    /// Upsert the record for a single date.
    pub async fn set_day_record(
        &self,
        accommodation_id: Ulid,
        date: NaiveDate,
        status: DayStatus,
        price: Option<Decimal>,
    ) -> Result<DayRecord, EngineError> {
        if let Some(p) = price {
            check_price(p)?;
        }
        let record = DayRecord { price, status };

        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.write_accommodation(&accommodation_id).await?;
        let event = Event::DaysSet {
            accommodation_id,
            days: vec![(date, record)],
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(record)
    }

    /// Upsert one record per date in `[start, end)` as a single WAL record.
    pub async fn bulk_set_days(&self, bulk: BulkDays) -> Result<BulkOutcome, EngineError> {
        if bulk.end <= bulk.start {
            return Err(EngineError::Invalid("end date must be after start date".into()));
        }
        let range = DateRange {
            start: bulk.start,
            end: bulk.end,
        };
        if range.nights() > MAX_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        if let Some(p) = bulk.price {
            check_price(p)?;
        }
        let record = DayRecord {
            price: bulk.price,
            status: bulk.status,
        };

        let _shared = self.snapshot_gate.read().await;
        let mut guard = self.write_accommodation(&bulk.accommodation_id).await?;

        let mut outcome = BulkOutcome::default();
        let mut days = Vec::with_capacity(range.days().len());
        for date in range.days() {
            match guard.day(date) {
                None => outcome.created += 1,
                Some(_) if bulk.overwrite => outcome.updated += 1,
                Some(_) => {
                    outcome.skipped += 1;
                    continue;
                }
            }
            days.push((date, record));
        }
        if !days.is_empty() {
            let event = Event::DaysSet {
                accommodation_id: bulk.accommodation_id,
                days,
            };
            self.persist_and_apply(&mut guard, &event).await?;
        }

        tracing::info!(
            accommodation = %bulk.accommodation_id,
            start = %bulk.start,
            end = %bulk.end,
            status = %bulk.status,
            created = outcome.created,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "day records written"
        );
        Ok(outcome)
    }
}
