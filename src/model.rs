use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open day range `[start, end)`.
///
/// Every component walks dates through [`DateRange::days`], so resolver,
/// validator, pricing and lifecycle all agree on the same convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Returned when `end < start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("range end {end} is before start {start}")]
pub struct InvertedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `end == start` is allowed and yields no days.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvertedRange> {
        if end < start {
            return Err(InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn nights(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Lazy iterator over every date in the range. Cheap to call again.
    pub fn days(&self) -> DayIter {
        DayIter {
            next: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayIter {
    next: NaiveDate,
    end: NaiveDate,
}

impl Iterator for DayIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        // Saturate at the calendar's upper bound instead of wrapping.
        self.next = current.checked_add_days(Days::new(1)).unwrap_or(self.end);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.next).num_days().max(0) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for DayIter {}

// ── Accommodation ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    pub id: Ulid,
    pub title: String,
    pub city: String,
    pub province: String,
    pub address: String,
    pub description: String,
    pub capacity: u32,
    /// Nightly price in whole currency units.
    pub default_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Administrator-editable fields. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccommodationPatch {
    pub title: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    pub default_price: Option<Decimal>,
}

impl AccommodationPatch {
    pub fn apply(&self, acc: &mut Accommodation) {
        if let Some(v) = &self.title {
            acc.title = v.clone();
        }
        if let Some(v) = &self.city {
            acc.city = v.clone();
        }
        if let Some(v) = &self.province {
            acc.province = v.clone();
        }
        if let Some(v) = &self.address {
            acc.address = v.clone();
        }
        if let Some(v) = &self.description {
            acc.description = v.clone();
        }
        if let Some(v) = self.capacity {
            acc.capacity = v;
        }
        if let Some(v) = self.default_price {
            acc.default_price = v;
        }
    }
}

// ── Day records ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    #[default]
    Available,
    Unavailable,
    Full,
    UnderMaintenance,
    Blocked,
    Reserved,
}

impl DayStatus {
    pub const ALL: [DayStatus; 6] = [
        DayStatus::Available,
        DayStatus::Unavailable,
        DayStatus::Full,
        DayStatus::UnderMaintenance,
        DayStatus::Blocked,
        DayStatus::Reserved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::Available => "available",
            DayStatus::Unavailable => "unavailable",
            DayStatus::Full => "full",
            DayStatus::UnderMaintenance => "under_maintenance",
            DayStatus::Blocked => "blocked",
            DayStatus::Reserved => "reserved",
        }
    }

    /// Human label shown in conflict details.
    pub fn label(&self) -> &'static str {
        match self {
            DayStatus::Available => "Available",
            DayStatus::Unavailable => "Unavailable",
            DayStatus::Full => "Full",
            DayStatus::UnderMaintenance => "Under maintenance",
            DayStatus::Blocked => "Blocked",
            DayStatus::Reserved => "Reserved",
        }
    }

    /// A booking may land on a day with this administrative status.
    pub fn permits_booking(&self) -> bool {
        matches!(self, DayStatus::Available | DayStatus::Reserved)
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown day status: {s}"))
    }
}

/// Explicit per-date override. Absence of a record means "available at the
/// default price"; a record equal to [`DayRecord::default`] is equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayRecord {
    pub price: Option<Decimal>,
    pub status: DayStatus,
}

impl DayRecord {
    pub fn with_status(self, status: DayStatus) -> Self {
        Self { status, ..self }
    }
}

// ── Reservations ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and confirmed reservations hold their dates.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    /// `cancelled` is terminal; every other move between the three states is allowed.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        match (self, next) {
            (ReservationStatus::Cancelled, ReservationStatus::Cancelled) => true,
            (ReservationStatus::Cancelled, _) => false,
            _ => true,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub accommodation_id: Ulid,
    pub guest_id: Ulid,
    pub stay: DateRange,
    pub guests: u32,
    pub status: ReservationStatus,
    pub total_price: Decimal,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.stay.contains(date)
    }
}

/// Live state of one accommodation. The surrounding `RwLock` is the
/// transactional boundary for everything booked against it.
#[derive(Debug, Clone)]
pub struct AccommodationState {
    pub info: Accommodation,
    pub days: BTreeMap<NaiveDate, DayRecord>,
    /// Sorted by `stay.start`.
    pub reservations: Vec<Reservation>,
}

impl AccommodationState {
    pub fn new(info: Accommodation) -> Self {
        Self {
            info,
            days: BTreeMap::new(),
            reservations: Vec::new(),
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days.get(&date)
    }

    pub fn set_day(&mut self, date: NaiveDate, record: DayRecord) {
        self.days.insert(date, record);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    /// Insert or replace, keeping the list sorted by check-in.
    pub fn upsert_reservation(&mut self, reservation: Reservation) {
        self.remove_reservation(&reservation.id);
        let pos = self
            .reservations
            .partition_point(|r| r.stay.start <= reservation.stay.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: &Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == *id)?;
        Some(self.reservations.remove(pos))
    }

    /// Active reservations other than `exclude` overlapping `range`.
    pub fn active_overlapping<'a>(
        &'a self,
        range: &'a DateRange,
        exclude: Option<Ulid>,
    ) -> impl Iterator<Item = &'a Reservation> + 'a {
        // Sorted by start: everything from `right_bound` on starts at or after range.end.
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.start < range.end);
        self.reservations[..right_bound].iter().filter(move |r| {
            r.is_active() && r.stay.end > range.start && Some(r.id) != exclude
        })
    }

    /// Whether another active reservation (not `exclude`) covers `date`.
    pub fn is_reserved_on(&self, date: NaiveDate, exclude: Option<Ulid>) -> bool {
        let Some(next) = date.checked_add_days(Days::new(1)) else {
            return false;
        };
        let day = DateRange { start: date, end: next };
        self.active_overlapping(&day, exclude).next().is_some()
    }
}

// ── Accounts ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Ulid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_active: bool,
    /// argon2 PHC string; `None` for SSO-only accounts.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Link between a local account and the external SSO subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub national_id: String,
    pub user_id: Ulid,
    /// AES-256-GCM sealed bearer token (nonce || ciphertext).
    pub sealed_token: Option<Vec<u8>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub mobile_number: Option<String>,
    pub mobile_country_code: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ExternalIdentity {
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.is_none_or(|exp| now >= exp)
    }
}

// ── WAL records ──────────────────────────────────────────

/// One WAL record per operation. Day entries are absolute "set to X" values,
/// so replaying a record twice converges on the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AccommodationCreated {
        accommodation: Accommodation,
    },
    AccommodationUpdated {
        accommodation: Accommodation,
    },
    AccommodationDeleted {
        id: Ulid,
    },
    DaysSet {
        accommodation_id: Ulid,
        days: Vec<(NaiveDate, DayRecord)>,
    },
    ReservationSaved {
        reservation: Reservation,
        days: Vec<(NaiveDate, DayRecord)>,
    },
    ReservationDeleted {
        id: Ulid,
        accommodation_id: Ulid,
        days: Vec<(NaiveDate, DayRecord)>,
    },
    AccountCreated {
        user: UserAccount,
        identity: Option<ExternalIdentity>,
    },
    UserUpdated {
        user: UserAccount,
    },
    IdentitySynced {
        identity: ExternalIdentity,
    },
}

impl Event {
    /// Accommodation whose state this record mutates, if any.
    pub fn accommodation_id(&self) -> Option<Ulid> {
        match self {
            Event::AccommodationCreated { accommodation }
            | Event::AccommodationUpdated { accommodation } => Some(accommodation.id),
            Event::AccommodationDeleted { id } => Some(*id),
            Event::DaysSet { accommodation_id, .. }
            | Event::ReservationDeleted { accommodation_id, .. } => Some(*accommodation_id),
            Event::ReservationSaved { reservation, .. } => Some(reservation.accommodation_id),
            Event::AccountCreated { .. } | Event::UserUpdated { .. } | Event::IdentitySynced { .. } => {
                None
            }
        }
    }
}
