//! Request bodies and response shapes.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::engine::{Booked, PriceLine};
use crate::model::{DayRecord, DayStatus, ExternalIdentity, Reservation, ReservationStatus, UserAccount};

/// Money arrives as `"150"` or `150`. Fractional amounts are rejected.
fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }
    let text = match Raw::deserialize(d)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    };
    let value = Decimal::from_str(text.trim())
        .map_err(|e| serde::de::Error::custom(format!("invalid amount {text:?}: {e}")))?;
    if !value.fract().is_zero() {
        return Err(serde::de::Error::custom("amount must be a whole number"));
    }
    Ok(value.normalize())
}

fn optional_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "amount")] Decimal);
    Ok(Option::<Wrapped>::deserialize(d)?.map(|Wrapped(v)| v))
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

fn default_true() -> bool {
    true
}

// ── Accommodations ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAccommodation {
    pub title: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    pub capacity: u32,
    #[serde(deserialize_with = "amount")]
    pub default_price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccommodation {
    pub title: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    #[serde(default, deserialize_with = "optional_amount")]
    pub default_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ── Day records ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DayRecordsQuery {
    pub accommodation: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PutDayRecord {
    pub accommodation: Ulid,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: DayStatus,
    #[serde(default, deserialize_with = "optional_amount")]
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateDays {
    pub accommodation: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: DayStatus,
    #[serde(default, deserialize_with = "optional_amount")]
    pub price: Option<Decimal>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Serialize)]
pub struct DayRecordView {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub price: Option<Decimal>,
}

impl From<(NaiveDate, DayRecord)> for DayRecordView {
    fn from((date, record): (NaiveDate, DayRecord)) -> Self {
        Self {
            date,
            status: record.status,
            price: record.price,
        }
    }
}

// ── Reservations ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateReservation {
    pub accommodation: Ulid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_guests: u32,
    #[serde(default)]
    pub status: Option<ReservationStatus>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReservation {
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub number_of_guests: Option<u32>,
    pub status: Option<ReservationStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_email: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: ReservationStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminReservationQuery {
    pub status: Option<ReservationStatus>,
    pub accommodation: Option<Ulid>,
}

#[derive(Debug, Serialize)]
pub struct ReservationView {
    pub id: Ulid,
    pub accommodation: Ulid,
    pub guest: Ulid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_guests: u32,
    pub status: ReservationStatus,
    pub total_price: Decimal,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub nights: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_breakdown: Option<Vec<PriceLine>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationView {
    pub fn summary(r: Reservation) -> Self {
        Self::build(r, None)
    }

    pub fn detailed(r: Reservation, lines: Vec<PriceLine>) -> Self {
        Self::build(r, Some(lines))
    }

    fn build(r: Reservation, price_breakdown: Option<Vec<PriceLine>>) -> Self {
        Self {
            id: r.id,
            accommodation: r.accommodation_id,
            guest: r.guest_id,
            check_in_date: r.stay.start,
            check_out_date: r.stay.end,
            number_of_guests: r.guests,
            status: r.status,
            total_price: r.total_price,
            nights: r.stay.nights(),
            contact_phone: r.contact_phone,
            contact_email: r.contact_email,
            price_breakdown,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<Booked> for ReservationView {
    fn from(b: Booked) -> Self {
        Self::detailed(b.reservation, b.breakdown)
    }
}

// ── Auth ────────────────────────────────────────────────

/// Username and password, for both guest and admin login.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Signup {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct SsoCallback {
    #[serde(default)]
    pub session_code: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Ulid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

impl From<&UserAccount> for UserSummary {
    fn from(u: &UserAccount) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            is_staff: u.is_staff,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserSummary,
}

/// `GET /auth/injast/me`. The stored token is never returned.
#[derive(Debug, Serialize)]
pub struct InjastProfileView {
    pub user_id: Ulid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub mobile_number: Option<String>,
    pub mobile_country_code: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl InjastProfileView {
    pub fn new(user: &UserAccount, identity: ExternalIdentity) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            national_id: identity.national_id,
            mobile_number: identity.mobile_number,
            mobile_country_code: identity.mobile_country_code,
            token_expires_at: identity.token_expires_at,
            last_synced_at: identity.last_synced_at,
            created_at: identity.created_at,
        }
    }
}
