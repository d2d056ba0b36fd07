use std::io;

use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::model::{DayStatus, ReservationStatus};

/// One date a booking cannot take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateConflict {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub reason: String,
}

impl DateConflict {
    pub fn from_status(date: NaiveDate, status: DayStatus) -> Self {
        Self {
            date,
            status,
            reason: format!("Status: {}", status.label()),
        }
    }

    pub fn reserved(date: NaiveDate) -> Self {
        Self {
            date,
            status: DayStatus::Reserved,
            reason: "Reserved".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("check-out date must be after check-in date")]
    InvalidDateRange,

    #[error("check-in date {0} is in the past")]
    CheckInInPast(NaiveDate),

    #[error("{guests} guests exceed the accommodation capacity of {capacity}")]
    CapacityExceeded { guests: u32, capacity: u32 },

    #[error("dates not available: {}", join_dates(.0))]
    DatesUnavailable(Vec<DateConflict>),

    #[error("cannot change reservation status from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("storage failure: {message}")]
    Persistence { kind: io::ErrorKind, message: String },
}

fn join_dates(conflicts: &[DateConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.date.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    pub fn accommodation_not_found(id: Ulid) -> Self {
        EngineError::NotFound {
            kind: "accommodation",
            id: id.to_string(),
        }
    }

    pub fn reservation_not_found(id: Ulid) -> Self {
        EngineError::NotFound {
            kind: "reservation",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: Ulid) -> Self {
        EngineError::NotFound {
            kind: "user",
            id: id.to_string(),
        }
    }

    /// Operator hint for storage failures that are fixable outside the process.
    pub fn persistence_hint(&self) -> Option<&'static str> {
        match self {
            EngineError::Persistence {
                kind: io::ErrorKind::PermissionDenied,
                ..
            } => Some("check that the data directory is writable by the service user"),
            EngineError::Persistence {
                kind: io::ErrorKind::StorageFull,
                ..
            } => Some("the data volume is full"),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Persistence {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
