//! HTTP error taxonomy. Every handler returns `Result<_, ApiError>`; the
//! body is always `{"error": code, "message": text, "details": ...}`.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::engine::EngineError;
use crate::session::SessionError;
use crate::sso::SsoError;

static EXPOSE_INTERNAL: AtomicBool = AtomicBool::new(false);

/// Echo internal error text in 5xx bodies. Off unless `INNKEEP_DEBUG` is set.
pub fn expose_internal_errors(enabled: bool) {
    EXPOSE_INTERNAL.store(enabled, Ordering::Relaxed);
}

const GENERIC_INTERNAL: &str = "An unexpected error occurred";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Date or capacity collision; `details` lists every rejected date.
    #[error("{message}")]
    Conflict { message: String, details: Value },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Forbidden(String),

    /// The SSO provider or its key endpoint failed.
    #[error("{stage}: {message}")]
    Upstream { stage: &'static str, message: String },

    #[error("{message}")]
    Persistence {
        message: String,
        hint: Option<&'static str>,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Persistence { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Conflict { .. } => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Authentication(_) => "authentication_failed",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Upstream { .. } => "upstream_error",
            ApiError::Persistence { .. } => "persistence_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Authentication(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let expose = EXPOSE_INTERNAL.load(Ordering::Relaxed);
        let (message, details) = match &self {
            ApiError::Conflict { message, details } => (message.clone(), details.clone()),
            ApiError::Upstream { stage, message } => {
                tracing::error!(stage, error = %message, "upstream failure");
                let shown = if expose { message.clone() } else { format!("{stage} failed") };
                (shown, json!({ "stage": stage }))
            }
            ApiError::Persistence { message, hint } => {
                tracing::error!(error = %message, hint = hint.unwrap_or(""), "storage failure");
                let shown = if expose { message.clone() } else { GENERIC_INTERNAL.to_string() };
                (shown, hint.map(|h| json!({ "hint": h })).unwrap_or(Value::Null))
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                let shown = if expose { message.clone() } else { GENERIC_INTERNAL.to_string() };
                (shown, Value::Null)
            }
            other => (other.to_string(), Value::Null),
        };

        let mut body = json!({ "error": self.code(), "message": message });
        if !details.is_null() {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            EngineError::DatesUnavailable(ref conflicts) => ApiError::Conflict {
                message: "Selected dates are not available".into(),
                details: json!({ "unavailable_dates": conflicts }),
            },
            EngineError::CapacityExceeded { guests, capacity } => ApiError::Conflict {
                message: e.to_string(),
                details: json!({ "number_of_guests": guests, "capacity": capacity }),
            },
            EngineError::AlreadyExists(_) => ApiError::Conflict {
                message: e.to_string(),
                details: Value::Null,
            },
            EngineError::InvalidDateRange
            | EngineError::CheckInInPast(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::Invalid(_)
            | EngineError::LimitExceeded(_) => ApiError::Validation(e.to_string()),
            EngineError::Persistence { .. } => ApiError::Persistence {
                hint: e.persistence_hint(),
                message: e.to_string(),
            },
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired => ApiError::unauthorized("Token has expired"),
            SessionError::Invalid(_) | SessionError::WrongType { .. } => {
                ApiError::unauthorized(format!("Invalid token: {e}"))
            }
            SessionError::Signing(_) | SessionError::Hashing(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SsoError> for ApiError {
    fn from(e: SsoError) -> Self {
        match e {
            SsoError::InvalidSessionCode(msg) => ApiError::Validation(msg),
            SsoError::KeySetUnavailable(_) => ApiError::Upstream {
                stage: e.stage(),
                message: e.to_string(),
            },
            SsoError::Expired
            | SsoError::InvalidSignature
            | SsoError::InvalidAudience
            | SsoError::Malformed(_)
            | SsoError::Exchange(_)
            | SsoError::Profile(_)
            | SsoError::ProfileRejected(_)
            | SsoError::MissingIdentifier => {
                ApiError::unauthorized(format!("SSO authentication failed: {e}"))
            }
            SsoError::Engine(inner) => match inner {
                EngineError::Persistence { .. } => inner.into(),
                other => ApiError::Internal(other.to_string()),
            },
            SsoError::Cipher(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::Validation(format!("Invalid request body: {}", r.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        ApiError::Validation(format!("Invalid query parameters: {}", r.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        ApiError::Validation(format!("Invalid path: {}", r.body_text()))
    }
}
