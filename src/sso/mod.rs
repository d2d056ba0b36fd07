//! Injast single sign-on: key-set cache, token validation, the provider's
//! HTTP API, and reconciliation of the external identity with a local account.

pub mod cipher;
pub mod client;
pub mod jwks;
pub mod login;
pub mod reconcile;
pub mod validator;

pub use cipher::TokenCipher;
pub use client::{HttpSsoClient, SsoClient};
pub use jwks::{HttpKeySetSource, KeySetCache, KeySetSource, StaticKeySet};
pub use login::{RetryPolicy, SsoLogin};
pub use reconcile::IdentityReconciler;
pub use validator::SsoTokenValidator;

use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid token audience")]
    InvalidAudience,

    #[error("invalid token format: {0}")]
    Malformed(String),

    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("session code exchange failed: {0}")]
    Exchange(String),

    /// Transport failure or 5xx from the profile endpoint; worth retrying.
    #[error("profile fetch failed: {0}")]
    Profile(String),

    /// The profile endpoint answered and refused; retrying will not help.
    #[error("profile request rejected: {0}")]
    ProfileRejected(String),

    #[error("invalid session code: {0}")]
    InvalidSessionCode(String),

    #[error("national id (nid/uid) is required")]
    MissingIdentifier,

    #[error("token sealing failed: {0}")]
    Cipher(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SsoError {
    /// Which step of the login failed, for logs and error bodies.
    pub fn stage(&self) -> &'static str {
        match self {
            SsoError::Expired
            | SsoError::InvalidSignature
            | SsoError::InvalidAudience
            | SsoError::Malformed(_)
            | SsoError::KeySetUnavailable(_) => "token_validation",
            SsoError::Exchange(_) => "session_exchange",
            SsoError::Profile(_) | SsoError::ProfileRejected(_) => "profile",
            SsoError::InvalidSessionCode(_) => "request",
            SsoError::MissingIdentifier | SsoError::Engine(_) | SsoError::Cipher(_) => {
                "identity_sync"
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SsoError::Profile(_))
    }

    /// Short label for the login outcome counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            SsoError::Expired => "expired",
            SsoError::InvalidSignature => "invalid_signature",
            SsoError::InvalidAudience => "invalid_audience",
            SsoError::Malformed(_) => "malformed",
            SsoError::KeySetUnavailable(_) => "keys_unavailable",
            SsoError::Exchange(_) => "exchange_failed",
            SsoError::Profile(_) => "profile_failed",
            SsoError::ProfileRejected(_) => "profile_rejected",
            SsoError::InvalidSessionCode(_) => "bad_request",
            SsoError::MissingIdentifier => "missing_identifier",
            SsoError::Cipher(_) | SsoError::Engine(_) => "error",
        }
    }
}

/// Claims carried by an Injast access token. Identifier claims arrive as
/// strings or numbers depending on the issuer version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjastClaims {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sub: Option<String>,
    /// Mobile number.
    #[serde(default, deserialize_with = "lenient_string")]
    pub mbn: Option<String>,
    /// Mobile country code.
    #[serde(default, deserialize_with = "lenient_string")]
    pub mbc: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iss: Option<String>,
}

/// `data` of the `user-basic` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjastProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub national_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile_country_code: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Option::<Raw>::deserialize(d)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

/// `Some` only for values with visible content.
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
