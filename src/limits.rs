//! Hard input limits. Requests beyond these are rejected before touching state.

/// Widest calendar / bulk-edit window, in days.
pub const MAX_RANGE_DAYS: u64 = 732;

/// Longest single stay, in nights.
pub const MAX_STAY_NIGHTS: u64 = 365;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_TEXT_LEN: usize = 10_000;
pub const MAX_CONTACT_PHONE_LEN: usize = 20;
pub const MAX_CONTACT_EMAIL_LEN: usize = 254;

/// Password length bounds for self-service accounts.
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Session codes from the SSO provider are UUID-like.
pub const MIN_SESSION_CODE_LEN: usize = 20;
pub const MAX_SESSION_CODE_LEN: usize = 100;

/// Bounds applied to the configured SSO HTTP timeout, in seconds.
pub const MIN_SSO_TIMEOUT_SECS: u64 = 5;
pub const MAX_SSO_TIMEOUT_SECS: u64 = 30;

/// Upper bound on profile fetch attempts regardless of configuration.
pub const MAX_PROFILE_ATTEMPTS: u32 = 5;

/// Username collisions tried before giving up.
pub const MAX_USERNAME_SUFFIX: u32 = 10_000;
