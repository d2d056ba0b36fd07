//! Accommodation availability and reservations with Injast single sign-on.

pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod http;
pub mod limits;
pub mod model;
pub mod observability;
pub mod session;
pub mod sso;
pub mod wal;
