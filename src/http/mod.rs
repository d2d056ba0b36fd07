//! JSON API over the engine.

mod accommodations;
mod admin;
mod auth;
pub mod dto;
pub mod error;
mod extract;
mod reservations;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::{get, patch, post};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::session::TokenIssuer;
use crate::sso::SsoLogin;

pub use error::ApiError;
pub use extract::{AdminUser, AuthUser};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub tokens: Arc<TokenIssuer>,
    pub sso: Arc<SsoLogin>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/accommodations", get(accommodations::list))
        .route("/accommodations/:id", get(accommodations::detail))
        .route(
            "/accommodations/:id/availability-calendar",
            get(accommodations::calendar),
        )
        .route(
            "/accommodations/:id/unavailable-dates",
            get(accommodations::unavailable_dates),
        );

    let guest = Router::new()
        .route(
            "/reservations",
            get(reservations::list).post(reservations::create),
        )
        .route(
            "/reservations/:id",
            get(reservations::detail)
                .patch(reservations::update)
                .delete(reservations::remove),
        );

    let staff = Router::new()
        .route("/admin/accommodations", post(accommodations::create))
        .route(
            "/admin/accommodations/:id",
            patch(accommodations::update).delete(accommodations::remove),
        )
        .route(
            "/admin/room-availability",
            get(admin::day_records).put(admin::put_day_record),
        )
        .route(
            "/admin/room-availability/bulk-create",
            post(admin::bulk_create),
        )
        .route("/admin/reservations", get(admin::reservations))
        .route(
            "/admin/reservations/:id/status",
            patch(admin::set_reservation_status),
        );

    let sessions = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/admin/login", post(auth::admin_login))
        .route("/auth/token/refresh", post(auth::refresh))
        .route("/auth/injast/callback", post(auth::injast_callback))
        .route("/auth/injast/me", get(auth::injast_me));

    Router::new()
        .merge(public)
        .merge(guest)
        .merge(staff)
        .merge(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
