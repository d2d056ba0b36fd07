use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use ulid::Ulid;

use super::AppState;
use super::dto::{CreateReservation, ReservationView, UpdateReservation};
use super::error::ApiError;
use super::extract::{AuthUser, JsonBody, PathId};
use crate::engine::{NewReservation, ReservationChanges, ReservationFilter};

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<Vec<ReservationView>> {
    let filter = ReservationFilter {
        guest_id: Some(user.id),
        ..ReservationFilter::default()
    };
    let reservations = state.engine.list_reservations(&filter).await;
    Json(reservations.into_iter().map(ReservationView::summary).collect())
}

pub async fn detail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Ulid>,
) -> Result<Json<ReservationView>, ApiError> {
    let (reservation, lines) = state.engine.reservation(id, Some(user.id)).await?;
    Ok(Json(ReservationView::detailed(reservation, lines)))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<CreateReservation>,
) -> Result<(StatusCode, Json<ReservationView>), ApiError> {
    let booked = state
        .engine
        .create_reservation(NewReservation {
            accommodation_id: body.accommodation,
            guest_id: user.id,
            check_in: body.check_in_date,
            check_out: body.check_out_date,
            guests: body.number_of_guests,
            status: body.status,
            contact_phone: body.contact_phone,
            contact_email: body.contact_email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booked.into())))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Ulid>,
    JsonBody(body): JsonBody<UpdateReservation>,
) -> Result<Json<ReservationView>, ApiError> {
    let changes = ReservationChanges {
        check_in: body.check_in_date,
        check_out: body.check_out_date,
        guests: body.number_of_guests,
        status: body.status,
        contact_phone: body.contact_phone,
        contact_email: body.contact_email,
    };
    let booked = state
        .engine
        .update_reservation(id, Some(user.id), changes)
        .await?;
    Ok(Json(booked.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    PathId(id): PathId<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_reservation(id, Some(user.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
