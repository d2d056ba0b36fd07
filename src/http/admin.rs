//! Staff-only inventory and reservation management.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};
use ulid::Ulid;

use super::AppState;
use super::dto::{
    AdminReservationQuery, BulkCreateDays, DayRecordView, DayRecordsQuery, PutDayRecord,
    ReservationView, StatusChange,
};
use super::error::ApiError;
use super::extract::{AdminUser, JsonBody, PathId, QueryParams};
use crate::engine::{BulkDays, ReservationChanges, ReservationFilter};

pub async fn day_records(
    State(state): State<AppState>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<DayRecordsQuery>,
) -> Result<Json<Vec<DayRecordView>>, ApiError> {
    let records = state
        .engine
        .day_records(query.accommodation, query.start_date, query.end_date)
        .await?;
    Ok(Json(records.into_iter().map(DayRecordView::from).collect()))
}

pub async fn put_day_record(
    State(state): State<AppState>,
    _admin: AdminUser,
    JsonBody(body): JsonBody<PutDayRecord>,
) -> Result<Json<DayRecordView>, ApiError> {
    let record = state
        .engine
        .set_day_record(body.accommodation, body.date, body.status, body.price)
        .await?;
    Ok(Json((body.date, record).into()))
}

pub async fn bulk_create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(body): JsonBody<BulkCreateDays>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.end_date <= body.start_date {
        return Err(ApiError::Validation("end_date must be after start_date".into()));
    }
    let outcome = state
        .engine
        .bulk_set_days(BulkDays {
            accommodation_id: body.accommodation,
            start: body.start_date,
            end: body.end_date,
            status: body.status,
            price: body.price,
            overwrite: body.overwrite,
        })
        .await?;
    tracing::info!(
        admin = %admin.username,
        accommodation = %body.accommodation,
        created = outcome.created,
        updated = outcome.updated,
        skipped = outcome.skipped,
        "bulk day update"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("{} availability records saved", outcome.count()),
            "created": outcome.created,
            "updated": outcome.updated,
            "skipped": outcome.skipped,
            "count": outcome.count(),
        })),
    ))
}

pub async fn reservations(
    State(state): State<AppState>,
    _admin: AdminUser,
    QueryParams(query): QueryParams<AdminReservationQuery>,
) -> Json<Vec<ReservationView>> {
    let filter = ReservationFilter {
        accommodation_id: query.accommodation,
        status: query.status,
        ..ReservationFilter::default()
    };
    let list = state.engine.list_reservations(&filter).await;
    Json(list.into_iter().map(ReservationView::summary).collect())
}

/// Status change on any reservation, with the same day-record side effects
/// as a guest's own edit.
pub async fn set_reservation_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Ulid>,
    JsonBody(body): JsonBody<StatusChange>,
) -> Result<Json<ReservationView>, ApiError> {
    let booked = state
        .engine
        .update_reservation(id, None, ReservationChanges::status(body.status))
        .await?;
    tracing::info!(admin = %admin.username, reservation = %id, status = %body.status, "reservation status set");
    Ok(Json(booked.into()))
}
