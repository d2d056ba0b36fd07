use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};
use ulid::Ulid;

use super::AppState;
use super::dto::{CalendarQuery, CreateAccommodation, UpdateAccommodation};
use super::error::ApiError;
use super::extract::{AdminUser, JsonBody, PathId, QueryParams};
use crate::engine::{EngineError, NewAccommodation};
use crate::model::{Accommodation, AccommodationPatch};

pub async fn list(State(state): State<AppState>) -> Json<Vec<Accommodation>> {
    Json(state.engine.list_accommodations().await)
}

pub async fn detail(
    State(state): State<AppState>,
    PathId(id): PathId<Ulid>,
) -> Result<Json<Accommodation>, ApiError> {
    state
        .engine
        .accommodation(&id)
        .await
        .map(Json)
        .ok_or_else(|| EngineError::accommodation_not_found(id).into())
}

pub async fn calendar(
    State(state): State<AppState>,
    PathId(id): PathId<Ulid>,
    QueryParams(query): QueryParams<CalendarQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(start), Some(end)) = (query.start_date, query.end_date) else {
        return Err(ApiError::Validation(
            "Missing required parameters: start_date, end_date (format: YYYY-MM-DD)".into(),
        ));
    };
    if end <= start {
        return Err(ApiError::Validation("end_date must be after start_date".into()));
    }
    let accommodation = state
        .engine
        .accommodation(&id)
        .await
        .ok_or_else(|| EngineError::accommodation_not_found(id))?;
    let days = state.engine.calendar(id, start, end).await?;
    Ok(Json(json!({
        "accommodation_id": id,
        "accommodation_title": accommodation.title,
        "default_price": accommodation.default_price,
        "start_date": start,
        "end_date": end,
        "calendar": days,
    })))
}

pub async fn unavailable_dates(
    State(state): State<AppState>,
    PathId(id): PathId<Ulid>,
) -> Result<Json<Value>, ApiError> {
    let dates = state.engine.unavailable_dates(id).await?;
    Ok(Json(json!({
        "accommodation_id": id,
        "unavailable_dates": dates,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(body): JsonBody<CreateAccommodation>,
) -> Result<(StatusCode, Json<Accommodation>), ApiError> {
    let accommodation = state
        .engine
        .create_accommodation(NewAccommodation {
            title: body.title,
            city: body.city,
            province: body.province,
            address: body.address,
            description: body.description,
            capacity: body.capacity,
            default_price: body.default_price,
        })
        .await?;
    tracing::info!(admin = %admin.username, accommodation = %accommodation.id, "accommodation added");
    Ok((StatusCode::CREATED, Json(accommodation)))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    PathId(id): PathId<Ulid>,
    JsonBody(body): JsonBody<UpdateAccommodation>,
) -> Result<Json<Accommodation>, ApiError> {
    let patch = AccommodationPatch {
        title: body.title,
        city: body.city,
        province: body.province,
        address: body.address,
        description: body.description,
        capacity: body.capacity,
        default_price: body.default_price,
    };
    Ok(Json(state.engine.update_accommodation(id, patch).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(id): PathId<Ulid>,
) -> Result<StatusCode, ApiError> {
    let reservations = state.engine.delete_accommodation(id).await?;
    tracing::info!(admin = %admin.username, accommodation = %id, reservations, "accommodation removed");
    Ok(StatusCode::NO_CONTENT)
}
