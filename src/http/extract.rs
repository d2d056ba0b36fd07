use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::AppState;
use super::error::ApiError;
use crate::model::UserAccount;

/// `axum::Json` with rejections reported as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathId<T>(pub T);

fn credentials<'a>(parts: &'a Parts, scheme: &str) -> Result<&'a str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;
    let token = header
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim)
        .ok_or_else(|| ApiError::unauthorized(format!("Expected '{scheme} <token>' authorization")))?;
    if token.is_empty() {
        return Err(ApiError::unauthorized("Empty token"));
    }
    Ok(token)
}

/// Guest or staff account behind an `Authorization: Bearer <access>` token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserAccount);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = credentials(parts, "Bearer")?;
        let claims = state.tokens.verify_access(token)?;
        let user = state
            .engine
            .user(&claims.user_id()?)
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::unauthorized("User not found or inactive"))?;
        Ok(AuthUser(user))
    }
}

/// Staff account behind an `Authorization: Admin <jwt>` token.
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserAccount);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = credentials(parts, "Admin")?;
        let claims = state.tokens.verify_admin(token)?;
        let user = state
            .engine
            .user(&claims.user_id()?)
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::unauthorized("User not found or inactive"))?;
        if !user.is_staff {
            return Err(ApiError::Forbidden("Staff access required".into()));
        }
        Ok(AdminUser(user))
    }
}
