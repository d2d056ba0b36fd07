use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use super::AppState;
use super::dto::{
    Credentials, InjastProfileView, LoginResponse, RefreshRequest, Signup, SsoCallback, UserSummary,
};
use super::error::ApiError;
use super::extract::{AuthUser, JsonBody};
use crate::engine::NewAccount;
use crate::limits::{MAX_CONTACT_EMAIL_LEN, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use crate::model::UserAccount;
use crate::session::{hash_password, verify_password};

const BAD_CREDENTIALS: &str = "Invalid username or password";

/// Argon2 check off the async workers. Accounts without a local password
/// (SSO-only) never match.
async fn check_password(user: &UserAccount, password: String) -> Result<(), ApiError> {
    let Some(stored) = user.password_hash.clone() else {
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    };
    let matches = tokio::task::spawn_blocking(move || verify_password(&stored, &password))
        .await
        .map_err(|e| ApiError::Internal(format!("password check: {e}")))?;
    if !matches {
        tracing::warn!(username = %user.username, "password login rejected");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }
    Ok(())
}

fn login_response(state: &AppState, user: &UserAccount) -> Result<LoginResponse, ApiError> {
    let pair = state.tokens.issue_pair(user)?;
    Ok(LoginResponse {
        access: pair.access,
        refresh: pair.refresh,
        user: UserSummary::from(user),
    })
}

fn check_signup(body: &Signup) -> Result<(), ApiError> {
    let email = body.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
    if !well_formed || email.len() > MAX_CONTACT_EMAIL_LEN {
        return Err(ApiError::Validation("Enter a valid email address".into()));
    }
    if body.password != body.password_confirm {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    let len = body.password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ApiError::Validation(format!(
            "Password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} characters"
        )));
    }
    if body.password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation("Password cannot be entirely numeric".into()));
    }
    Ok(())
}

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Signup>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    check_signup(&body)?;
    let password = body.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hash: {e}")))??;

    let user = state
        .engine
        .create_account(
            NewAccount {
                username: body.username,
                email: body.email.trim().to_string(),
                first_name: body.first_name.trim().to_string(),
                last_name: body.last_name.trim().to_string(),
                is_staff: false,
                password_hash: Some(password_hash),
                unique_email: true,
            },
            None,
        )
        .await?;
    tracing::info!(user = %user.id, "guest signed up");
    Ok((StatusCode::CREATED, Json(login_response(&state, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation("Username and password are required".into()));
    }
    let user = state
        .engine
        .user_by_username(username)
        .ok_or_else(|| ApiError::unauthorized(BAD_CREDENTIALS))?;
    check_password(&user, body.password).await?;
    if !user.is_active {
        return Err(ApiError::unauthorized("This account is disabled"));
    }
    Ok(Json(login_response(&state, &user)?))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<UserSummary> {
    Json(UserSummary::from(&user))
}

pub async fn admin_login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Credentials>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .engine
        .user_by_username(body.username.trim())
        .filter(|u| u.is_active && u.is_staff)
        .ok_or_else(|| ApiError::unauthorized(BAD_CREDENTIALS))?;
    check_password(&user, body.password).await?;

    let token = state.tokens.issue_admin(&user)?;
    tracing::info!(user = %user.id, "admin login");
    Ok(Json(json!({
        "token": token,
        "token_type": "Admin",
        "user": UserSummary::from(&user),
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let claims = state.tokens.verify_refresh(&body.refresh)?;
    let user = state
        .engine
        .user(&claims.user_id()?)
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("User not found or inactive"))?;
    let pair = state.tokens.issue_pair(&user)?;
    Ok(Json(json!({ "access": pair.access, "refresh": pair.refresh })))
}

pub async fn injast_callback(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SsoCallback>,
) -> Result<Json<LoginResponse>, ApiError> {
    tracing::info!(code_len = body.session_code.len(), "SSO callback");
    let user = state.sso.login(&body.session_code).await?;
    Ok(Json(login_response(&state, &user)?))
}

pub async fn injast_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<InjastProfileView>, ApiError> {
    let identity = state
        .engine
        .identity_for_user(&user.id)
        .ok_or_else(|| {
            ApiError::NotFound("This user account is not associated with Injast SSO".into())
        })?;
    Ok(Json(InjastProfileView::new(&user, identity)))
}
