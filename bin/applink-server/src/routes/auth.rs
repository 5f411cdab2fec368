//! Account routes under `/api/auth`.

use std::sync::Arc;

use applink_types::{AuthResponse, ErrorBody, SignInForm, SignUpForm, UserSession};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::{info, warn};
use utoipa::OpenApi;
use uuid::Uuid;

use super::json_body;
use crate::db::sqlite::is_unique_violation;
use crate::db::{UserRecord, UserStore};
use crate::error::ServerError;
use crate::middleware::auth::AuthUser;
use crate::security::{hash_password, verify_password};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(OpenApi)]
#[openapi(
    paths(sign_up, sign_in, me),
    components(schemas(SignInForm, SignUpForm, AuthResponse, UserSession, ErrorBody))
)]
pub struct AuthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/me", get(me))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue(state: &AppState, user: UserSession) -> Result<AuthResponse, ServerError> {
    let token = state
        .tokens
        .issue(&user)
        .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))?;
    Ok(AuthResponse { token, user })
}

/// Create an account and return a session token.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignUpForm,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignUpForm>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let form = json_body(payload)?;
    form.check()?;

    let record = UserRecord {
        id: Uuid::new_v4().to_string(),
        email: normalize_email(&form.email),
        name: form.full_name.trim().to_owned(),
        password_hash: hash_password(&form.password)
            .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))?,
        created_at: Utc::now(),
    };
    let user = record.session();
    if let Err(e) = state.store.insert_user(record).await {
        if is_unique_violation(&e) {
            return Err(ServerError::Conflict(
                "An account with this email already exists".into(),
            ));
        }
        return Err(e.into());
    }

    info!(user = %user.id, "account created");
    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

/// Exchange email and password for a session token.
#[utoipa::path(
    post,
    path = "/api/auth/signin",
    tag = "auth",
    request_body = SignInForm,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 401, description = "Wrong email or password", body = ErrorBody),
    )
)]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignInForm>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServerError> {
    let form = json_body(payload)?;
    form.check()?;

    let record = state
        .store
        .find_user_by_email(&normalize_email(&form.email))
        .await?
        .filter(|r| verify_password(&form.password, &r.password_hash))
        .ok_or_else(|| {
            warn!("sign-in rejected");
            ServerError::Unauthorized(BAD_CREDENTIALS.into())
        })?;

    info!(user = %record.id, "signed in");
    Ok(Json(issue(&state, record.session())?))
}

/// The user a bearer token was issued to.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserSession),
        (status = 401, description = "Missing, invalid or expired token", body = ErrorBody),
    )
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<UserSession>, ServerError> {
    let record = state
        .store
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| ServerError::Unauthorized("account no longer exists".into()))?;
    Ok(Json(record.session()))
}
