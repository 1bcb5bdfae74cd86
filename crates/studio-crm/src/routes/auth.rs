use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{self, AuthUser};
use crate::error::{AppError, AppResult};
use crate::models::{LoginRequest, RegisterRequest, User};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    body.validate().map_err(AppError::BadRequest)?;

    let open = state.config.allow_registration;

    // Skip hashing when registration is plainly closed; the insert below
    // makes the binding decision
    if !open && state.db.count_users().await? > 0 {
        return Err(AppError::Forbidden);
    }

    let password = body.password.clone();
    let hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .context("Password hashing task failed")??;

    // The first account bootstraps the studio as admin
    let user = state
        .db
        .register_user(&body.name, &body.email, &hash, open)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
            other => other,
        })?
        .ok_or(AppError::Forbidden)?;

    let session = state
        .db
        .create_session(user.id, state.config.session_ttl)
        .await?;

    info!(user_id = user.id, role = user.role.as_str(), "Registered user");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: session.token,
            expires_at: session.expires_at,
            user,
        }),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let user = state
        .db
        .find_user_by_email(&body.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let password = body.password;
    let stored = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored))
        .await
        .context("Password verification task failed")?;

    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    let purged = state.db.purge_expired_sessions(Utc::now()).await?;
    let session = state
        .db
        .create_session(user.id, state.config.session_ttl)
        .await?;

    info!(user_id = user.id, purged, "User logged in");

    Ok(Json(SessionResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

async fn logout(State(state): State<Arc<AppState>>, auth: AuthUser) -> AppResult<StatusCode> {
    state.db.delete_session(&auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}
