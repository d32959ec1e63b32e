use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    auth::{create_token, hash_password, verify_password, AuthUser},
    error::{AppError, AppResult},
    handlers::shared::{fetch_user, fetch_user_by_username},
    models::{Role, User, UserStatus, UserSummary},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    pub username: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(rename = "adminSecretKey", default)]
    pub admin_secret_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub message: &'static str,
    pub user: UserSummary,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;

    let role = requested_role(req.admin_secret_key.as_deref(), state.admin_secret_key.as_deref())?;

    info!("Registering new user: {} as {}", req.username, role);

    if fetch_user_by_username(&state.pool, &req.username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash = hash_password(&req.password)?;

    // A concurrent registration can still slip past the check above; the
    // unique constraint turns that into a 409 through From<sqlx::Error>.
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, role)
        VALUES ($1, $2, $3)
        RETURNING id, username, password_hash, role, status, created_at
        "#,
    )
    .bind(&req.username)
    .bind(&password_hash)
    .bind(role.as_ref())
    .fetch_one(&state.pool)
    .await?;

    info!("User created: {} ({})", user.username, user.id);

    let token = issue_token(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: format!("Registration successful, your role is: {role}"),
            token,
            user: UserSummary::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".into(),
        ));
    }

    info!("Login attempt for user: {}", req.username);

    let user = fetch_user_by_username(&state.pool, &req.username)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid username or password".into()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Auth("Invalid username or password".into()));
    }

    if user.status() == UserStatus::Banned {
        tracing::warn!("Login refused for banned user: {} ({})", user.username, user.id);
        return Err(AppError::Forbidden("This account has been banned".into()));
    }

    info!("Login successful: {} ({})", user.username, user.id);

    let token = issue_token(&state, &user)?;

    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        user: UserSummary::from(&user),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<MeResponse>> {
    let user = fetch_user(&state.pool, auth_user.user_id).await?;

    Ok(Json(MeResponse {
        message: "User info retrieved",
        user: UserSummary::from(&user),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// A supplied admin key must match the configured one exactly. Supplying a
/// key when none is configured is an error rather than a silent downgrade.
fn requested_role(supplied: Option<&str>, configured: Option<&str>) -> AppResult<Role> {
    match supplied.filter(|k| !k.is_empty()) {
        None => Ok(Role::User),
        Some(key) if configured == Some(key) => Ok(Role::Admin),
        Some(_) => Err(AppError::Validation("Invalid admin secret key".into())),
    }
}

fn issue_token(state: &AppState, user: &User) -> AppResult<String> {
    create_token(
        user.id,
        user.username.clone(),
        user.role(),
        &state.jwt_secret,
        state.jwt_expiry_minutes,
    )
}
