use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, AdminUser, AuthUser},
    error::{AppError, AppResult},
    handlers::shared::fetch_user,
    models::{Role, User, UserDto, UserStatus},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total: usize,
    pub admins: usize,
    pub regular_users: usize,
    pub banned: usize,
}

impl UserStatistics {
    pub fn from_users(users: &[User]) -> Self {
        users.iter().fold(Self::default(), |mut stats, user| {
            stats.total += 1;
            match user.role() {
                Role::Admin => stats.admins += 1,
                Role::User => stats.regular_users += 1,
            }
            if user.status() == UserStatus::Banned {
                stats.banned += 1;
            }
            stats
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Value>> {
    info!("Listing users for admin {}", admin.user_id);

    let users = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, role, status, created_at
         FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let statistics = UserStatistics::from_users(&users);
    let users: Vec<UserDto> = users.into_iter().map(UserDto::from).collect();

    Ok(Json(json!({
        "message": "User list retrieved",
        "data": {
            "users": users,
            "statistics": statistics,
        },
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let user = fetch_user(&state.pool, user_id).await?;

    Ok(Json(json!({
        "message": "User info retrieved",
        "user": UserDto::from(user),
    })))
}

/// Regular users may delete only themselves. Admins may delete regular
/// users but neither other admins nor their own account.
pub async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let target = fetch_user(&state.pool, user_id).await?;
    let is_self = target.id == auth_user.user_id;

    match auth_user.role {
        Role::User if !is_self => {
            return Err(AppError::Forbidden(
                "You can only delete your own account".into(),
            ));
        }
        Role::Admin if is_self => {
            return Err(AppError::Validation(
                "Admins cannot delete their own account".into(),
            ));
        }
        Role::Admin if target.role() == Role::Admin => {
            return Err(AppError::Forbidden(
                "Admins cannot delete other admin accounts".into(),
            ));
        }
        _ => {}
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(target.id)
        .execute(&state.pool)
        .await?;

    if is_self {
        info!("User deleted own account: {} ({})", target.username, target.id);
    } else {
        info!(
            "Admin {} ({}) deleted user {} ({})",
            auth_user.username, auth_user.user_id, target.username, target.id
        );
    }

    Ok(Json(json!({
        "message": "User deleted",
        "deletedUser": { "id": target.id, "username": target.username },
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    if user_id != auth_user.user_id {
        return Err(AppError::Forbidden(
            "You can only reset your own password".into(),
        ));
    }

    req.validate()?;

    let user = fetch_user(&state.pool, user_id).await?;

    if !verify_password(&req.old_password, &user.password_hash)? {
        return Err(AppError::Auth("Old password is incorrect".into()));
    }

    let password_hash = hash_password(&req.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    info!("Password reset: {} ({})", user.username, user.id);

    Ok(Json(json!({
        "message": "Password reset successful",
        "user": { "id": user.id, "username": user.username },
    })))
}

pub async fn ban_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let target = fetch_user(&state.pool, user_id).await?;

    if target.role() == Role::Admin {
        return Err(AppError::Forbidden("Admin accounts cannot be banned".into()));
    }
    if target.id == admin.user_id {
        return Err(AppError::Validation("You cannot ban yourself".into()));
    }
    if target.status() == UserStatus::Banned {
        return Err(AppError::Validation("User is already banned".into()));
    }

    set_status(&state, target.id, UserStatus::Banned).await?;

    info!(
        "User banned: {} ({}) by admin {} ({})",
        target.username, target.id, admin.username, admin.user_id
    );

    Ok(Json(json!({
        "message": "User banned",
        "user": { "id": target.id, "username": target.username, "status": UserStatus::Banned },
    })))
}

pub async fn unban_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let target = fetch_user(&state.pool, user_id).await?;

    if target.status() == UserStatus::Active {
        return Err(AppError::Validation("User is not banned".into()));
    }

    set_status(&state, target.id, UserStatus::Active).await?;

    info!(
        "User unbanned: {} ({}) by admin {} ({})",
        target.username, target.id, admin.username, admin.user_id
    );

    Ok(Json(json!({
        "message": "User unbanned",
        "user": { "id": target.id, "username": target.username, "status": UserStatus::Active },
    })))
}

async fn set_status(state: &AppState, user_id: Uuid, status: UserStatus) -> AppResult<()> {
    sqlx::query("UPDATE users SET status = $1 WHERE id = $2")
        .bind(status.as_ref())
        .bind(user_id)
        .execute(&state.pool)
        .await?;
    Ok(())
}
