use axum::{extract::rejection::JsonRejection, Json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::User,
};

/// Fetch a user row, returning 404 if it does not exist.
pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, role, status, created_at
         FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn fetch_user_by_username(pool: &PgPool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, role, status, created_at
         FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Unwrap a JSON body, turning a missing, mistyped or malformed body into a
/// 400 carrying `message` instead of axum's 415/422 rejections.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>, message: &str) -> AppResult<T> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            Err(AppError::Validation(message.into()))
        }
    }
}
