use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    error::{AppError, AppResult},
    handlers::shared::json_body,
    models::Version,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

const VERSION_REQUIRED: &str = "Version is required";

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<String>,
}

impl VersionQuery {
    fn required(self) -> AppResult<String> {
        self.version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Validation(VERSION_REQUIRED.into()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AddVersionRequest {
    pub version: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateCheck {
    UpToDate {
        update: bool,
        message: String,
        latest: String,
    },
    Available {
        update: bool,
        latest: String,
        release_date: DateTime<Utc>,
        notes: String,
        message: String,
    },
}

impl UpdateCheck {
    /// Compare the client's version against the most recent release. Any
    /// difference counts as an update; version strings are not ordered.
    pub fn against(current: &str, latest: Version) -> Self {
        if current == latest.version {
            UpdateCheck::UpToDate {
                update: false,
                message: "Already on the latest version".into(),
                latest: latest.version,
            }
        } else {
            UpdateCheck::Available {
                update: true,
                message: format!("New version available: {}", latest.version),
                latest: latest.version,
                release_date: latest.release_date,
                notes: latest.notes.unwrap_or_default(),
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn check_update(
    State(state): State<AppState>,
    payload: Result<Json<VersionQuery>, JsonRejection>,
) -> AppResult<Json<UpdateCheck>> {
    let current = json_body(payload, VERSION_REQUIRED)?.required()?;

    let latest = sqlx::query_as::<_, Version>(
        "SELECT id, version, release_date, notes
         FROM versions ORDER BY release_date DESC LIMIT 1",
    )
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("No version information available".into()))?;

    Ok(Json(UpdateCheck::against(&current, latest)))
}

pub async fn get_version(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> AppResult<Json<Value>> {
    let found = sqlx::query_as::<_, Version>(
        "SELECT id, version, release_date, notes FROM versions WHERE version = $1",
    )
    .bind(&version)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Version not found".into()))?;

    Ok(Json(json!({
        "message": "Version info retrieved",
        "version": found,
    })))
}

pub async fn add_version(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<AddVersionRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let req = json_body(payload, VERSION_REQUIRED)?;
    let version = VersionQuery {
        version: req.version,
    }
    .required()?;

    let inserted = sqlx::query_as::<_, Version>(
        r#"
        INSERT INTO versions (version, release_date, notes)
        VALUES ($1, COALESCE($2, NOW()), $3)
        RETURNING id, version, release_date, notes
        "#,
    )
    .bind(&version)
    .bind(req.release_date)
    .bind(req.notes.filter(|n| !n.is_empty()))
    .fetch_one(&state.pool)
    .await?;

    info!("Version {} added by admin {}", inserted.version, admin.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Version added",
            "version": inserted,
        })),
    ))
}

pub async fn delete_version_by_id(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM versions WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Version not found".into()));
    }

    info!("Version {} deleted by admin {}", id, admin.username);

    Ok(Json(json!({ "message": "Version deleted", "id": id })))
}

pub async fn delete_version_by_name(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<VersionQuery>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let version = json_body(payload, VERSION_REQUIRED)?.required()?;

    let result = sqlx::query("DELETE FROM versions WHERE version = $1")
        .bind(&version)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Version not found".into()));
    }

    info!("Version {} deleted by admin {}", version, admin.username);

    Ok(Json(json!({ "message": "Version deleted", "version": version })))
}
