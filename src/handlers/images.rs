use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{AdminUser, AuthUser},
    error::{AppError, AppResult},
    handlers::shared::json_body,
    models::{Image, ImageWithOwner, Pagination, TagCount},
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const MISSING_FIELDS: &str = "Missing required fields: fileName, originalName, fileUrl, size, mimeType";

const IMAGE_COLUMNS: &str =
    "id, user_id, file_name, original_name, file_url, file_size, mime_type, tag, created_at";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Descriptor of a file already uploaded to object storage.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImageRequest {
    pub file_name: Option<String>,
    pub original_name: Option<String>,
    pub file_url: Option<String>,
    pub size: Option<i64>,
    pub mime_type: Option<String>,
    pub tag: Option<String>,
}

/// Validated insert values.
#[derive(Debug, PartialEq, Eq)]
pub struct NewImage {
    pub file_name: String,
    pub original_name: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub tag: Option<String>,
}

impl CreateImageRequest {
    pub fn validate(self) -> AppResult<NewImage> {
        let missing = || AppError::Validation(MISSING_FIELDS.into());
        Ok(NewImage {
            file_name: required(self.file_name).ok_or_else(missing)?,
            original_name: required(self.original_name).ok_or_else(missing)?,
            file_url: required(self.file_url).ok_or_else(missing)?,
            file_size: self.size.filter(|s| *s > 0).ok_or_else(missing)?,
            mime_type: required(self.mime_type).ok_or_else(missing)?,
            tag: normalize_tag(self.tag),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateImageRequest {
    pub tag: Option<String>,
}

/// `?tag=&page=&limit=`, plus `userId` on the admin listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageListQuery {
    pub tag: Option<String>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ImageListQuery {
    /// `(page, limit, offset)`. Page starts at 1; limit is clamped to
    /// `1..=100` and defaults to 20.
    pub fn window(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1) * limit)
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.is_empty())
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A blank tag clears it.
fn normalize_tag(tag: Option<String>) -> Option<String> {
    tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

async fn fetch_image(pool: &PgPool, image_id: Uuid) -> AppResult<Image> {
    sqlx::query_as::<_, Image>(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"))
        .bind(image_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".into()))
}

/// Load an image the caller owns, or any image for an admin.
async fn fetch_accessible_image(
    pool: &PgPool,
    image_id: Uuid,
    auth_user: &AuthUser,
) -> AppResult<Image> {
    let image = fetch_image(pool, image_id).await?;
    if !image.accessible_by(auth_user.user_id, auth_user.role) {
        return Err(AppError::Forbidden("You do not have access to this image".into()));
    }
    Ok(image)
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<CreateImageRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new_image = json_body(payload, MISSING_FIELDS)?.validate()?;

    let image = sqlx::query_as::<_, Image>(&format!(
        "INSERT INTO images (user_id, file_name, original_name, file_url, file_size, mime_type, tag)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {IMAGE_COLUMNS}"
    ))
    .bind(auth_user.user_id)
    .bind(&new_image.file_name)
    .bind(&new_image.original_name)
    .bind(&new_image.file_url)
    .bind(new_image.file_size)
    .bind(&new_image.mime_type)
    .bind(&new_image.tag)
    .fetch_one(&state.pool)
    .await?;

    info!("Image {} saved by {}", image.file_name, auth_user.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Image saved",
            "data": image,
        })),
    ))
}

pub async fn list_my_images(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ImageListQuery>,
) -> AppResult<Json<Value>> {
    let (page, limit, offset) = query.window();
    let tag = query.tag();

    let images = sqlx::query_as::<_, Image>(&format!(
        "SELECT {IMAGE_COLUMNS} FROM images
         WHERE user_id = $1 AND ($2::TEXT IS NULL OR tag = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4"
    ))
    .bind(auth_user.user_id)
    .bind(tag)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM images WHERE user_id = $1 AND ($2::TEXT IS NULL OR tag = $2)",
    )
    .bind(auth_user.user_id)
    .bind(tag)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "message": "Image list retrieved",
        "data": {
            "images": images,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}

/// Tags in use by the caller, most used first.
pub async fn list_my_tags(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Value>> {
    let tags = sqlx::query_as::<_, TagCount>(
        "SELECT tag, COUNT(*) AS count
         FROM images
         WHERE user_id = $1 AND tag IS NOT NULL
         GROUP BY tag
         ORDER BY count DESC, tag",
    )
    .bind(auth_user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({
        "message": "Tag list retrieved",
        "data": tags,
    })))
}

pub async fn get_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let image = fetch_accessible_image(&state.pool, image_id, &auth_user).await?;

    Ok(Json(json!({
        "message": "Image info retrieved",
        "data": image,
    })))
}

/// Only the tag is editable.
pub async fn update_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<Uuid>,
    payload: Result<Json<UpdateImageRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let req = json_body(payload, "Request body must be a JSON object")?;
    fetch_accessible_image(&state.pool, image_id, &auth_user).await?;
    let tag = normalize_tag(req.tag);

    let image = sqlx::query_as::<_, Image>(&format!(
        "UPDATE images SET tag = $2 WHERE id = $1 RETURNING {IMAGE_COLUMNS}"
    ))
    .bind(image_id)
    .bind(&tag)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Image not found".into()))?;

    info!(
        "Image {} tag set to {} by {}",
        image_id,
        tag.as_deref().unwrap_or("<none>"),
        auth_user.username
    );

    Ok(Json(json!({
        "message": "Image updated",
        "data": image,
    })))
}

/// Removes the record only; the stored file is untouched.
pub async fn delete_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(image_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let image = fetch_accessible_image(&state.pool, image_id, &auth_user).await?;

    sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(image_id)
        .execute(&state.pool)
        .await?;

    info!("Image record {} deleted by {}", image.file_name, auth_user.username);

    Ok(Json(json!({
        "message": "Image record deleted",
        "data": {
            "id": image.id,
            "fileName": image.file_name,
        },
    })))
}

pub async fn list_all_images(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(query): Query<ImageListQuery>,
) -> AppResult<Json<Value>> {
    info!("Listing all images for admin {}", admin.user_id);

    let (page, limit, offset) = query.window();
    let tag = query.tag();

    let images = sqlx::query_as::<_, ImageWithOwner>(
        "SELECT images.id, images.user_id, images.file_name, images.original_name,
                images.file_url, images.file_size, images.mime_type, images.tag,
                images.created_at, users.username
         FROM images
         LEFT JOIN users ON images.user_id = users.id
         WHERE ($1::TEXT IS NULL OR images.tag = $1)
           AND ($2::UUID IS NULL OR images.user_id = $2)
         ORDER BY images.created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(tag)
    .bind(query.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM images
         WHERE ($1::TEXT IS NULL OR tag = $1) AND ($2::UUID IS NULL OR user_id = $2)",
    )
    .bind(tag)
    .bind(query.user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "message": "All images retrieved",
        "data": {
            "images": images,
            "pagination": Pagination::new(page, limit, total),
        },
    })))
}
