pub mod metadata;

pub use metadata::{Metadata, PartialMetadata};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

/// Internal database row. Not serializable; use UserDto for API responses
/// to avoid accidentally exposing password_hash.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Unknown values fall back to the least-privileged role.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    pub fn status(&self) -> UserStatus {
        self.status.parse().unwrap_or(UserStatus::Active)
    }
}

/// Public user shape returned by the user-management API.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        UserDto {
            id: user.id,
            role: user.role(),
            status: user.status(),
            username: user.username,
            created_at: user.created_at,
        }
    }
}

/// Minimal identity embedded in auth responses.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            role: user.role(),
        }
    }
}

// ============================================================================
// Version Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Version {
    pub id: Uuid,
    pub version: String,
    pub release_date: DateTime<Utc>,
    pub notes: Option<String>,
}

// ============================================================================
// Image Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Image {
    /// Owners see and edit their own records; admins see and edit all of them.
    pub fn accessible_by(&self, user_id: Uuid, role: Role) -> bool {
        self.user_id == user_id || role == Role::Admin
    }
}

/// Admin listing row. `username` is `None` only if the owner row is gone.
#[derive(Debug, FromRow, Serialize)]
pub struct ImageWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub image: Image,
    pub username: Option<String>,
}

#[derive(Debug, FromRow, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}
