use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal,
}

/// Map sqlx errors to AppError, with special handling for unique-constraint
/// violations (PG error code 23505) so they surface as 409 Conflict rather
/// than 500 Internal Server Error.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                let message = match db_err.constraint() {
                    Some(c) if c.contains("username") => "Username already taken",
                    Some(c) if c.contains("version") => "Version already exists",
                    _ => "Resource already exists",
                };
                return AppError::Conflict(message.into());
            }
        }
        AppError::Database(e)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message): (StatusCode, String) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".into())
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Internal => {
                tracing::error!("Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

// ============================================================================
// Scraper errors
// ============================================================================

/// Failures of the metadata scraper.
///
/// Static-fetch problems never show up here: they are logged and turn into a
/// fallback to the browser. Only unrecoverable failures reach the caller,
/// always wrapped in [`ScrapeError::Failed`] by the orchestrator.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("page setup failed: {0}")]
    Page(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u128),

    #[error("metadata evaluation failed: {0}")]
    Evaluation(String),

    #[error("page has neither a title nor a description")]
    NoMetadata,

    #[error("Failed to scrape metadata: {0}")]
    Failed(Box<ScrapeError>),
}

impl ScrapeError {
    /// Wrap with the fixed "Failed to scrape metadata" prefix, once.
    pub fn wrap(self) -> Self {
        match self {
            already @ ScrapeError::Failed(_) => already,
            other => ScrapeError::Failed(Box::new(other)),
        }
    }

    pub fn is_invalid_url(&self) -> bool {
        match self {
            ScrapeError::InvalidUrl(_) => true,
            ScrapeError::Failed(inner) => inner.is_invalid_url(),
            _ => false,
        }
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Page(e.to_string())
    }
}
