use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::ScrapeError,
    models::Metadata,
    scrape::validate_url,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub url: Option<String>,
    #[serde(rename = "useCache")]
    pub use_cache: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: Metadata,
}

/// Errors of the scrape endpoint. Rendered as `{ success: false, message }`
/// rather than the `{ error }` body used by the rest of the API.
#[derive(Debug)]
pub enum ScrapeApiError {
    BadRequest(String),
    Failed(String),
}

impl From<ScrapeError> for ScrapeApiError {
    fn from(e: ScrapeError) -> Self {
        if e.is_invalid_url() {
            ScrapeApiError::BadRequest("Invalid URL format".into())
        } else {
            ScrapeApiError::Failed(e.to_string())
        }
    }
}

impl IntoResponse for ScrapeApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ScrapeApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ScrapeApiError::Failed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// `POST /scrape/metadata`. Public; `useCache` defaults to `true`.
pub async fn get_metadata(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, ScrapeApiError> {
    let Json(req) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected scrape request body");
        ScrapeApiError::BadRequest("Request body must be a JSON object".into())
    })?;

    let url = req
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ScrapeApiError::BadRequest("Missing required parameter: url".into()))?;
    validate_url(&url)?;

    let data = state
        .scraper
        .get_metadata(&url, req.use_cache.unwrap_or(true))
        .await?;

    Ok(Json(ScrapeResponse {
        success: true,
        message: "Metadata retrieved",
        data,
    }))
}
