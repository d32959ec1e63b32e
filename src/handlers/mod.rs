pub mod auth;
pub mod images;
pub mod scrape;
pub mod shared;
pub mod users;
pub mod versions;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{auth::AuthUser, state::AppState};

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = match crate::db::health_check(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = ?e, "Health check: database query failed");
            false
        }
    };

    let http_status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "service": "lopbox-server",
            "version": env!("CARGO_PKG_VERSION"),
            "database": if db_ok { "ok" } else { "unavailable" },
            "cachedMetadata": state.scraper.cache().len(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Authenticated smoke-test endpoint.
pub async fn greeting(auth_user: AuthUser) -> String {
    format!("Hello World! Logged in, welcome {}!", auth_user.username)
}
