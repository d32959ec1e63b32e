use std::sync::Arc;

use sqlx::PgPool;

use crate::scrape::ScrapeService;

/// Shared application state passed to all handlers and extractors.
/// Secrets are read once at startup rather than from the environment on
/// every request.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt_secret: Arc<str>,
    pub jwt_expiry_minutes: i64,
    /// `None` disables admin self-registration.
    pub admin_secret_key: Option<Arc<str>>,
    pub scraper: Arc<ScrapeService>,
}
