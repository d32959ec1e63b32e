use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Open the Postgres pool sized by `DB_MAX_CONNECTIONS` and
/// `DB_ACQUIRE_TIMEOUT_SECS`.
pub async fn create_pool(config: &Config) -> AppResult<PgPool> {
    info!(
        max_connections = config.db_max_connections,
        acquire_timeout_secs = config.db_acquire_timeout.as_secs(),
        "Connecting lopbox database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await
        .map_err(AppError::Database)?;

    info!("Lopbox database pool ready");
    Ok(pool)
}

/// Round-trip a trivial query. Used at startup and by `GET /health`.
pub async fn health_check(pool: &PgPool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
    Ok(())
}
