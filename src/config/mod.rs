use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev_secret_change_in_production";
const DEFAULT_JWT_EXPIRY_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub jwt_secret: String,
    pub jwt_expiry_minutes: i64,
    pub admin_secret_key: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub chrome_executable: Option<PathBuf>,
    pub is_dev: bool,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let is_dev = env::var("APP_ENV").as_deref() != Ok("production");

        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret,
            None if is_dev => {
                tracing::warn!("JWT_SECRET not set, using the development default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let jwt_expiry_minutes = match non_empty_var("JWT_EXPIRES_IN_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "JWT_EXPIRES_IN_MINUTES",
                    reason: format!("expected a positive number of minutes, got '{raw}'"),
                })?,
            None => DEFAULT_JWT_EXPIRY_MINUTES,
        };

        let server_port = match non_empty_var("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT",
                reason: format!("'{raw}' is not a port number"),
            })?,
            None => 8080,
        };

        let db_max_connections = match non_empty_var("DB_MAX_CONNECTIONS") {
            Some(raw) => parse_positive("DB_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };
        let db_acquire_timeout_secs = match non_empty_var("DB_ACQUIRE_TIMEOUT_SECS") {
            Some(raw) => parse_positive("DB_ACQUIRE_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
        };

        Ok(Config {
            database_url: non_empty_var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(db_acquire_timeout_secs),
            jwt_secret,
            jwt_expiry_minutes,
            admin_secret_key: non_empty_var("ADMIN_SECRET_KEY"),
            server_host: non_empty_var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port,
            chrome_executable: non_empty_var("CHROME_EXECUTABLE_PATH").map(PathBuf::from),
            is_dev,
            allowed_origins: non_empty_var("ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_default(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.trim()
        .parse::<T>()
        .ok()
        .filter(|n| *n > T::default())
        .ok_or_else(|| ConfigError::Invalid {
            name,
            reason: format!("expected a positive integer, got '{raw}'"),
        })
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}
