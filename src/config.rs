use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUEUE_THRESHOLD: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Files with more rows than this are processed in the background.
    pub queue_threshold: usize,
    pub batch_size: usize,
    pub job_timeout: Duration,
    pub session_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        if !is_supported_database_url(&database_url) {
            return Err(ConfigError::UnsupportedDatabase);
        }

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./storage/imports/temp"));

        Ok(Self {
            database_url,
            port: parse_number(&lookup, "PORT", 8000)?,
            upload_dir,
            max_upload_bytes: parse_number(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            queue_threshold: parse_number(&lookup, "QUEUE_THRESHOLD", DEFAULT_QUEUE_THRESHOLD)?,
            batch_size: parse_number(&lookup, "IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?.max(1),
            job_timeout: Duration::from_secs(parse_number(&lookup, "JOB_TIMEOUT_SECS", 600)?),
            session_ttl: Duration::from_secs(parse_number(&lookup, "SESSION_TTL_SECS", 3600)?),
        })
    }
}

pub fn is_supported_database_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://") || url.starts_with("sqlite:")
}

fn parse_number<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}
