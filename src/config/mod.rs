//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Store URLs are wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::path::PathBuf;

use crate::engine::TrackerConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub redis_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Directory of connector TOML files.
    pub connectors_dir: PathBuf,
    /// Namespace for counter keys in Redis.
    pub counter_key_prefix: String,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| {
                Error::Config(format!("required environment variable {name} is not set"))
            })
        };

        let defaults = TrackerConfig::default();
        let tracker = TrackerConfig {
            default_retention_days: retention_days(
                &lookup,
                "WORK_RETENTION_DAYS",
                defaults.default_retention_days,
            )?,
            enrichment_retention_days: retention_days(
                &lookup,
                "ENRICHMENT_RETENTION_DAYS",
                defaults.enrichment_retention_days,
            )?,
            ..defaults
        };

        Ok(Self {
            database_url: SecretString::from(required("DATABASE_URL")?),
            redis_url: SecretString::from(required("REDIS_URL")?),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            connectors_dir: lookup("CONNECTORS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("connectors")),
            counter_key_prefix: lookup("COUNTER_KEY_PREFIX").unwrap_or_else(|| "work:".to_string()),
            tracker,
        })
    }
}

/// Upper bound for retention settings (about a century).
const MAX_RETENTION_DAYS: i64 = 36_500;

fn retention_days(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: i64,
) -> Result<i64> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if (1..=MAX_RETENTION_DAYS).contains(&days) => Ok(days),
        _ => Err(Error::Config(format!(
            "{name} must be between 1 and {MAX_RETENTION_DAYS} days, got {raw:?}"
        ))),
    }
}
