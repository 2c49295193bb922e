use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::candidates::ranking::TOP_SKILLS_LIMIT;
use crate::dashboard::DashboardOptions;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub analysis_api_url: String,
    pub analysis_api_token: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub status_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub notification_limit: usize,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            analysis_api_url: require_env("ANALYSIS_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            analysis_api_token: std::env::var("ANALYSIS_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            port: parse_env("PORT", 8090)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            status_poll_interval: interval_env("STATUS_POLL_INTERVAL_MS", 2000)?,
            notification_poll_interval: interval_env("NOTIFICATION_POLL_INTERVAL_MS", 10_000)?,
            notification_limit: parse_env("NOTIFICATION_LIMIT", 20)?,
            http_timeout: Duration::from_secs(non_zero(
                "HTTP_TIMEOUT_SECS",
                parse_env("HTTP_TIMEOUT_SECS", 30)?,
            )?),
        })
    }

    pub fn dashboard_options(&self) -> DashboardOptions {
        DashboardOptions {
            status_poll_interval: self.status_poll_interval,
            notification_poll_interval: self.notification_poll_interval,
            notification_limit: self.notification_limit,
            top_skills_limit: TOP_SKILLS_LIMIT,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Poll period in milliseconds. Tokio intervals cannot have a zero period.
fn interval_env(key: &str, default_ms: u64) -> Result<Duration> {
    let ms = non_zero(key, parse_env(key, default_ms)?)?;
    Ok(Duration::from_millis(ms))
}

fn non_zero(key: &str, value: u64) -> Result<u64> {
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}
