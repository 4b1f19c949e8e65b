//! Process configuration loaded from environment variables.
//!
//! Environment variables:
//! - `OFFERS_SERVICE_URL`: upstream base URL (required)
//! - `OFFERS_REFRESH_TOKEN`: long-lived refresh credential (required)
//! - `SYNC_SCHEDULE`: six-field cron expression (default: `*/30 * * * * *`)
//! - `DATABASE_URL`: Postgres URL; unset means the in-memory store
//! - `LOG_LEVEL`: default tracing filter (default: `info`)
//! - `BIND_ADDR`: HTTP listen address (default: `0.0.0.0:8080`)
//! - `OFFERS_HTTP_TIMEOUT_SECS`: upstream request timeout (default: 10)

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SYNC_SCHEDULE: &str = "*/30 * * * * *";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A credential that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Upstream offers service connection settings.
#[derive(Debug, Clone)]
pub struct OffersServiceConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub refresh_token: Secret,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub offers: OffersServiceConfig,
    pub sync_schedule: String,
    pub database_url: Option<String>,
    pub log_level: String,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("OFFERS_SERVICE_URL").ok_or(ConfigError::Missing("OFFERS_SERVICE_URL"))?;
        let base_url = normalize_base_url(&base_url)?;

        let refresh_token = get("OFFERS_REFRESH_TOKEN")
            .map(Secret::new)
            .ok_or(ConfigError::Missing("OFFERS_REFRESH_TOKEN"))?;

        let timeout_secs = match get("OFFERS_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "OFFERS_HTTP_TIMEOUT_SECS",
                    reason: format!("expected a positive integer, got {raw:?}"),
                })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let sync_schedule = get("SYNC_SCHEDULE").unwrap_or_else(|| DEFAULT_SYNC_SCHEDULE.to_string());
        validate_schedule(&sync_schedule)?;

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            name: "BIND_ADDR",
            reason: e.to_string(),
        })?;

        Ok(Self {
            offers: OffersServiceConfig {
                base_url,
                refresh_token,
                timeout: Duration::from_secs(timeout_secs),
            },
            sync_schedule,
            database_url: get("DATABASE_URL"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            bind_addr,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            name: "OFFERS_SERVICE_URL",
            reason: format!("expected an http(s) URL, got {raw:?}"),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Six whitespace-separated fields: sec min hour day-of-month month day-of-week.
///
/// Field syntax itself is checked when the scheduler registers the job.
pub fn validate_schedule(expr: &str) -> Result<(), ConfigError> {
    let fields = expr.split_whitespace().count();
    if fields != 6 {
        return Err(ConfigError::Invalid {
            name: "SYNC_SCHEDULE",
            reason: format!("expected 6 cron fields, got {fields}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("OFFERS_SERVICE_URL", "https://offers.example.com/"),
        ("OFFERS_REFRESH_TOKEN", "refresh-123"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let cfg = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.offers.base_url, "https://offers.example.com");
        assert_eq!(cfg.offers.refresh_token.expose(), "refresh-123");
        assert_eq!(cfg.offers.timeout, Duration::from_secs(10));
        assert_eq!(cfg.sync_schedule, DEFAULT_SYNC_SCHEDULE);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn missing_refresh_token_fails() {
        let err = AppConfig::from_lookup(lookup(&[("OFFERS_SERVICE_URL", "http://x")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OFFERS_REFRESH_TOKEN"));
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OFFERS_SERVICE_URL", "   "),
            ("OFFERS_REFRESH_TOKEN", "t"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("OFFERS_SERVICE_URL"));
    }

    #[test]
    fn five_field_cron_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_SCHEDULE", "*/5 * * * *"));
        let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SYNC_SCHEDULE", .. }));
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("SYNC_SCHEDULE", "0 */5 * * * *"),
            ("DATABASE_URL", "postgres://localhost/offers"),
            ("LOG_LEVEL", "debug"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("OFFERS_HTTP_TIMEOUT_SECS", "3"),
        ]);
        let cfg = AppConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(cfg.sync_schedule, "0 */5 * * * *");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/offers"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.offers.timeout, Duration::from_secs(3));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("OFFERS_HTTP_TIMEOUT_SECS", "0"));
        assert!(AppConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn refresh_token_is_redacted_in_debug() {
        let cfg = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("refresh-123"));
        assert!(rendered.contains("Secret(***)"));
    }
}
