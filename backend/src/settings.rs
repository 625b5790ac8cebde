//! Service configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `SITEHUB_*` environment variables, and an
//! optional configuration file. Every key is optional; accessors apply the
//! defaults and validate formats.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use rand::RngCore;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;
use zeroize::Zeroizing;

use crate::outbound::persistence::{PoolConfig, RetryPolicy};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SITE_URL: &str = "http://localhost:3000/";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("invalid bind address {value:?}: {message}")]
    BindAddr { value: String, message: String },
    #[error("invalid site URL {value:?}: {message}")]
    SiteUrl { value: String, message: String },
    #[error("invalid allowed origin {value:?}: {message}")]
    AllowedOrigin { value: String, message: String },
    #[error("token lifetime must be positive, got {0} hours")]
    TokenTtl(i64),
}

/// Runtime settings for the hub service.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SITEHUB")]
pub struct HubSettings {
    /// Listen address.
    pub bind_addr: Option<String>,
    /// PostgreSQL URL; in-memory tables and queues when absent.
    pub database_url: Option<String>,
    /// Blob storage directory; in-memory blobs when absent.
    pub blob_root: Option<String>,
    /// HMAC secret for bearer and verification tokens.
    pub token_secret: Option<String>,
    pub token_ttl_hours: Option<i64>,
    /// Base URL for verification links.
    pub site_url: Option<String>,
    /// Comma-separated WebSocket Origin allow-list.
    pub allowed_origins: Option<String>,
    pub store_timeout_secs: Option<u64>,
    pub store_max_attempts: Option<u32>,
    pub store_initial_backoff_ms: Option<u64>,
    /// Upper bound on open PostgreSQL connections.
    pub db_max_connections: Option<u32>,
}

impl HubSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let value = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        value.parse().map_err(|err: std::net::AddrParseError| SettingsError::BindAddr {
            value: value.to_owned(),
            message: err.to_string(),
        })
    }

    /// Base URL for verification links, always ending in `/`.
    pub fn site_url(&self) -> Result<String, SettingsError> {
        let value = self.site_url.as_deref().unwrap_or(DEFAULT_SITE_URL);
        let url = Url::parse(value).map_err(|err| SettingsError::SiteUrl {
            value: value.to_owned(),
            message: err.to_string(),
        })?;
        let mut url = url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(url)
    }

    pub fn allowed_origins(&self) -> Result<Vec<Url>, SettingsError> {
        self.allowed_origins
            .as_deref()
            .unwrap_or(DEFAULT_ALLOWED_ORIGINS)
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                Url::parse(origin).map_err(|err| SettingsError::AllowedOrigin {
                    value: origin.to_owned(),
                    message: err.to_string(),
                })
            })
            .collect()
    }

    /// Configured secret, or a random one for this process.
    ///
    /// A generated secret invalidates every token on restart, so it is only
    /// suitable for development.
    pub fn token_secret(&self) -> Zeroizing<String> {
        match &self.token_secret {
            Some(secret) if !secret.is_empty() => Zeroizing::new(secret.clone()),
            _ => {
                warn!("no token secret configured; using an ephemeral secret (dev only)");
                let mut bytes = Zeroizing::new([0_u8; 32]);
                rand::thread_rng().fill_bytes(&mut *bytes);
                Zeroizing::new(hex::encode(&*bytes))
            }
        }
    }

    pub fn token_ttl(&self) -> Result<TimeDelta, SettingsError> {
        let hours = self.token_ttl_hours.unwrap_or(DEFAULT_TOKEN_TTL_HOURS);
        if hours <= 0 {
            return Err(SettingsError::TokenTtl(hours));
        }
        Ok(TimeDelta::hours(hours))
    }

    /// Storage timeout and retry budget, over the policy defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            timeout: self
                .store_timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            max_attempts: self.store_max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_backoff: self
                .store_initial_backoff_ms
                .map_or(defaults.initial_backoff, Duration::from_millis),
        }
    }

    /// Pool limits for `database_url`, with checkouts bounded by the
    /// storage timeout.
    pub fn pool_config(&self, database_url: &str) -> PoolConfig {
        let config = PoolConfig::for_store(database_url, &self.retry_policy());
        match self.db_max_connections {
            Some(max) => config.with_max_size(max),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const KEYS: [&str; 11] = [
        "SITEHUB_BIND_ADDR",
        "SITEHUB_DATABASE_URL",
        "SITEHUB_BLOB_ROOT",
        "SITEHUB_TOKEN_SECRET",
        "SITEHUB_TOKEN_TTL_HOURS",
        "SITEHUB_SITE_URL",
        "SITEHUB_ALLOWED_ORIGINS",
        "SITEHUB_STORE_TIMEOUT_SECS",
        "SITEHUB_STORE_MAX_ATTEMPTS",
        "SITEHUB_STORE_INITIAL_BACKOFF_MS",
        "SITEHUB_DB_MAX_CONNECTIONS",
    ];

    fn env_with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        KEYS.iter()
            .map(|key| {
                let value = overrides
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| (*value).to_owned());
                (*key, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> HubSettings {
        HubSettings::load_from_iter([OsString::from("sitehub")]).expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.bind_addr(),
            Ok(SocketAddr::from(([0, 0, 0, 0], 8080)))
        );
        assert!(settings.database_url.is_none());
        assert!(settings.blob_root.is_none());
        assert_eq!(settings.site_url().as_deref(), Ok("http://localhost:3000/"));
        assert_eq!(
            settings.allowed_origins(),
            Ok(vec![Url::parse("http://localhost:3000").expect("url")])
        );
        assert_eq!(settings.token_ttl(), Ok(TimeDelta::hours(24)));
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.token_secret().len(), 64);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("SITEHUB_BIND_ADDR", "127.0.0.1:9000"),
            ("SITEHUB_DATABASE_URL", "postgres://hub@localhost/hub"),
            ("SITEHUB_TOKEN_SECRET", "s3cret"),
            ("SITEHUB_TOKEN_TTL_HOURS", "2"),
            ("SITEHUB_SITE_URL", "https://hub.example.org/app"),
            (
                "SITEHUB_ALLOWED_ORIGINS",
                "https://hub.example.org, http://localhost:5173",
            ),
            ("SITEHUB_STORE_TIMEOUT_SECS", "5"),
            ("SITEHUB_STORE_MAX_ATTEMPTS", "3"),
            ("SITEHUB_STORE_INITIAL_BACKOFF_MS", "50"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.bind_addr(),
            Ok(SocketAddr::from(([127, 0, 0, 1], 9000)))
        );
        assert_eq!(
            settings.database_url.as_deref(),
            Some("postgres://hub@localhost/hub")
        );
        assert_eq!(settings.token_secret().as_str(), "s3cret");
        assert_eq!(settings.token_ttl(), Ok(TimeDelta::hours(2)));
        assert_eq!(
            settings.site_url().as_deref(),
            Ok("https://hub.example.org/app/")
        );
        assert_eq!(settings.allowed_origins().map(|list| list.len()), Ok(2));
        assert_eq!(
            settings.retry_policy(),
            RetryPolicy {
                timeout: Duration::from_secs(5),
                max_attempts: 3,
                initial_backoff: Duration::from_millis(50),
            }
        );
    }

    #[rstest]
    fn pool_limits_follow_the_storage_settings() {
        let _guard = lock_env(env_with(&[
            ("SITEHUB_STORE_TIMEOUT_SECS", "7"),
            ("SITEHUB_DB_MAX_CONNECTIONS", "3"),
        ]));

        let settings = load_from_empty_args();
        let config = settings.pool_config("postgres://hub@localhost/hub");
        let rendered = format!("{config:?}");
        assert_eq!(config.database_url(), "postgres://hub@localhost/hub");
        assert!(rendered.contains("max_size: 3"), "{rendered}");
        assert!(rendered.contains("connection_timeout: 7s"), "{rendered}");
    }

    #[rstest]
    #[case("SITEHUB_BIND_ADDR", "not-an-address")]
    #[case("SITEHUB_ALLOWED_ORIGINS", "http://localhost:3000,not a url")]
    #[case("SITEHUB_TOKEN_TTL_HOURS", "0")]
    fn malformed_values_are_reported(#[case] key: &'static str, #[case] value: &str) {
        let _guard = lock_env(env_with(&[(key, value)]));

        let settings = load_from_empty_args();
        let failed = settings.bind_addr().is_err()
            || settings.allowed_origins().is_err()
            || settings.token_ttl().is_err();
        assert!(failed, "{key}={value} should be rejected");
    }
}
