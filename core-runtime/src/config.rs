//! # Pipeline Configuration
//!
//! Settings for one synchronization run: where the staging database lives,
//! which registry to mirror, and which canonical repository to promote into.
//!
//! ## Overview
//!
//! `PipelineConfig` is built through [`PipelineConfigBuilder`], which applies
//! defaults and validates fail-fast. [`PipelineConfig::from_env`] fills a
//! builder from environment variables for the command-line entry point.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NRPTI_SYNC_DATABASE_PATH` | `nrpti-sync.db` | Staging SQLite file |
//! | `BCMI_BASE_URL` | `https://mines.empr.gov.bc.ca` | Remote registry |
//! | `NRPTI_API_URL` | required | Canonical repository |
//! | `NRPTI_API_TOKEN` | none | Bearer token for the repository |
//! | `NRPTI_SYNC_DATA_SOURCE` | `BCMI` | Label attached to promoted records |
//! | `NRPTI_SYNC_HTTP_TIMEOUT_SECS` | `30` | Per-request timeout |
//! | `NRPTI_SYNC_TIMEOUT_SECS` | `3600` | Whole-run timeout |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PipelineConfig;
//!
//! let config = PipelineConfig::builder()
//!     .database_path("/var/lib/nrpti/staging.db")
//!     .repository_base_url("https://nrpti.example.gov.bc.ca")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::redact_if_sensitive;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DATABASE_PATH: &str = "nrpti-sync.db";
pub const DEFAULT_REGISTRY_BASE_URL: &str = "https://mines.empr.gov.bc.ca";
pub const DEFAULT_DATA_SOURCE: &str = "BCMI";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 3600;

/// Validated settings for one pipeline invocation.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Path to the staging SQLite database file
    pub database_path: PathBuf,

    /// Base URL of the remote registry (no trailing slash)
    pub registry_base_url: String,

    /// Base URL of the canonical repository (no trailing slash)
    pub repository_base_url: String,

    /// Bearer token for the canonical repository
    pub repository_token: Option<String>,

    /// Source label written onto promoted records
    pub data_source: String,

    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,

    /// Timeout applied to a whole run
    pub sync_timeout: Duration,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("database_path", &self.database_path)
            .field("registry_base_url", &self.registry_base_url)
            .field("repository_base_url", &self.repository_base_url)
            .field(
                "repository_token",
                &self
                    .repository_token
                    .as_deref()
                    .map(|token| redact_if_sensitive("repository_token", token)),
            )
            .field("data_source", &self.data_source)
            .field("http_timeout", &self.http_timeout)
            .field("sync_timeout", &self.sync_timeout)
            .finish()
    }
}

impl PipelineConfig {
    /// Creates a new builder for constructing a `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Builds and validates a config from process environment variables.
    pub fn from_env() -> Result<Self> {
        PipelineConfigBuilder::from_lookup(|key| std::env::var(key).ok()).build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Both base URLs are absolute http(s) URLs
    /// - Data source label is not empty
    /// - Timeouts are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        validate_base_url("Registry base URL", &self.registry_base_url)?;
        validate_base_url("Repository base URL", &self.repository_base_url)?;

        if self.data_source.trim().is_empty() {
            return Err(Error::Config("Data source label cannot be empty".to_string()));
        }

        if self.http_timeout.is_zero() {
            return Err(Error::Config(
                "HTTP timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.sync_timeout.is_zero() {
            return Err(Error::Config(
                "Sync timeout must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_base_url(label: &str, url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", label)));
    }

    let parsed = Url::parse(url).map_err(|e| {
        Error::Config(format!(
            "{} must be an absolute http:// or https:// URL, got '{}': {}",
            label, url, e
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "{} must use http:// or https://, got '{}'",
            label, url
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("{} has no host: '{}'", label, url)));
    }
    Ok(())
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineConfigBuilder {
    database_path: Option<PathBuf>,
    registry_base_url: Option<String>,
    repository_base_url: Option<String>,
    repository_token: Option<String>,
    data_source: Option<String>,
    http_timeout: Option<Duration>,
    sync_timeout: Option<Duration>,
    invalid: Vec<String>,
}

impl PipelineConfigBuilder {
    /// Fills a builder from a key lookup. Unparseable numbers are recorded
    /// and reported by [`build`](Self::build).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(path) = lookup("NRPTI_SYNC_DATABASE_PATH") {
            builder = builder.database_path(path);
        }
        if let Some(url) = lookup("BCMI_BASE_URL") {
            builder = builder.registry_base_url(url);
        }
        if let Some(url) = lookup("NRPTI_API_URL") {
            builder = builder.repository_base_url(url);
        }
        if let Some(token) = lookup("NRPTI_API_TOKEN").filter(|t| !t.is_empty()) {
            builder = builder.repository_token(token);
        }
        if let Some(source) = lookup("NRPTI_SYNC_DATA_SOURCE") {
            builder = builder.data_source(source);
        }

        for (key, is_http) in [
            ("NRPTI_SYNC_HTTP_TIMEOUT_SECS", true),
            ("NRPTI_SYNC_TIMEOUT_SECS", false),
        ] {
            let Some(raw) = lookup(key) else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(secs) if is_http => builder = builder.http_timeout(Duration::from_secs(secs)),
                Ok(secs) => builder = builder.sync_timeout(Duration::from_secs(secs)),
                Err(_) => builder
                    .invalid
                    .push(format!("{} must be a whole number of seconds, got '{}'", key, raw)),
            }
        }

        builder
    }

    /// Sets the staging database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the remote registry base URL.
    ///
    /// Default: `https://mines.empr.gov.bc.ca`
    pub fn registry_base_url(mut self, url: impl Into<String>) -> Self {
        self.registry_base_url = Some(url.into());
        self
    }

    /// Sets the canonical repository base URL. Required.
    pub fn repository_base_url(mut self, url: impl Into<String>) -> Self {
        self.repository_base_url = Some(url.into());
        self
    }

    pub fn repository_token(mut self, token: impl Into<String>) -> Self {
        self.repository_token = Some(token.into());
        self
    }

    pub fn data_source(mut self, source: impl Into<String>) -> Self {
        self.data_source = Some(source.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    /// Builds the final `PipelineConfig`, applying defaults and validating.
    pub fn build(self) -> Result<PipelineConfig> {
        if let Some(problem) = self.invalid.into_iter().next() {
            return Err(Error::Config(problem));
        }

        let repository_base_url = self.repository_base_url.ok_or_else(|| {
            Error::Config(
                "Repository base URL is required. Use .repository_base_url() or set NRPTI_API_URL."
                    .to_string(),
            )
        })?;

        let config = PipelineConfig {
            database_path: self
                .database_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            registry_base_url: trim_base_url(
                self.registry_base_url
                    .unwrap_or_else(|| DEFAULT_REGISTRY_BASE_URL.to_string()),
            ),
            repository_base_url: trim_base_url(repository_base_url),
            repository_token: self.repository_token,
            data_source: self
                .data_source
                .unwrap_or_else(|| DEFAULT_DATA_SOURCE.to_string()),
            http_timeout: self
                .http_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)),
            sync_timeout: self
                .sync_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = PipelineConfig::builder()
            .repository_base_url("https://nrpti.example.com/")
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.registry_base_url, DEFAULT_REGISTRY_BASE_URL);
        assert_eq!(config.repository_base_url, "https://nrpti.example.com");
        assert_eq!(config.data_source, "BCMI");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.sync_timeout, Duration::from_secs(3600));
        assert!(config.repository_token.is_none());
    }

    #[test]
    fn test_builder_requires_repository_url() {
        let result = PipelineConfig::builder().database_path("/tmp/a.db").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Repository base URL is required"));
    }

    #[test]
    fn test_validate_rejects_relative_urls() {
        let result = PipelineConfig::builder()
            .repository_base_url("nrpti.local")
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("http://")));

        let result = PipelineConfig::builder()
            .repository_base_url("http://nrpti.local")
            .registry_base_url("ftp://mines")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_urls_without_host() {
        for url in ["https://", "https://:443", "https://?token=1"] {
            let result = PipelineConfig::builder().repository_base_url(url).build();
            assert!(
                matches!(result, Err(Error::Config(ref msg)) if msg.contains("Repository base URL")),
                "{} was accepted",
                url
            );
        }

        let result = PipelineConfig::builder()
            .repository_base_url("http://localhost:3000/")
            .build()
            .unwrap();
        assert_eq!(result.repository_base_url, "http://localhost:3000");
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let result = PipelineConfig::builder()
            .repository_base_url("http://nrpti.local")
            .http_timeout(Duration::ZERO)
            .build();
        assert!(result.unwrap_err().to_string().contains("HTTP timeout"));

        let result = PipelineConfig::builder()
            .repository_base_url("http://nrpti.local")
            .sync_timeout(Duration::ZERO)
            .build();
        assert!(result.unwrap_err().to_string().contains("Sync timeout"));
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = PipelineConfigBuilder::from_lookup(lookup_from(&[
            ("NRPTI_SYNC_DATABASE_PATH", "/data/staging.db"),
            ("BCMI_BASE_URL", "http://localhost:4000"),
            ("NRPTI_API_URL", "http://localhost:3000/"),
            ("NRPTI_API_TOKEN", "secret"),
            ("NRPTI_SYNC_DATA_SOURCE", "BCMI-TEST"),
            ("NRPTI_SYNC_HTTP_TIMEOUT_SECS", "5"),
            ("NRPTI_SYNC_TIMEOUT_SECS", "60"),
        ]))
        .build()
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/staging.db"));
        assert_eq!(config.registry_base_url, "http://localhost:4000");
        assert_eq!(config.repository_base_url, "http://localhost:3000");
        assert_eq!(config.repository_token.as_deref(), Some("secret"));
        assert_eq!(config.data_source, "BCMI-TEST");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.sync_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_reports_bad_numbers() {
        let result = PipelineConfigBuilder::from_lookup(lookup_from(&[
            ("NRPTI_API_URL", "http://localhost:3000"),
            ("NRPTI_SYNC_TIMEOUT_SECS", "soon"),
        ]))
        .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("NRPTI_SYNC_TIMEOUT_SECS"));
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let config = PipelineConfigBuilder::from_lookup(lookup_from(&[
            ("NRPTI_API_URL", "http://localhost:3000"),
            ("NRPTI_API_TOKEN", ""),
        ]))
        .build()
        .unwrap();

        assert!(config.repository_token.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = PipelineConfig::builder()
            .repository_base_url("http://localhost:3000")
            .repository_token("very-secret")
            .build()
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
