use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::error::MigrateError;

/// Load a dotenv file.
///
/// With no explicit path, `.env` in the working directory is loaded if present
/// and silently skipped otherwise. An explicit path must exist.
pub fn load_dotenv(path: Option<&Path>) -> Result<(), MigrateError> {
    match path {
        Some(path) => dotenvy::from_path(path).map_err(|e| {
            MigrateError::Configuration(format!(
                "cannot load properties from {}: {}",
                path.display(),
                e
            ))
        }),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> Result<u64, MigrateError> {
    match profiled_env_opt(profile, key) {
        Some(v) => v.trim().parse().map_err(|_| {
            MigrateError::Configuration(format!("{key} must be a non-negative integer, got {v:?}"))
        }),
        None => Ok(default),
    }
}

pub const DEFAULT_REMOTE_URL: &str = "redis://127.0.0.1:6379";

// ── Remote store ──────────────────────────────────────────────

/// Connection parameters for the destination store.
///
/// Built from environment variables (call [`load_dotenv`] first). The profile
/// is read from `CACHELIFT_PROFILE`; when set (e.g. `PROD`), every key is first
/// looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub url: String,
    pub connect_timeout: Duration,
    /// Per-request deadline. Unrelated to the progress interval.
    pub operation_timeout: Duration,
    pub max_retries: u32,
    /// Initial backoff; doubled on every further attempt.
    pub retry_backoff: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            url: DEFAULT_REMOTE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, MigrateError> {
        let profile = env_or("CACHELIFT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, MigrateError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let defaults = Self::default();

        let config = Self {
            profile: p.to_string(),
            url: profiled_env_or(p, "REMOTE_URL", DEFAULT_REMOTE_URL),
            connect_timeout: Duration::from_secs(profiled_env_u64(
                p,
                "REMOTE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            operation_timeout: Duration::from_secs(profiled_env_u64(
                p,
                "REMOTE_OPERATION_TIMEOUT_SECS",
                defaults.operation_timeout.as_secs(),
            )?),
            max_retries: profiled_env_u64(p, "REMOTE_MAX_RETRIES", u64::from(defaults.max_retries))?
                .min(u64::from(u32::MAX)) as u32,
            retry_backoff: Duration::from_millis(profiled_env_u64(
                p,
                "REMOTE_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        url::Url::parse(&self.url)
            .map_err(|e| MigrateError::Configuration(format!("REMOTE_URL {:?}: {}", self.url, e)))?;
        if self.connect_timeout.is_zero() {
            return Err(MigrateError::Configuration(
                "REMOTE_CONNECT_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(MigrateError::Configuration(
                "REMOTE_OPERATION_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// URL with any password masked.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                // Only fails for cannot-be-a-base URLs, which carry no password.
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            Ok(parsed) => parsed.to_string(),
            Err(_) => "(invalid url)".to_string(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Remote config loaded (profile: {}):", self.profile_label());
        tracing::info!("  url:               {}", self.redacted_url());
        tracing::info!("  connect_timeout:   {:?}", self.connect_timeout);
        tracing::info!("  operation_timeout: {:?}", self.operation_timeout);
        tracing::info!(
            "  retries:           {} (backoff {:?})",
            self.max_retries,
            self.retry_backoff
        );
    }
}
