//! Runtime configuration for the Dune Analytics client.
//!
//! Values come from the process environment (after loading a `.env` file if
//! one is present). Every knob except the API key has a default matching the
//! public Dune API and its usual query latencies.

use std::time::Duration;

use url::Url;

use crate::error::{DuneError, DuneResult};

/// Default REST API root.
pub const DEFAULT_BASE_URL: &str = "https://api.dune.com/api/v1";
/// Public discover page used for keyword search of query ids.
pub const DEFAULT_DISCOVER_URL: &str = "https://dune.com/discover/content/relevant";
/// Header carrying the API key on every API request.
pub const API_KEY_HEADER: &str = "X-Dune-API-Key";
/// Browser user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/99.0.4844.83 Safari/537.36";

/// Per-request timeout (seconds).
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
/// Delay between execution status checks (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Status checks before giving up (5 minutes at the default interval).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;
/// Cached results older than this are re-executed (hours).
pub const DEFAULT_STALE_AFTER_HOURS: u64 = 8;

/// Effective client configuration.
#[derive(Clone, Debug)]
pub struct DuneConfig {
    pub api_key: String,
    pub base_url: String,
    pub discover_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub stale_after: Duration,
}

impl DuneConfig {
    /// Build a configuration with defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            discover_url: DEFAULT_DISCOVER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_HOURS * 3600),
        }
    }

    /// Load `.env` (if present) and read the configuration from the environment.
    pub fn from_env() -> DuneResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> DuneResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("DUNE_API_KEY").ok_or(DuneError::MissingApiKey)?;
        let mut config = Self::new(api_key.trim());

        if let Some(url) = get("DUNE_API_BASE_URL") {
            let url = parse_url("DUNE_API_BASE_URL", &url)?;
            config.base_url = url.as_str().trim_end_matches('/').to_string();
        }
        if let Some(url) = get("DUNE_DISCOVER_URL") {
            config.discover_url = parse_url("DUNE_DISCOVER_URL", &url)?.to_string();
        }
        if let Some(agent) = get("DUNE_USER_AGENT") {
            config.user_agent = agent.trim().to_string();
        }
        if let Some(v) = get("DUNE_QUERY_TIMEOUT_SECS") {
            let secs = parse_number("DUNE_QUERY_TIMEOUT_SECS", &v)?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("DUNE_POLL_INTERVAL_SECS") {
            let secs = parse_number("DUNE_POLL_INTERVAL_SECS", &v)?;
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(v) = get("DUNE_MAX_POLL_ATTEMPTS") {
            let attempts: u64 = parse_number("DUNE_MAX_POLL_ATTEMPTS", &v)?;
            config.max_poll_attempts = u32::try_from(attempts.max(1)).map_err(|_| {
                DuneError::InvalidConfig {
                    key: "DUNE_MAX_POLL_ATTEMPTS".to_string(),
                    reason: format!("{attempts} is too large"),
                }
            })?;
        }
        if let Some(v) = get("DUNE_STALE_AFTER_HOURS") {
            let hours: u64 = parse_number("DUNE_STALE_AFTER_HOURS", &v)?;
            config.stale_after = Duration::from_secs(hours.saturating_mul(3600));
        }

        Ok(config)
    }
}

fn parse_url(key: &str, raw: &str) -> DuneResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| DuneError::InvalidConfig {
        key: key.to_string(),
        reason: format!("'{raw}' is not a valid URL ({e})"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DuneError::InvalidConfig {
            key: key.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_number(key: &str, raw: &str) -> DuneResult<u64> {
    raw.trim().parse::<u64>().map_err(|e| DuneError::InvalidConfig {
        key: key.to_string(),
        reason: format!("'{raw}' is not a non-negative integer ({e})"),
    })
}
