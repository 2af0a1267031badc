//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::activity::SignalKind;

/// Session coordinator configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Auth API.
    pub api_url: String,
    /// How often the session clock evaluates the deadline.
    pub tick_interval: Duration,
    /// Trailing interval before expiry during which renewal is attempted.
    pub renewal_window: Duration,
    /// Session lifetime assumed when the token carries no `exp` claim.
    pub default_session_ttl: Duration,
    /// Per-request timeout for Auth API calls.
    pub request_timeout: Duration,
    /// Where the navigator sends the user on logout.
    pub sign_in_path: String,
    /// Interaction signals that count as activity.
    pub activity_signals: Vec<SignalKind>,
    /// SQLite file for durable entries; `None` uses the OS data directory.
    pub store_path: Option<PathBuf>,
    /// Tracing filter directive; `None` defers to `RUST_LOG`.
    pub log_filter: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api_url must not be empty")]
    MissingApiUrl,

    #[error("tick_interval must be greater than zero")]
    ZeroTick,

    #[error("renewal_window ({window:?}) must cover at least one tick ({tick:?})")]
    WindowShorterThanTick { window: Duration, tick: Duration },

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            tick_interval: Duration::from_secs(30),
            renewal_window: Duration::from_secs(5 * 60),
            default_session_ttl: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(15),
            sign_in_path: "login".to_string(),
            activity_signals: SignalKind::ALL.to_vec(),
            store_path: None,
            log_filter: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `GATEHOUSE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("GATEHOUSE_API_URL") {
            config.api_url = url;
        }
        if let Some(secs) = secs_var(&lookup, "GATEHOUSE_TICK_SECS")? {
            config.tick_interval = secs;
        }
        if let Some(secs) = secs_var(&lookup, "GATEHOUSE_RENEWAL_WINDOW_SECS")? {
            config.renewal_window = secs;
        }
        if let Some(secs) = secs_var(&lookup, "GATEHOUSE_SESSION_TTL_SECS")? {
            config.default_session_ttl = secs;
        }
        if let Some(path) = lookup("GATEHOUSE_STORE_PATH") {
            config.store_path = Some(PathBuf::from(path));
        }
        config.log_filter = lookup("GATEHOUSE_LOG");

        config.validate()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    pub fn with_renewal_window(mut self, window: Duration) -> Self {
        self.renewal_window = window;
        self
    }

    pub fn with_default_session_ttl(mut self, ttl: Duration) -> Self {
        self.default_session_ttl = ttl;
        self
    }

    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    pub fn with_activity_signals(mut self, signals: Vec<SignalKind>) -> Self {
        self.activity_signals = signals;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        // Otherwise a deadline could slip from "far" to "expired" between ticks.
        if self.renewal_window < self.tick_interval {
            return Err(ConfigError::WindowShorterThanTick {
                window: self.renewal_window,
                tick: self.tick_interval,
            });
        }
        Ok(())
    }
}

fn secs_var<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|s| Some(Duration::from_secs(s)))
        .map_err(|_| ConfigError::InvalidValue { var, value: raw })
}
