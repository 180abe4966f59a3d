use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_API_KEY: &str = "BYBIT_API_KEY";
pub const ENV_API_KEY_FALLBACK: &str = "API_KEY";
pub const ENV_API_SECRET: &str = "BYBIT_API_SECRET";
pub const ENV_API_SECRET_FALLBACK: &str = "API_SECRET";
pub const ENV_TESTNET: &str = "BYBIT_TESTNET";

/// Upper bound on any authenticated call.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 10;
/// Upper bound on the server-time probe.
pub const MAX_TIME_SYNC_TIMEOUT_SECS: u64 = 5;

/// Errors raised while resolving configuration, before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API key is not configured (set BYBIT_API_KEY or API_KEY)")]
    MissingApiKey,
    #[error("API secret is not configured (set BYBIT_API_SECRET or API_SECRET)")]
    MissingApiSecret,
    #[error("Invalid config file: {0}")]
    InvalidFile(String),
    #[error("API secret cannot be used as a signing key: {0}")]
    InvalidSigningKey(String),
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API credentials. Only constructible with a non-empty key and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
    use_test_environment: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("use_test_environment", &self.use_test_environment)
            .finish()
    }
}

impl Credentials {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        use_test_environment: bool,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        let secret = secret.into();
        if key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingApiSecret);
        }
        Ok(Self {
            key,
            secret,
            use_test_environment,
        })
    }

    /// Resolve credentials from a key-value source such as the process
    /// environment. Empty values are treated as unset.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|v| !v.trim().is_empty())
        };

        let key =
            first_set(&[ENV_API_KEY, ENV_API_KEY_FALLBACK]).ok_or(ConfigError::MissingApiKey)?;
        let secret = first_set(&[ENV_API_SECRET, ENV_API_SECRET_FALLBACK])
            .ok_or(ConfigError::MissingApiSecret)?;
        let use_test_environment = lookup(ENV_TESTNET)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Self::new(key, secret, use_test_environment)
    }

    /// Resolve credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|name| std::env::var(name).ok())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn use_test_environment(&self) -> bool {
        self.use_test_environment
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Tunables for the exchange client and history walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub mainnet_url: String,
    pub testnet_url: String,
    /// Staleness tolerance sent with every signed request.
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
    pub time_sync_timeout_secs: u64,
    /// Width of each closed-pnl sub-query.
    pub history_window_days: u32,
    pub history_page_limit: u32,
    pub account_type: String,
    pub category: String,
    pub settle_coin: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mainnet_url: "https://api.bybit.com".to_string(),
            testnet_url: "https://api-testnet.bybit.com".to_string(),
            recv_window_ms: 5_000,
            request_timeout_secs: MAX_REQUEST_TIMEOUT_SECS,
            time_sync_timeout_secs: MAX_TIME_SYNC_TIMEOUT_SECS,
            history_window_days: 7,
            history_page_limit: 50,
            account_type: "UNIFIED".to_string(),
            category: "linear".to_string(),
            settle_coin: "USDT".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(s).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        config.validated()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Clamp timeouts to their ceilings and reject degenerate windows.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.history_window_days == 0 {
            return Err(ConfigError::InvalidFile(
                "history_window_days must be at least 1".to_string(),
            ));
        }
        if self.history_page_limit == 0 {
            return Err(ConfigError::InvalidFile(
                "history_page_limit must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            tracing::warn!(
                requested = self.request_timeout_secs,
                max = MAX_REQUEST_TIMEOUT_SECS,
                "Request timeout out of range, clamping"
            );
            self.request_timeout_secs =
                self.request_timeout_secs.clamp(1, MAX_REQUEST_TIMEOUT_SECS);
        }
        if self.time_sync_timeout_secs == 0
            || self.time_sync_timeout_secs > MAX_TIME_SYNC_TIMEOUT_SECS
        {
            tracing::warn!(
                requested = self.time_sync_timeout_secs,
                max = MAX_TIME_SYNC_TIMEOUT_SECS,
                "Time sync timeout out of range, clamping"
            );
            self.time_sync_timeout_secs =
                self.time_sync_timeout_secs.clamp(1, MAX_TIME_SYNC_TIMEOUT_SECS);
        }
        Ok(self)
    }

    pub fn base_url(&self, use_test_environment: bool) -> &str {
        if use_test_environment {
            &self.testnet_url
        } else {
            &self.mainnet_url
        }
    }

    pub fn history_window_ms(&self) -> i64 {
        i64::from(self.history_window_days) * 24 * 60 * 60 * 1000
    }
}
