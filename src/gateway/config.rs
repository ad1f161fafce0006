#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 45;
/// Upper bound accepted for [`Config::heartbeat_interval`]; the gateway drops sessions that stay
/// silent for longer.
pub const MAX_HEARTBEAT_INTERVAL_SECS: u64 = 55;

const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for a gateway [`Client`](super::Client).
///
/// The configuration is validated once, when the client is constructed; construction fails
/// before any connection attempt if it is invalid.
///
/// # Example
///
/// ```
/// use serverlist_client_sdk::gateway::Config;
///
/// let config = Config::builder()
///     .tokens(vec!["server-token".to_owned()])
///     .heartbeat_interval_secs(30)
///     .auto_reconnect(true)
///     .build();
///
/// assert_eq!(config.heartbeat_interval().as_secs(), 30);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Server tokens sent in the authenticate frame. At least one, none empty.
    #[builder(with = |tokens: Vec<String>| tokens.into_iter().map(SecretString::from).collect::<Vec<_>>())]
    tokens: Vec<SecretString>,
    /// Seconds between heartbeats, in `1..=55`. Defaults to 45.
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_SECS)]
    heartbeat_interval_secs: u64,
    /// Reconnect after the gateway closes the connection. Defaults to `true`.
    ///
    /// Closes with code `4006` always reconnect, regardless of this flag.
    #[builder(default = true)]
    auto_reconnect: bool,
    /// Delay between reconnection attempts. `None` (the default) reconnects immediately.
    reconnect_backoff: Option<ReconnectBackoff>,
}

impl Config {
    /// Server tokens used to authenticate each new connection.
    #[must_use]
    pub fn tokens(&self) -> &[SecretString] {
        &self.tokens
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    #[must_use]
    pub fn reconnect_backoff(&self) -> Option<&ReconnectBackoff> {
        self.reconnect_backoff.as_ref()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(Error::validation(
                "'tokens' must contain at least one server token",
            ));
        }

        if self.tokens.iter().any(|t| t.expose_secret().is_empty()) {
            return Err(Error::validation("'tokens' must not contain empty strings"));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(Error::validation(
                "'heartbeat_interval_secs' must be greater than 0",
            ));
        }

        if self.heartbeat_interval_secs > MAX_HEARTBEAT_INTERVAL_SECS {
            return Err(Error::validation(format!(
                "'heartbeat_interval_secs' must be less than or equal to {MAX_HEARTBEAT_INTERVAL_SECS}, got {}",
                self.heartbeat_interval_secs
            )));
        }

        if let Some(backoff) = &self.reconnect_backoff
            && backoff.initial_backoff > backoff.max_backoff
        {
            return Err(Error::validation(
                "'initial_backoff' must not exceed 'max_backoff'",
            ));
        }

        Ok(())
    }
}

/// Exponential backoff applied between reconnection attempts.
///
/// The attempt counter resets every time a connection reaches the open state.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Maximum number of consecutive attempts that fail to open before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<&ReconnectBackoff> for ExponentialBackoff {
    fn from(config: &ReconnectBackoff) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
