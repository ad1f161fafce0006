use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;

use super::config::ReconnectBackoff;

/// Close code sent by the gateway when the supplied tokens were rejected or expired.
///
/// Treated as transient: the client always reconnects and never reports a disconnect for it.
pub const AUTH_INVALIDATED: u16 = 4006;

/// Outcome of [`decide`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Decision {
    /// Open a fresh transport connection
    Reconnect,
    /// Stay closed for the rest of this client's life
    Stop,
}

/// Decide whether a close should be followed by a new connection.
///
/// `close_code` is `None` when the connection ended without a close frame (network failure,
/// failed connection attempt).
#[must_use]
pub fn decide(close_code: Option<u16>, auto_reconnect: bool) -> Decision {
    if close_code == Some(AUTH_INVALIDATED) || auto_reconnect {
        Decision::Reconnect
    } else {
        Decision::Stop
    }
}

/// Tracks how long to wait before each reconnection attempt.
#[derive(Debug)]
pub(crate) struct ReconnectSchedule {
    backoff: Option<ExponentialBackoff>,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl ReconnectSchedule {
    pub(crate) fn new(config: Option<&ReconnectBackoff>) -> Self {
        Self {
            backoff: config.map(ExponentialBackoff::from),
            max_attempts: config.and_then(|c| c.max_attempts),
            attempt: 0,
        }
    }

    /// Called whenever a connection reaches the open state.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
        if let Some(backoff) = &mut self.backoff {
            backoff.reset();
        }
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is exhausted.
    ///
    /// An uncapped attempt is always granted a delay, and still advances the backoff.
    pub(crate) fn next_delay(&mut self, capped: bool) -> Option<Duration> {
        if capped
            && let Some(max) = self.max_attempts
            && self.attempt >= max
        {
            return None;
        }
        self.attempt = self.attempt.saturating_add(1);

        match &mut self.backoff {
            Some(backoff) => backoff.next_backoff(),
            None => Some(Duration::ZERO),
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}
