#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Gateway error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum GatewayError {
    /// Error connecting to or communicating with the gateway
    Connection(tokio_tungstenite::tungstenite::Error),
    /// An inbound frame was not a well-formed envelope, or its payload did not match its op code
    Decode(serde_json::Error),
    /// The transport is closed and can no longer send
    ConnectionClosed,
    /// Event stream lagged and missed events
    Lagged {
        /// Number of events that were missed
        count: u64,
    },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "gateway connection error: {e}"),
            Self::Decode(e) => write!(f, "failed to decode gateway frame: {e}"),
            Self::ConnectionClosed => write!(f, "gateway connection closed"),
            Self::Lagged { count } => write!(f, "event stream lagged, missed {count} events"),
        }
    }
}

impl StdError for GatewayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GatewayError> for crate::error::Error {
    fn from(e: GatewayError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Gateway, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Gateway, GatewayError::Connection(e))
    }
}
