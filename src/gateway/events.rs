use serde::Deserialize;

use super::codec::{Envelope, OpCode};
use super::error::GatewayError;
use crate::Result;
use crate::types::User;

/// Everything a gateway [`Client`](super::Client) reports to its subscribers.
#[expect(
    clippy::exhaustive_enums,
    reason = "Subscribers are expected to match on every event the gateway can produce"
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The transport opened and the authenticate frame was sent
    Connected,
    /// The connection closed with a code other than
    /// [`AUTH_INVALIDATED`](super::policy::AUTH_INVALIDATED)
    Disconnected {
        code: u16,
        reason: Option<String>,
    },
    /// A heartbeat frame was sent
    HeartbeatSent {
        /// Send time in milliseconds since the Unix epoch
        timestamp_millis: i64,
    },
    ServerViewed {
        server_id: String,
    },
    ServerJoined {
        server_id: String,
    },
    ServerUpvoted {
        server_id: String,
        user: User,
    },
    /// An inbound frame could not be decoded, or the transport reported an error.
    /// The connection is not closed because of it.
    ProtocolError {
        detail: String,
    },
}

#[derive(Deserialize)]
struct ServerPayload {
    server: String,
}

#[derive(Deserialize)]
struct UpvotePayload {
    server: String,
    user: User,
}

impl GatewayEvent {
    /// Map a decoded envelope to the event it announces.
    ///
    /// Client-bound frames with op codes this SDK does not handle yield `Ok(None)`. A known op
    /// code with a payload of the wrong shape is a [`GatewayError::Decode`].
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>> {
        let event = match envelope.op_code() {
            Some(OpCode::ServerView) => {
                let payload: ServerPayload = payload(envelope)?;
                Self::ServerViewed {
                    server_id: payload.server,
                }
            }
            Some(OpCode::ServerJoin) => {
                let payload: ServerPayload = payload(envelope)?;
                Self::ServerJoined {
                    server_id: payload.server,
                }
            }
            Some(OpCode::ServerUpvote) => {
                let payload: UpvotePayload = payload(envelope)?;
                Self::ServerUpvoted {
                    server_id: payload.server,
                    user: payload.user,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn payload<T: serde::de::DeserializeOwned>(envelope: Envelope) -> Result<T> {
    serde_json::from_value(envelope.d).map_err(|e| GatewayError::Decode(e).into())
}
