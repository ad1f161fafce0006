//! Wire format for gateway traffic.
//!
//! Every frame in either direction is a single JSON text message of the form
//! `{"op": <code>, "t": <unix millis>, "d": <payload>}`.

use chrono::Utc;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::Serialize_repr;

use super::error::GatewayError;
use crate::Result;

/// Operation codes used by the gateway.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, strum_macros::Display)]
#[repr(u8)]
pub enum OpCode {
    /// Client → server, carries the server tokens
    Authenticate = 0,
    /// Client → server liveness signal
    Heartbeat = 1,
    /// Server → client, someone viewed a server page
    ServerView = 2,
    /// Server → client, someone joined a server through the site
    ServerJoin = 3,
    /// Server → client, someone upvoted a server
    ServerUpvote = 4,
}

impl TryFrom<i64> for OpCode {
    type Error = i64;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Authenticate),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::ServerView),
            3 => Ok(Self::ServerJoin),
            4 => Ok(Self::ServerUpvote),
            other => Err(other),
        }
    }
}

/// A decoded gateway frame.
///
/// `op` is kept as the raw integer so that frames with codes this SDK does not know about still
/// decode; use [`Envelope::op_code`] to classify it.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    pub op: i64,
    /// Send time in milliseconds since the Unix epoch
    #[serde(default)]
    pub t: i64,
    #[serde(default)]
    pub d: Value,
}

impl Envelope {
    #[must_use]
    pub fn op_code(&self) -> Option<OpCode> {
        OpCode::try_from(self.op).ok()
    }
}

#[derive(Serialize)]
struct Outbound<'payload, P: Serialize> {
    op: OpCode,
    t: i64,
    d: &'payload P,
}

/// Payload of the authenticate frame.
#[derive(Serialize)]
pub(crate) struct Authenticate<'tokens> {
    tokens: Vec<&'tokens str>,
}

impl<'tokens> Authenticate<'tokens> {
    pub(crate) fn new(tokens: &'tokens [SecretString]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.expose_secret()).collect(),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Encode `payload` under `op`, stamped with the current time.
pub fn encode<P: Serialize>(op: OpCode, payload: &P) -> Result<String> {
    encode_at(op, now_millis(), payload)
}

/// Encode `payload` under `op` with an explicit send time.
pub fn encode_at<P: Serialize>(op: OpCode, t: i64, payload: &P) -> Result<String> {
    Ok(serde_json::to_string(&Outbound { op, t, d: payload })?)
}

/// Decode a text frame into an [`Envelope`].
///
/// Fails with [`GatewayError::Decode`] when the frame is not a JSON object with an integer `op`.
pub fn decode(frame: &str) -> Result<Envelope> {
    serde_json::from_str(frame).map_err(|e| GatewayError::Decode(e).into())
}
