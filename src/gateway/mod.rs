#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Real-time gateway client for serverlist.space.
//!
//! **Feature flag:** `gateway` (enabled by default)
//!
//! The gateway is a WebSocket service that notifies a server owner when their listed servers are
//! viewed, joined or upvoted. A [`Client`] keeps one connection open for a set of server tokens:
//! it authenticates as soon as the connection opens, sends a heartbeat on a fixed interval while
//! open, and reconnects after the connection closes.
//!
//! # Wire format
//!
//! Every frame is a JSON [`Envelope`](codec::Envelope) `{ "op": u8, "t": millis, "d": payload }`:
//!
//! | Op | Direction | Payload |
//! |----|-----------|---------|
//! | `0` | client to server | `{ "tokens": [..] }`, once per connection |
//! | `1` | client to server | `{}`, every heartbeat interval |
//! | `2` | server to client | `{ "server": id }`, a server page was viewed |
//! | `3` | server to client | `{ "server": id }`, someone joined through the site |
//! | `4` | server to client | `{ "server": id, "user": User }`, a server was upvoted |
//!
//! # Reconnection
//!
//! Close code [`AUTH_INVALIDATED`] (4006) always triggers a reconnect and is never reported as
//! [`GatewayEvent::Disconnected`]. Any other close is reported and then reconnected only if
//! [`Config::auto_reconnect`] is set, immediately or after the configured
//! [`ReconnectBackoff`].
//!
//! # Example
//!
//! ```rust, no_run
//! use std::time::Duration;
//!
//! use serverlist_client_sdk::gateway::{Client, Config, GatewayEvent, HandlerError};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::builder()
//!         .tokens(vec!["server-token".to_owned()])
//!         .heartbeat_interval_secs(30)
//!         .build();
//!     let client = Client::new(config)?;
//!
//!     client.subscribe(|event: &GatewayEvent| -> Result<(), HandlerError> {
//!         if let GatewayEvent::ServerJoined { server_id } = event {
//!             println!("someone joined {server_id}");
//!         }
//!         Ok(())
//!     });
//!
//!     tokio::time::sleep(Duration::from_secs(3600)).await;
//!     client.shutdown();
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub(crate) mod heartbeat;
pub mod policy;
pub mod transport;

// Re-export commonly used types
pub use client::{Client, DEFAULT_ENDPOINT};
pub use codec::{Envelope, OpCode};
pub use config::{Config, ReconnectBackoff};
pub use connection::ConnectionState;
pub use dispatcher::{EventDispatcher, EventHandler, HandlerError, SubscriptionId};
pub use error::GatewayError;
pub use events::GatewayEvent;
pub use policy::{AUTH_INVALIDATED, Decision};
pub use transport::{Connector, Transport, TransportEvent, WebSocketConnector};
