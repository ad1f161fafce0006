//! The transport seam between the lifecycle state machine and the network.
//!
//! A [`Connector`] opens connections; each [`Transport`] it returns can send text frames, close,
//! and yields its notifications as [`TransportEvent`]s. The lifecycle drives whatever transport it
//! is given through this one contract, so a reconnect simply asks the connector for a new one.

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A notification from an open transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Message(String),
    /// The peer sent a close frame. `code` is `None` if the frame carried no status code.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    /// The transport failed. It is followed by the end of the notification stream unless a close
    /// frame still arrives.
    Error(String),
}

/// Opens transport connections to the gateway.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport>;
}

/// One open connection. Exclusively owned by the lifecycle task.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, frame: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Next notification, or `None` once the connection has ended without a close frame.
    ///
    /// Must be cancel safe: it is raced against heartbeat ticks and shutdown.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

/// [`Connector`] for a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
}

impl WebSocketConnector {
    /// Fails if `endpoint` is not a valid WebSocket URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        endpoint.into_client_request()?;

        Ok(Self {
            endpoint: endpoint.to_owned(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport> {
        let (stream, _) = connect_async(self.endpoint.as_str()).await?;

        Ok(WebSocketTransport { stream })
    }
}

/// [`Transport`] over a `tokio-tungstenite` stream.
pub struct WebSocketTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(TransportEvent::Message(text.to_string())),
                Ok(Message::Binary(bytes)) => {
                    return Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => TransportEvent::Message(text.to_owned()),
                        Err(e) => TransportEvent::Error(format!("binary frame is not UTF-8: {e}")),
                    });
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            let reason = frame.reason.to_string();
                            (
                                Some(u16::from(frame.code)),
                                (!reason.is_empty()).then_some(reason),
                            )
                        }
                        None => (None, None),
                    };

                    return Some(TransportEvent::Closed { code, reason });
                }
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
                // Pings are answered by tungstenite itself
                Ok(_) => {}
            }
        }
    }
}
