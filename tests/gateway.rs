#![cfg(feature = "gateway")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

//! Integration tests for the gateway client against a local WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::Stream;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use serverlist_client_sdk::error::Kind;
use serverlist_client_sdk::gateway::{Client, Config, ConnectionState, GatewayEvent};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    SendBinary(Vec<u8>),
    Close { code: u16, reason: &'static str },
}

/// Mock gateway server.
struct MockGatewayServer {
    addr: SocketAddr,
    /// Commands for every open connection
    command_tx: broadcast::Sender<Command>,
    /// Text frames received from clients, tagged with the connection number
    frame_rx: mpsc::UnboundedReceiver<(usize, String)>,
    /// Close codes the client answered a server close with; `None` if it never answered
    close_reply_rx: mpsc::UnboundedReceiver<(usize, Option<u16>)>,
    connections: Arc<AtomicUsize>,
}

impl MockGatewayServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<Command>(100);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (close_reply_tx, close_reply_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let commands = command_tx.clone();
        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                // Subscribe before the handshake so no command sent after it is missed
                let mut command_rx = commands.subscribe();

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let connection = counter.fetch_add(1, Ordering::SeqCst) + 1;

                let (mut write, mut read) = ws_stream.split();
                let frame_tx = frame_tx.clone();
                let close_reply_tx = close_reply_tx.clone();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    drop(frame_tx.send((connection, text.to_string())));
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            command = command_rx.recv() => match command {
                                Ok(Command::Send(text)) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(Command::SendBinary(bytes)) => {
                                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(Command::Close { code, reason }) => {
                                    let frame = CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: Utf8Bytes::from_static(reason),
                                    };
                                    drop(write.send(Message::Close(Some(frame))).await);

                                    let reply = timeout(WAIT, async {
                                        loop {
                                            match read.next().await {
                                                Some(Ok(Message::Close(frame))) => {
                                                    break frame.map(|f| u16::from(f.code));
                                                }
                                                Some(Ok(_)) => {}
                                                _ => break None,
                                            }
                                        }
                                    })
                                    .await
                                    .unwrap_or(None);
                                    drop(close_reply_tx.send((connection, reply)));
                                    break;
                                }
                                Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            frame_rx,
            close_reply_rx,
            connections,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn send(&self, frame: &Value) {
        drop(self.command_tx.send(Command::Send(frame.to_string())));
    }

    fn close(&self, code: u16, reason: &'static str) {
        drop(self.command_tx.send(Command::Close { code, reason }));
    }

    fn send_binary(&self, bytes: Vec<u8>) {
        drop(self.command_tx.send(Command::SendBinary(bytes)));
    }

    /// How the client answered the last server-initiated close.
    async fn recv_close_reply(&mut self) -> (usize, Option<u16>) {
        timeout(WAIT, self.close_reply_rx.recv())
            .await
            .expect("timed out waiting for a close reply")
            .unwrap()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame any client sent, parsed as JSON.
    async fn recv_frame(&mut self) -> (usize, Value) {
        let (connection, text) = timeout(WAIT, self.frame_rx.recv())
            .await
            .expect("timed out waiting for a client frame")
            .unwrap();

        (connection, serde_json::from_str(&text).unwrap())
    }
}

fn config(auto_reconnect: bool) -> Config {
    Config::builder()
        .tokens(vec!["abc".to_owned(), "def".to_owned()])
        .heartbeat_interval_secs(1)
        .auto_reconnect(auto_reconnect)
        .build()
}

async fn next_event(
    events: &mut (impl Stream<Item = serverlist_client_sdk::Result<GatewayEvent>> + Unpin),
) -> GatewayEvent {
    timeout(WAIT, events.next())
        .await
        .expect("timed out waiting for an event")
        .unwrap()
        .unwrap()
}

/// Skips heartbeats, whose timing is not under test control.
async fn next_non_heartbeat(
    events: &mut (impl Stream<Item = serverlist_client_sdk::Result<GatewayEvent>> + Unpin),
) -> GatewayEvent {
    loop {
        let event = next_event(events).await;
        if !matches!(event, GatewayEvent::HeartbeatSent { .. }) {
            return event;
        }
    }
}

/// Waits for the authenticate frame of connection number `connection`.
async fn expect_auth(server: &mut MockGatewayServer, connection: usize) {
    let (from, frame) = server.recv_frame().await;

    assert_eq!(from, connection);
    assert_eq!(frame["op"], 0);
    assert_eq!(frame["d"], json!({ "tokens": ["abc", "def"] }));
    assert!(frame["t"].as_i64().unwrap() > 0, "timestamp must be set");
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn authenticates_first_then_dispatches_events() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);
        assert!(client.state().is_open());

        server.send(&json!({ "op": 3, "t": 1, "d": { "server": "S1" } }));
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::ServerJoined {
                server_id: "S1".to_owned()
            }
        );

        server.send(&json!({
            "op": 4,
            "t": 2,
            "d": {
                "server": "S1",
                "user": {
                    "id": "42",
                    "avatar": null,
                    "username": "voter",
                    "discriminator": "0042",
                    "short_description": null
                }
            }
        }));
        let GatewayEvent::ServerUpvoted { server_id, user } = next_non_heartbeat(&mut events).await
        else {
            panic!("expected ServerUpvoted");
        };
        assert_eq!(server_id, "S1");
        assert_eq!(user.tag(), "voter#0042");

        client.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_connection_stays_open() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        drop(server.command_tx.send(Command::Send("{not json".to_owned())));
        assert!(matches!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::ProtocolError { .. }
        ));

        server.send(&json!({ "op": 2, "t": 1, "d": { "server": "S9" } }));
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::ServerViewed {
                server_id: "S9".to_owned()
            }
        );
        assert_eq!(server.connections(), 1);

        client.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_as_text() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        server.send_binary(
            json!({ "op": 3, "t": 1, "d": { "server": "S4" } })
                .to_string()
                .into_bytes(),
        );
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::ServerJoined {
                server_id: "S4".to_owned()
            }
        );

        server.send_binary(vec![0xff, 0xfe, 0x7b]);
        let GatewayEvent::ProtocolError { detail } = next_non_heartbeat(&mut events).await else {
            panic!("expected ProtocolError");
        };
        assert!(detail.contains("UTF-8"), "{detail}");

        server.send(&json!({ "op": 2, "t": 2, "d": { "server": "S4" } }));
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::ServerViewed {
                server_id: "S4".to_owned()
            }
        );
        assert!(client.state().is_open());
        assert_eq!(server.connections(), 1);

        client.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn heartbeats_follow_the_interval() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        for _ in 0..2 {
            let (from, frame) = server.recv_frame().await;
            assert_eq!(from, 1);
            assert_eq!(frame["op"], 1);
            assert_eq!(frame["d"], json!({}));

            let GatewayEvent::HeartbeatSent { timestamp_millis } = next_event(&mut events).await
            else {
                panic!("expected HeartbeatSent");
            };
            assert_eq!(frame["t"].as_i64().unwrap(), timestamp_millis);
        }

        client.shutdown();
        Ok(())
    }
}

mod reconnection {
    use super::*;

    #[tokio::test]
    async fn auth_invalidated_always_reconnects_silently() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(false))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        server.close(4006, "session invalidated");

        // A Disconnected here would fail the assertion
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::Connected
        );
        loop {
            let (from, frame) = server.recv_frame().await;
            if from == 2 {
                assert_eq!(frame["op"], 0);
                break;
            }
        }
        assert_eq!(server.connections(), 2);

        client.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn normal_close_without_auto_reconnect_stays_closed() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(false))?;
        let mut events = Box::pin(client.events());
        let mut state = client.state_receiver();

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        server.close(1000, "maintenance");
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::Disconnected {
                code: 1000,
                reason: Some("maintenance".to_owned())
            }
        );
        timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Closed)).await??;
        assert_eq!(server.recv_close_reply().await, (1, Some(1000)));

        // Nothing else happens: no heartbeat, no reconnect, no second Disconnected
        let quiet = timeout(Duration::from_millis(2500), events.next()).await;
        assert!(quiet.is_err(), "unexpected event: {quiet:?}");
        assert_eq!(server.connections(), 1);

        client.shutdown();
        timeout(WAIT, state.wait_for(|s| s.is_terminated())).await??;
        Ok(())
    }

    #[tokio::test]
    async fn server_close_is_answered_before_reconnecting() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(false))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        server.close(4006, "session invalidated");
        assert_eq!(server.recv_close_reply().await, (1, Some(4006)));
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::Connected
        );

        client.shutdown();
        Ok(())
    }

    #[tokio::test]
    async fn normal_close_with_auto_reconnect_reconnects() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        server.close(1001, "");
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::Disconnected {
                code: 1001,
                reason: None
            }
        );
        assert_eq!(
            next_non_heartbeat(&mut events).await,
            GatewayEvent::Connected
        );
        assert_eq!(server.connections(), 2);

        client.shutdown();
        Ok(())
    }
}

mod construction {
    use super::*;

    #[tokio::test]
    async fn invalid_config_never_connects() -> anyhow::Result<()> {
        let server = MockGatewayServer::start().await;

        let cases = [
            Config::builder().tokens(Vec::new()).build(),
            Config::builder().tokens(vec![String::new()]).build(),
            Config::builder()
                .tokens(vec!["abc".to_owned()])
                .heartbeat_interval_secs(0)
                .build(),
            Config::builder()
                .tokens(vec!["abc".to_owned()])
                .heartbeat_interval_secs(56)
                .build(),
        ];
        for config in cases {
            let err = Client::with_endpoint(&server.ws_url(), config).err().unwrap();
            assert_eq!(err.kind(), Kind::Validation);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.connections(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_endpoint_should_fail() {
        let err = Client::with_endpoint("not a url", config(true)).err().unwrap();

        assert_eq!(err.kind(), Kind::Gateway);
    }

    #[tokio::test]
    async fn shutdown_terminates_and_closes_the_connection() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());
        let mut state = client.state_receiver();

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        client.shutdown();
        timeout(WAIT, state.wait_for(|s| s.is_terminated())).await??;

        let quiet = timeout(Duration::from_millis(1500), events.next()).await;
        assert!(
            !matches!(quiet, Ok(Some(Ok(GatewayEvent::Disconnected { .. })))),
            "shutdown must not report Disconnected"
        );
        assert_eq!(server.connections(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropping_the_last_handle_shuts_down() -> anyhow::Result<()> {
        let mut server = MockGatewayServer::start().await;
        let client = Client::with_endpoint(&server.ws_url(), config(true))?;
        let mut events = Box::pin(client.events());
        let mut state = client.state_receiver();

        expect_auth(&mut server, 1).await;
        assert_eq!(next_event(&mut events).await, GatewayEvent::Connected);

        let clone = client.clone();
        drop(client);
        assert!(clone.state().is_open(), "a clone keeps the connection");

        drop(clone);
        timeout(WAIT, state.wait_for(|s| s.is_terminated())).await??;
        Ok(())
    }
}
