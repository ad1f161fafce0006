#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::codec::{self, Authenticate, OpCode};
use super::config::Config;
use super::dispatcher::EventDispatcher;
use super::events::GatewayEvent;
use super::heartbeat::{HeartbeatScheduler, Tick};
use super::policy::{self, AUTH_INVALIDATED, Decision, ReconnectSchedule};
use super::transport::{Connector, Transport, TransportEvent};

/// Close code reported when a close frame carried no status code.
const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the connection ended without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection state of a gateway client.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    /// Opening a transport connection
    Connecting {
        /// Consecutive attempts since the last successful open, starting at 0
        attempt: u32,
    },
    /// Authenticated and sending heartbeats
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// The transport is shutting down; no more frames are sent
    Closing,
    /// Disconnected. Permanent if the reconnection policy decided to stop.
    Closed,
    /// Shut down by the caller. Never left.
    Terminated,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open { .. })
    }

    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// How a transport connection ended.
#[derive(Debug)]
struct Closure {
    code: Option<u16>,
    reason: Option<String>,
    /// Whether the peer sent a close frame
    clean: bool,
}

impl Closure {
    fn abnormal() -> Self {
        Self {
            code: None,
            reason: None,
            clean: false,
        }
    }

    fn reported_code(&self) -> u16 {
        match (self.code, self.clean) {
            (Some(code), _) => code,
            (None, true) => NO_STATUS_RECEIVED,
            (None, false) => ABNORMAL_CLOSURE,
        }
    }
}

enum Outcome {
    Closed(Closure),
    Shutdown,
}

/// The per-client state machine. Runs as a single task, so transport notifications, heartbeat
/// ticks and shutdown are handled one at a time in arrival order.
pub(crate) struct Lifecycle<C: Connector> {
    connector: C,
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    heartbeat: HeartbeatScheduler,
    ticks: mpsc::UnboundedReceiver<Tick>,
    schedule: ReconnectSchedule,
}

impl<C: Connector> Lifecycle<C> {
    pub(crate) fn new(
        connector: C,
        config: Arc<Config>,
        dispatcher: Arc<EventDispatcher>,
        state_tx: watch::Sender<ConnectionState>,
        shutdown: CancellationToken,
    ) -> Self {
        let (heartbeat, ticks) = HeartbeatScheduler::new();
        let schedule = ReconnectSchedule::new(config.reconnect_backoff());

        Self {
            connector,
            config,
            dispatcher,
            state_tx,
            shutdown,
            heartbeat,
            ticks,
            schedule,
        }
    }

    /// Connect, and keep reconnecting for as long as the policy allows.
    pub(crate) async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting {
                attempt: self.schedule.attempt(),
            });

            let connected = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    self.terminate();
                    return;
                }
                result = self.connector.connect() => result,
            };

            let closure = match connected {
                Ok(transport) => match self.drive(transport).await {
                    Outcome::Closed(closure) => closure,
                    Outcome::Shutdown => {
                        self.terminate();
                        return;
                    }
                },
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Unable to connect to gateway: {e:?}");
                    self.dispatcher.publish(GatewayEvent::ProtocolError {
                        detail: e.to_string(),
                    });
                    Closure::abnormal()
                }
            };

            debug_assert!(!self.heartbeat.is_armed(), "heartbeat armed while closed");
            self.set_state(ConnectionState::Closed);

            if closure.code != Some(AUTH_INVALIDATED) {
                self.dispatcher.publish(GatewayEvent::Disconnected {
                    code: closure.reported_code(),
                    reason: closure.reason.clone(),
                });
            }

            let decision = policy::decide(closure.code, self.config.auto_reconnect());

            #[cfg(feature = "tracing")]
            tracing::debug!(code = ?closure.code, %decision, "Gateway connection closed");

            if decision == Decision::Stop {
                self.idle_until_shutdown().await;
                return;
            }

            // 4006 is not counted against the attempt cap
            match self
                .schedule
                .next_delay(closure.code != Some(AUTH_INVALIDATED))
            {
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempts = self.schedule.attempt(),
                        "Giving up on gateway reconnection"
                    );
                    self.idle_until_shutdown().await;
                    return;
                }
                Some(delay) if !delay.is_zero() => {
                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => {
                            self.terminate();
                            return;
                        }
                        () = sleep(delay) => {}
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Handle one open transport until it closes or the client shuts down.
    async fn drive(&mut self, mut transport: C::Transport) -> Outcome {
        let authenticate = Authenticate::new(self.config.tokens());
        let sent = match codec::encode(OpCode::Authenticate, &authenticate) {
            Ok(frame) => transport.send(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            #[cfg(feature = "tracing")]
            tracing::warn!("Unable to authenticate with gateway: {e:?}");
            self.dispatcher.publish(GatewayEvent::ProtocolError {
                detail: e.to_string(),
            });
            self.set_state(ConnectionState::Closing);
            close(&mut transport).await;
            return Outcome::Closed(Closure::abnormal());
        }

        self.schedule.reset();
        self.set_state(ConnectionState::Open {
            since: Instant::now(),
        });
        self.dispatcher.publish(GatewayEvent::Connected);
        self.heartbeat.start(self.config.heartbeat_interval());

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    self.heartbeat.stop();
                    self.set_state(ConnectionState::Closing);
                    close(&mut transport).await;
                    return Outcome::Shutdown;
                }

                event = transport.next_event() => match event {
                    Some(TransportEvent::Message(text)) => self.handle_frame(&text),
                    Some(TransportEvent::Closed { code, reason }) => {
                        self.heartbeat.stop();
                        self.set_state(ConnectionState::Closing);
                        // Completes the closing handshake by flushing the queued close reply
                        close(&mut transport).await;
                        return Outcome::Closed(Closure { code, reason, clean: true });
                    }
                    Some(TransportEvent::Error(detail)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(%detail, "Gateway transport error");
                        self.dispatcher.publish(GatewayEvent::ProtocolError { detail });
                    }
                    None => {
                        self.heartbeat.stop();
                        self.set_state(ConnectionState::Closing);
                        return Outcome::Closed(Closure::abnormal());
                    }
                },

                Some(tick) = self.ticks.recv() => {
                    if !self.heartbeat.accepts(tick) {
                        continue;
                    }
                    if !self.state_tx.borrow().is_open() {
                        self.heartbeat.stop();
                        continue;
                    }
                    self.send_heartbeat(&mut transport).await;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received gateway frame");

        if let Err(e) = codec::decode(text).and_then(|envelope| self.dispatcher.dispatch(envelope))
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(%text, error = %e, "Failed to handle gateway frame");
            self.dispatcher.publish(GatewayEvent::ProtocolError {
                detail: e.to_string(),
            });
        }
    }

    async fn send_heartbeat(&self, transport: &mut C::Transport) {
        let timestamp_millis = codec::now_millis();
        let frame = codec::encode_at(
            OpCode::Heartbeat,
            timestamp_millis,
            &serde_json::Map::<String, serde_json::Value>::new(),
        );
        let sent = match frame {
            Ok(frame) => transport.send(frame).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(timestamp_millis, "Heartbeat sent");
                self.dispatcher
                    .publish(GatewayEvent::HeartbeatSent { timestamp_millis });
            }
            // A dead transport also ends its notification stream, which closes the connection
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Unable to send heartbeat: {e:?}");
                self.dispatcher.publish(GatewayEvent::ProtocolError {
                    detail: e.to_string(),
                });
            }
        }
    }

    /// Stay [`ConnectionState::Closed`] until the client is shut down or dropped.
    async fn idle_until_shutdown(&mut self) {
        self.shutdown.cancelled().await;
        self.terminate();
    }

    fn terminate(&mut self) {
        self.heartbeat.stop();
        self.set_state(ConnectionState::Terminated);

        #[cfg(feature = "tracing")]
        tracing::debug!("Gateway client terminated");
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

async fn close<T: Transport>(transport: &mut T) {
    if let Err(e) = transport.close().await {
        #[cfg(feature = "tracing")]
        tracing::debug!("Error closing gateway transport: {e:?}");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}
