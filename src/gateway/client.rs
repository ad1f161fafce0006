use std::sync::Arc;

use futures::Stream;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::connection::{ConnectionState, Lifecycle};
use super::dispatcher::{EventDispatcher, EventHandler, SubscriptionId};
use super::events::GatewayEvent;
use super::transport::{Connector, WebSocketConnector};
use crate::Result;
use crate::error::{Error, Kind};

/// The public gateway endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://gateway.serverlist.space";

/// Client for the serverlist.space gateway.
///
/// Constructing a client validates its [`Config`] and immediately starts connecting in a
/// background task. The connection authenticates on open, sends heartbeats while open, and
/// reconnects according to the config. Clones share the same connection; it is shut down by
/// [`Client::shutdown`] or when the last clone is dropped.
///
/// # Example
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use serverlist_client_sdk::gateway::{Client, Config, GatewayEvent};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::builder()
///         .tokens(vec!["server-token".to_owned()])
///         .build();
///     let client = Client::new(config)?;
///
///     let mut events = Box::pin(client.events());
///     while let Some(event) = events.next().await {
///         if let GatewayEvent::ServerUpvoted { server_id, user } = event? {
///             println!("{} upvoted {server_id}", user.tag());
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<Config>,
    dispatcher: Arc<EventDispatcher>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: DroppingCancellationToken,
}

/// Cancels the lifecycle task once the last [`Client`] clone is gone.
struct DroppingCancellationToken(CancellationToken);

impl Drop for DroppingCancellationToken {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl Client {
    /// Create a client connected to [`DEFAULT_ENDPOINT`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, config)
    }

    /// Create a client connected to a custom WebSocket endpoint.
    pub fn with_endpoint(endpoint: &str, config: Config) -> Result<Self> {
        config.validate()?;

        Self::spawn(WebSocketConnector::new(endpoint)?, config)
    }

    /// Create a client that opens its connections through `connector`.
    pub fn with_connector<C: Connector>(connector: C, config: Config) -> Result<Self> {
        config.validate()?;

        Self::spawn(connector, config)
    }

    /// Start the lifecycle task for an already validated `config`.
    fn spawn<C: Connector>(connector: C, config: Config) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::with_source(Kind::Gateway, e))?;

        let config = Arc::new(config);
        let dispatcher = Arc::new(EventDispatcher::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting { attempt: 0 });
        let shutdown = CancellationToken::new();

        let lifecycle = Lifecycle::new(
            connector,
            Arc::clone(&config),
            Arc::clone(&dispatcher),
            state_tx,
            shutdown.clone(),
        );
        runtime.spawn(lifecycle.run());

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                dispatcher,
                state_rx,
                shutdown: DroppingCancellationToken(shutdown),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Register a handler that is called synchronously for every event, in subscription order.
    ///
    /// A handler that returns an error or panics is logged and skipped.
    pub fn subscribe<H: EventHandler>(&self, handler: H) -> SubscriptionId {
        self.inner.dispatcher.subscribe(handler)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }

    /// A stream of every event from now on. Each call returns an independent stream.
    pub fn events(&self) -> impl Stream<Item = Result<GatewayEvent>> + use<> {
        self.inner.dispatcher.events()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Permanently stop this client: cancel any pending reconnection, stop the heartbeat and
    /// close the transport. Returns immediately; the state becomes
    /// [`ConnectionState::Terminated`] once the background task has finished. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.0.cancel();
    }
}
