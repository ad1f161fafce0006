use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_stream::try_stream;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::codec::Envelope;
use super::error::GatewayError;
use super::events::GatewayEvent;
use crate::Result;

/// Broadcast channel capacity for event streams.
const BROADCAST_CAPACITY: usize = 1024;

/// Error a handler may return; it is logged and never reaches other subscribers.
pub type HandlerError = Box<dyn StdError + Send + Sync + 'static>;

/// A subscriber invoked synchronously for every published event.
///
/// Implemented for any `Fn(&GatewayEvent) -> Result<(), HandlerError>` closure.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &GatewayEvent) -> std::result::Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&GatewayEvent) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, event: &GatewayEvent) -> std::result::Result<(), HandlerError> {
        self(event)
    }
}

/// Handle returned by [`EventDispatcher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of subscribers and the fan-out point for gateway events.
///
/// Handlers run in subscription order on the lifecycle task. Streams from
/// [`EventDispatcher::events`] receive every event after all handlers have run.
pub struct EventDispatcher {
    handlers: RwLock<Vec<(SubscriptionId, Arc<dyn EventHandler>)>>,
    next_id: AtomicU64,
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            broadcast_tx,
        }
    }

    pub fn subscribe<H: EventHandler>(&self, handler: H) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        // The handler list has no intermediate state a panicking writer could leave behind.
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));

        id
    }

    /// Remove a handler. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);

        handlers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// A stream of every event published from now on.
    ///
    /// Yields [`GatewayError::Lagged`] if the consumer falls more than the channel capacity
    /// behind, then continues with the oldest retained event. Ends when the dispatcher is dropped.
    pub fn events(&self) -> impl Stream<Item = Result<GatewayEvent>> + use<> {
        let mut rx = self.broadcast_tx.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        yield event;
                    }
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Gateway event stream lagged, missed {n} events");
                        Err(GatewayError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Map `envelope` to its event, if any, and publish it.
    pub fn dispatch(&self, envelope: Envelope) -> Result<()> {
        if let Some(event) = GatewayEvent::from_envelope(envelope)? {
            self.publish(event);
        }

        Ok(())
    }

    /// Deliver `event` to every handler, then to every stream.
    ///
    /// A handler that fails or panics is reported and skipped; the remaining handlers still run.
    pub fn publish(&self, event: GatewayEvent) {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(subscription = ?id, error = %e, "Gateway event handler failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = (&id, &e);
                }
                Err(_panic) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(subscription = ?id, "Gateway event handler panicked");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &id;
                }
            }
        }

        // No receivers is not an error
        _ = self.broadcast_tx.send(event);
    }
}
