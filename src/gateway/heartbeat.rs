use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// A tick from the heartbeat timer, delivered into the lifecycle's event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tick {
    generation: u64,
}

#[derive(Debug)]
struct Timer {
    token: CancellationToken,
    generation: u64,
}

/// Owns the single repeating heartbeat timer of a connection.
///
/// The timer runs as a background task that only pushes [`Tick`]s into a channel; the lifecycle
/// task decides what a tick means. Each armed timer gets a new generation so that a tick already
/// queued by a cancelled timer is never mistaken for one from the current timer.
#[derive(Debug)]
pub(crate) struct HeartbeatScheduler {
    tick_tx: mpsc::UnboundedSender<Tick>,
    timer: Option<Timer>,
    generation: u64,
}

impl HeartbeatScheduler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Tick>) {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        (
            Self {
                tick_tx,
                timer: None,
                generation: 0,
            },
            tick_rx,
        )
    }

    /// Arm the timer. The first tick fires one full `period` from now.
    ///
    /// Any timer that is already armed is cancelled first.
    pub(crate) fn start(&mut self, period: Duration) {
        self.stop();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let tick_tx = self.tick_tx.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token_clone.cancelled() => break,
                    _ = ticker.tick() => {
                        if tick_tx.send(Tick { generation }).is_err() {
                            // Lifecycle task has terminated
                            break;
                        }
                    }
                }
            }
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(generation, ?period, "Heartbeat timer armed");

        self.timer = Some(Timer { token, generation });
    }

    /// Disarm the timer. Safe to call when already stopped.
    pub(crate) fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();

            #[cfg(feature = "tracing")]
            tracing::trace!(generation = timer.generation, "Heartbeat timer disarmed");
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether `tick` was produced by the currently armed timer.
    pub(crate) fn accepts(&self, tick: Tick) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| timer.generation == tick.generation)
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
