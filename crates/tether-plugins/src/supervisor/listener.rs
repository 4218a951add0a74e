//! Background health-check loop.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Inner, SUPERVISOR_TARGET};
use crate::client::ClientHandle;
use crate::error::PluginError;

/// Outcome of waiting for the next probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The interval elapsed; probe the plugin.
    Probe,
    /// The loop was cancelled.
    Cancelled,
}

/// Paces the health-check loop.
///
/// Implementations must return [`Tick::Cancelled`] as soon as a message
/// arrives on `cancel` or its sender is dropped.
pub trait Ticker: Send + Sync {
    /// Blocks until the next probe is due or the loop is cancelled.
    fn wait(&self, cancel: &Receiver<()>) -> Tick;
}

impl<T> Ticker for Arc<T>
where
    T: Ticker + ?Sized,
{
    fn wait(&self, cancel: &Receiver<()>) -> Tick {
        (**self).wait(cancel)
    }
}

/// Wall-clock ticker firing at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    interval: Duration,
}

impl IntervalTicker {
    /// Creates a ticker firing every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the probe interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl Ticker for IntervalTicker {
    fn wait(&self, cancel: &Receiver<()>) -> Tick {
        if cancelled_within(cancel, self.interval) {
            Tick::Cancelled
        } else {
            Tick::Probe
        }
    }
}

/// Returns `true` when `cancel` fires or disconnects within `timeout`.
pub(super) fn cancelled_within(cancel: &Receiver<()>, timeout: Duration) -> bool {
    match cancel.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

/// Returns `true` when a cancellation is already pending.
pub(super) fn cancel_pending(cancel: &Receiver<()>) -> bool {
    match cancel.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

/// Reason a liveness probe failed.
#[derive(Debug, Clone)]
pub enum ProbeFailure {
    /// The supervisor holds no client, usually after a failed restart.
    MissingClient,
    /// The plugin process has terminated.
    Exited,
    /// The plugin did not answer a ping.
    Ping(PluginError),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClient => f.write_str("no client connected"),
            Self::Exited => f.write_str("plugin process exited"),
            Self::Ping(error) => write!(f, "ping failed: {error}"),
        }
    }
}

fn probe(client: Option<&Arc<dyn ClientHandle>>) -> Result<(), ProbeFailure> {
    let Some(client) = client else {
        return Err(ProbeFailure::MissingClient);
    };
    if client.has_exited() {
        return Err(ProbeFailure::Exited);
    }
    client.ping().map_err(ProbeFailure::Ping)
}

/// Rendezvous handles held by the supervisor for its running loop.
pub(super) struct Listener {
    cancel: SyncSender<()>,
    ack: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Listener {
    pub(super) const fn new(
        cancel: SyncSender<()>,
        ack: Receiver<()>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            cancel,
            ack,
            thread,
        }
    }

    /// Signals the loop and blocks until it has acknowledged and exited.
    pub(super) fn cancel(self) {
        // A closed channel means the loop is already gone; the join below
        // still reaps the thread.
        if self.cancel.send(()).is_ok() && self.ack.recv().is_err() {
            debug!(
                target: SUPERVISOR_TARGET,
                "health-check loop exited without acknowledging"
            );
        }
        if self.thread.join().is_err() {
            warn!(target: SUPERVISOR_TARGET, "health-check loop panicked");
        }
    }
}

/// Body of the health-check thread.
///
/// The lock is released while the client is probed so foreground calls are
/// never stuck behind a slow ping.
pub(super) fn run(inner: &Arc<Inner>, cancel: &Receiver<()>, ack: &SyncSender<()>) {
    loop {
        if inner.context.ticker.wait(cancel) == Tick::Cancelled {
            break;
        }

        let Some(state) = inner.lock_or_cancel(cancel) else {
            break;
        };
        let client = state.client.clone();
        drop(state);

        let Err(failure) = probe(client.as_ref()) else {
            continue;
        };
        inner.context.reporter.probe_failed(&inner.config, &failure);

        if cancel_pending(cancel) {
            break;
        }
        let Some(mut state) = inner.lock_or_cancel(cancel) else {
            break;
        };
        inner.restart_locked(&mut state);
    }

    if ack.send(()).is_err() {
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = inner.config.name(),
            "health-check loop cancelled without a waiting canceller"
        );
    }
}
