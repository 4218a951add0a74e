//! Lifecycle supervision of a single plugin instance.
//!
//! A [`PluginSupervisor`] owns at most one [`ClientHandle`] and at most one
//! health-check loop at a time. Foreground calls (`start`, `close`,
//! `is_stopped`) and the background loop mutate the same state, so every
//! mutation happens under one per-instance mutex. Methods suffixed
//! `_locked` operate on a guard the caller already holds; the public methods
//! acquire the lock and delegate to them.
//!
//! ```text
//! Stopped --start--> Starting --ok--> Running --close--> Stopped
//!                       |                |
//!                       +--error--> Stopped (error recorded)
//!                                        |
//!               Running --probe fails--> Starting --> Running | Stopped
//! ```
//!
//! The loop restarts a failed plugin itself, without cancelling its own
//! listener, and keeps retrying every interval until it is cancelled.

mod listener;

use std::sync::mpsc::{Receiver, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::client::{ClientHandle, PluginConnector};
use crate::config::{PluginConfig, thread_name};
use crate::error::PluginError;
use crate::health::{LifecycleReporter, StructuredLifecycleReporter};
use crate::integrity::{IntegrityVerifier, Sha2Verifier};

use self::listener::Listener;
pub use self::listener::{IntervalTicker, ProbeFailure, Tick, Ticker};

const SUPERVISOR_TARGET: &str = "tether_plugins::supervisor";

/// Polling period used by the loop while it waits for a contended lock.
const LOCK_RETRY: Duration = Duration::from_millis(5);

/// Coarse view of a supervisor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    /// No client and no recorded failure.
    Stopped,
    /// A client is live and the health-check loop probes it.
    Running,
    /// The last start or restart attempt failed.
    Failed,
}

/// Collaborators shared by every supervisor a host creates.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_plugins::process::ProcessConnector;
/// use tether_plugins::supervisor::SupervisorContext;
///
/// let context = SupervisorContext::new(ProcessConnector::new())
///     .with_health_check_interval(Duration::from_secs(10));
/// # let _ = context;
/// ```
#[derive(Clone)]
pub struct SupervisorContext {
    connector: Arc<dyn PluginConnector>,
    verifier: Arc<dyn IntegrityVerifier>,
    reporter: Arc<dyn LifecycleReporter>,
    ticker: Arc<dyn Ticker>,
    start_timeout: Duration,
}

impl SupervisorContext {
    /// Creates a context using the default verifier, reporter, a
    /// health-check interval of 30 seconds and a start timeout of 60 seconds.
    #[must_use]
    pub fn new(connector: impl PluginConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            verifier: Arc::new(Sha2Verifier),
            reporter: Arc::new(StructuredLifecycleReporter::new()),
            ticker: Arc::new(IntervalTicker::new(
                tether_config::default_health_check_interval(),
            )),
            start_timeout: tether_config::default_start_timeout(),
        }
    }

    /// Creates a context whose probe cadence and default start timeout
    /// follow the host configuration.
    #[must_use]
    pub fn from_config(
        config: &tether_config::Config,
        connector: impl PluginConnector + 'static,
    ) -> Self {
        Self::new(connector)
            .with_health_check_interval(config.health_check_interval())
            .with_default_start_timeout(config.default_start_timeout())
    }

    /// Overrides the integrity verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl IntegrityVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Overrides the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl LifecycleReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Overrides the timer that paces liveness probes.
    #[must_use]
    pub fn with_ticker(mut self, ticker: impl Ticker + 'static) -> Self {
        self.ticker = Arc::new(ticker);
        self
    }

    /// Probes plugins every `interval`.
    #[must_use]
    pub fn with_health_check_interval(self, interval: Duration) -> Self {
        self.with_ticker(IntervalTicker::new(interval))
    }

    /// Start timeout given to plugins that do not set their own.
    #[must_use]
    pub fn with_default_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Returns the start timeout given to plugins that do not set their own.
    #[must_use]
    pub const fn default_start_timeout(&self) -> Duration {
        self.start_timeout
    }
}

/// Supervises one plugin process: launch, verification, liveness, restart,
/// and teardown.
///
/// Cloning yields another handle to the same supervisor. The health-check
/// loop keeps the supervisor alive until [`PluginSupervisor::close`] is
/// called.
#[derive(Clone)]
pub struct PluginSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: PluginConfig,
    context: SupervisorContext,
    state: Mutex<State>,
}

struct State {
    client: Option<Arc<dyn ClientHandle>>,
    last_error: Option<PluginError>,
    stopped: bool,
    listener: Option<Listener>,
}

impl PluginSupervisor {
    /// Creates a stopped supervisor for `config`.
    ///
    /// A config without its own start timeout takes the context's default.
    #[must_use]
    pub fn new(config: PluginConfig, context: SupervisorContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.with_default_start_timeout(context.default_start_timeout()),
                context,
                state: Mutex::new(State {
                    client: None,
                    last_error: None,
                    stopped: true,
                    listener: None,
                }),
            }),
        }
    }

    /// Starts (or restarts) the plugin.
    ///
    /// Any previous client and health-check loop are torn down first. The
    /// executable is verified when a secure-config is present, then the
    /// connector launches the plugin and a fresh health-check loop is
    /// spawned. Failures are recorded and observable through
    /// [`PluginSupervisor::last_error`]; they leave the supervisor stopped.
    /// The instance lock is held for the whole operation.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        self.inner.start_locked(&mut state);
    }

    /// Tears the plugin down. Calling it on a stopped supervisor is a no-op.
    ///
    /// Cancels the health-check loop, closes the RPC channel (errors are
    /// ignored), terminates the process whenever a client exists, and marks
    /// the supervisor stopped.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        self.inner.close_locked(&mut state);
    }

    /// Stops the health-check loop and waits for it to acknowledge.
    ///
    /// No probe runs after this returns. The client, if any, is left alone.
    pub fn cancel_listen(&self) {
        let mut state = self.inner.lock();
        Inner::cancel_listen_locked(&mut state);
    }

    /// Returns the stopped flag.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Returns the most recent start, verification, or restart failure.
    #[must_use]
    pub fn last_error(&self) -> Option<PluginError> {
        self.inner.lock().last_error.clone()
    }

    /// Returns a snapshot of the supervisor's state.
    #[must_use]
    pub fn status(&self) -> PluginStatus {
        let state = self.inner.lock();
        if state.client.is_some() && !state.stopped {
            PluginStatus::Running
        } else if state.last_error.is_some() {
            PluginStatus::Failed
        } else {
            PluginStatus::Stopped
        }
    }

    /// Returns `true` while a health-check loop is attached.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.lock().listener.is_some()
    }

    /// Returns the supervised plugin's configuration.
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.inner.config
    }

    /// Returns `true` when both handles point at the same supervisor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for PluginSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSupervisor")
            .field("id", &self.inner.config.id())
            .field("name", &self.inner.config.name())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the lock unless a cancellation arrives first.
    ///
    /// Foreground callers send the cancellation while holding the lock and
    /// keep holding it until the loop acknowledges, so the loop must never
    /// block on the lock unconditionally.
    fn lock_or_cancel(&self, cancel: &Receiver<()>) -> Option<MutexGuard<'_, State>> {
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if listener::cancelled_within(cancel, LOCK_RETRY) {
                        return None;
                    }
                }
            }
        }
    }

    fn start_locked(self: &Arc<Self>, state: &mut State) {
        self.close_locked(state);
        state.stopped = false;
        self.context.reporter.starting(&self.config);

        let client = match self.launch() {
            Ok(client) => client,
            Err(error) => {
                self.record_failure(state, error);
                return;
            }
        };

        match self.spawn_listener() {
            Ok(listener) => {
                state.client = Some(client);
                state.listener = Some(listener);
                state.last_error = None;
                self.context.reporter.running(&self.config);
            }
            Err(error) => {
                client.terminate();
                self.record_failure(state, error);
            }
        }
    }

    /// Relaunches the plugin from inside the health-check loop.
    ///
    /// The calling loop stays attached; only the client is replaced.
    fn restart_locked(&self, state: &mut State) {
        self.context.reporter.restarting(&self.config);
        self.release_client(state);
        match self.launch() {
            Ok(client) => {
                state.client = Some(client);
                state.stopped = false;
                state.last_error = None;
                self.context.reporter.running(&self.config);
            }
            Err(cause) => {
                let error = PluginError::restart_failed(self.config.name(), cause);
                self.record_failure(state, error);
            }
        }
    }

    fn close_locked(&self, state: &mut State) {
        let was_active = state.client.is_some() || state.listener.is_some();
        Self::cancel_listen_locked(state);
        self.release_client(state);
        state.stopped = true;
        if was_active {
            self.context.reporter.stopped(&self.config);
        }
    }

    fn cancel_listen_locked(state: &mut State) {
        if let Some(listener) = state.listener.take() {
            listener.cancel();
        }
    }

    fn launch(&self) -> Result<Arc<dyn ClientHandle>, PluginError> {
        if let Some(secure) = self.config.secure_config() {
            self.context
                .verifier
                .verify(self.config.executable(), secure)?;
        }
        self.context.connector.connect(&self.config)
    }

    /// Closes and kills the current client, if there is one.
    fn release_client(&self, state: &mut State) {
        let Some(client) = state.client.take() else {
            return;
        };
        if let Err(error) = client.close_rpc() {
            debug!(
                target: SUPERVISOR_TARGET,
                plugin = self.config.name(),
                error = %error,
                "ignoring RPC close failure"
            );
        }
        client.terminate();
    }

    fn record_failure(&self, state: &mut State, error: PluginError) {
        self.context.reporter.start_failed(&self.config, &error);
        state.stopped = true;
        state.last_error = Some(error);
    }

    fn spawn_listener(self: &Arc<Self>) -> Result<Listener, PluginError> {
        let (cancel_tx, cancel_rx) = sync_channel(1);
        let (ack_tx, ack_rx) = sync_channel(1);
        let inner = Arc::clone(self);
        let thread = thread::Builder::new()
            .name(thread_name("health", self.config.name()))
            .spawn(move || listener::run(&inner, &cancel_rx, &ack_tx))
            .map_err(|source| PluginError::HealthCheckSpawn {
                name: self.config.name().to_owned(),
                source: Arc::new(source),
            })?;
        Ok(Listener::new(cancel_tx, ack_rx, thread))
    }
}
