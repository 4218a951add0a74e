//! Scriptable doubles for the RPC layer and the probe timer.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::client::{ClientHandle, PluginConnector};
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::health::LifecycleReporter;
use crate::supervisor::{ProbeFailure, SupervisorContext, Tick, Ticker};

/// Polls `condition` until it holds or two seconds pass.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Client whose liveness is scripted by the test.
#[derive(Default)]
pub(crate) struct FakeClient {
    pings: AtomicUsize,
    fail_pings_from: Option<usize>,
    exited: AtomicBool,
    terminations: AtomicUsize,
    rpc_closes: AtomicUsize,
    gate: Option<PingGate>,
}

/// Holds a ping in flight until the test releases it.
pub(crate) struct PingGate {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl FakeClient {
    pub(crate) fn healthy() -> Self {
        Self::default()
    }

    /// Fails every ping from the `nth` one (1-based) onwards.
    pub(crate) fn failing_from(nth: usize) -> Self {
        Self {
            fail_pings_from: Some(nth),
            ..Self::default()
        }
    }

    /// Blocks every ping until a message arrives on the returned sender.
    pub(crate) fn gated() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let client = Self {
            gate: Some(PingGate {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            }),
            ..Self::default()
        };
        (client, entered_rx, release_tx)
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub(crate) fn rpc_closes(&self) -> usize {
        self.rpc_closes.load(Ordering::SeqCst)
    }
}

impl ClientHandle for FakeClient {
    fn ping(&self) -> Result<(), PluginError> {
        let count = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.entered
                .lock()
                .expect("gate mutex poisoned")
                .send(())
                .expect("test listens for ping entry");
            gate.release
                .lock()
                .expect("gate mutex poisoned")
                .recv()
                .expect("test releases the ping");
        }
        match self.fail_pings_from {
            Some(nth) if count >= nth => Err(PluginError::Ping {
                name: String::from("fake"),
                message: format!("ping {count} refused"),
            }),
            _ => Ok(()),
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn close_rpc(&self) -> Result<(), PluginError> {
        self.rpc_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
    }
}

/// Planned outcome of the next `connect` call.
pub(crate) enum ConnectPlan {
    Succeed(FakeClient),
    Fail,
}

/// Connector replaying a queue of planned outcomes.
///
/// Once the queue is empty every call succeeds with a healthy client.
#[derive(Default)]
pub(crate) struct FakeConnector {
    plans: Mutex<VecDeque<ConnectPlan>>,
    clients: Mutex<Vec<Arc<FakeClient>>>,
    start_timeouts: Mutex<Vec<Duration>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_plans(plans: impl IntoIterator<Item = ConnectPlan>) -> Arc<Self> {
        let connector = Self::default();
        connector
            .plans
            .lock()
            .expect("plan mutex poisoned")
            .extend(plans);
        Arc::new(connector)
    }

    pub(crate) fn push(&self, plan: ConnectPlan) {
        self.plans
            .lock()
            .expect("plan mutex poisoned")
            .push_back(plan);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sums the pings received by every client handed out so far.
    pub(crate) fn total_pings(&self) -> usize {
        self.clients
            .lock()
            .expect("client mutex poisoned")
            .iter()
            .map(|client| client.pings())
            .sum()
    }

    /// Start timeouts of the configs passed to `connect`, in call order.
    pub(crate) fn start_timeouts(&self) -> Vec<Duration> {
        self.start_timeouts
            .lock()
            .expect("timeout mutex poisoned")
            .clone()
    }

    /// Returns the `index`th client handed out (0-based).
    pub(crate) fn client(&self, index: usize) -> Arc<FakeClient> {
        self.clients
            .lock()
            .expect("client mutex poisoned")
            .get(index)
            .cloned()
            .expect("client was created")
    }
}

impl PluginConnector for FakeConnector {
    fn connect(&self, config: &PluginConfig) -> Result<Arc<dyn ClientHandle>, PluginError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.start_timeouts
            .lock()
            .expect("timeout mutex poisoned")
            .push(config.start_timeout());
        let plan = self
            .plans
            .lock()
            .expect("plan mutex poisoned")
            .pop_front()
            .unwrap_or(ConnectPlan::Succeed(FakeClient::healthy()));
        match plan {
            ConnectPlan::Succeed(client) => {
                let client = Arc::new(client);
                self.clients
                    .lock()
                    .expect("client mutex poisoned")
                    .push(Arc::clone(&client));
                Ok(client)
            }
            ConnectPlan::Fail => Err(PluginError::connect(config.name(), "launch refused")),
        }
    }
}

/// Ticker driven by the test: each message on the sender releases one probe.
pub(crate) struct ManualTicker {
    ticks: Mutex<Receiver<()>>,
}

impl ManualTicker {
    pub(crate) fn new() -> (Self, Sender<()>) {
        let (sender, receiver) = channel();
        (
            Self {
                ticks: Mutex::new(receiver),
            },
            sender,
        )
    }
}

impl Ticker for ManualTicker {
    fn wait(&self, cancel: &Receiver<()>) -> Tick {
        loop {
            match cancel.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return Tick::Cancelled,
                Err(TryRecvError::Empty) => {}
            }
            let ticks = self.ticks.lock().expect("tick mutex poisoned");
            match ticks.recv_timeout(Duration::from_millis(2)) {
                Ok(()) => return Tick::Probe,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Tick::Cancelled,
            }
        }
    }
}

/// Reporter collecting event names in order.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingReporter {
    pub(crate) fn events(&self) -> Vec<&'static str> {
        self.events.lock().expect("event mutex poisoned").clone()
    }

    fn record(&self, event: &'static str) {
        self.events.lock().expect("event mutex poisoned").push(event);
    }
}

impl LifecycleReporter for RecordingReporter {
    fn starting(&self, _config: &PluginConfig) {
        self.record("starting");
    }

    fn running(&self, _config: &PluginConfig) {
        self.record("running");
    }

    fn start_failed(&self, _config: &PluginConfig, _error: &PluginError) {
        self.record("start_failed");
    }

    fn probe_failed(&self, _config: &PluginConfig, _failure: &ProbeFailure) {
        self.record("probe_failed");
    }

    fn restarting(&self, _config: &PluginConfig) {
        self.record("restarting");
    }

    fn stopped(&self, _config: &PluginConfig) {
        self.record("stopped");
    }
}

/// Context wired to `connector` and a manual ticker.
pub(crate) fn manual_context(connector: &Arc<FakeConnector>) -> (SupervisorContext, Sender<()>) {
    let (ticker, ticks) = ManualTicker::new();
    let context = SupervisorContext::new(Arc::clone(connector)).with_ticker(ticker);
    (context, ticks)
}

/// Plugin configuration pointing at a path that is never executed.
pub(crate) fn plugin_config(id: &str, name: &str) -> PluginConfig {
    PluginConfig::new(id, name, PathBuf::from(format!("/opt/plugins/{name}")))
}
