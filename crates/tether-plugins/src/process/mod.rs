//! Launching plugins as child processes.
//!
//! [`ProcessConnector`] implements [`PluginConnector`] by spawning the
//! configured command line with the handshake parameters exported to its
//! environment, then waiting up to the start timeout for the plugin to print
//! its handshake line on stdout. The child is killed whenever the handshake
//! does not complete. Stderr and any stdout after the handshake are drained
//! to `debug!` logs so a chatty plugin never blocks on a full pipe.

mod handshake;

use std::io::{self, BufRead, BufReader};
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{ClientHandle, PluginConnector};
use crate::config::{PluginConfig, Protocol, thread_name};
use crate::error::PluginError;

use self::handshake::Handshake;

/// Tracing target for plugin process operations.
const PROCESS_TARGET: &str = "tether_plugins::process";

/// Environment variable listing the app protocol versions the host serves.
pub const ENV_PROTOCOL_VERSIONS: &str = "PLUGIN_PROTOCOL_VERSIONS";
/// Environment variable listing the RPC protocols the host accepts.
pub const ENV_PROTOCOLS: &str = "PLUGIN_PROTOCOLS";
/// Environment variable carrying the CA certificate path.
pub const ENV_CA_CERT: &str = "PLUGIN_CA_CERT";
/// Environment variable carrying the client certificate path.
pub const ENV_CLIENT_CERT: &str = "PLUGIN_CLIENT_CERT";
/// Environment variable carrying the client key path.
pub const ENV_CLIENT_KEY: &str = "PLUGIN_CLIENT_KEY";

/// Connects to plugins by spawning them as child processes.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::PathBuf;
/// use tether_plugins::PluginConfig;
/// use tether_plugins::client::PluginConnector;
/// use tether_plugins::process::ProcessConnector;
///
/// let config = PluginConfig::new("01", "kv", PathBuf::from("/opt/plugins/kv"));
/// let client = ProcessConnector::new().connect(&config).expect("plugin starts");
/// client.ping().expect("plugin answers");
/// client.terminate();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessConnector;

impl ProcessConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PluginConnector for ProcessConnector {
    fn connect(&self, config: &PluginConfig) -> Result<Arc<dyn ClientHandle>, PluginError> {
        let mut child = spawn(config)?;
        match await_handshake(config, &mut child) {
            Ok(handshake) => {
                info!(
                    target: PROCESS_TARGET,
                    plugin = config.name(),
                    pid = child.id(),
                    address = %handshake.address,
                    protocol = %handshake.protocol,
                    version = handshake.app_version,
                    "plugin handshake complete"
                );
                Ok(Arc::new(ProcessClient::new(config, child, &handshake)))
            }
            Err(error) => {
                kill(config.name(), &mut child);
                Err(error)
            }
        }
    }
}

/// Builds the command line and environment, then spawns the child.
fn spawn(config: &PluginConfig) -> Result<Child, PluginError> {
    let line = config.command_line();
    let Some((program, args)) = line.split_first() else {
        return Err(PluginError::connect(config.name(), "empty command line"));
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .env(
            config.handshake().magic_cookie_key(),
            config.handshake().magic_cookie_value(),
        )
        .env(ENV_PROTOCOL_VERSIONS, protocol_versions(config))
        .env(ENV_PROTOCOLS, allowed_protocols(config.allowed_protocols()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(tls) = config.tls() {
        command
            .env(ENV_CA_CERT, &tls.ca_cert)
            .env(ENV_CLIENT_CERT, &tls.client_cert)
            .env(ENV_CLIENT_KEY, &tls.client_key);
    }

    debug!(
        target: PROCESS_TARGET,
        plugin = config.name(),
        command = ?line,
        "spawning plugin process"
    );

    command.spawn().map_err(|source| PluginError::Connect {
        name: config.name().to_owned(),
        message: format!("failed to spawn '{program}'"),
        source: Some(Arc::new(source)),
    })
}

fn protocol_versions(config: &PluginConfig) -> String {
    let mut versions: Vec<u32> = config.versioned_capabilities().keys().copied().collect();
    let handshake_version = config.handshake().protocol_version();
    if !versions.contains(&handshake_version) {
        versions.push(handshake_version);
    }
    versions.sort_unstable();
    versions
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn allowed_protocols(protocols: &[Protocol]) -> String {
    protocols
        .iter()
        .map(|protocol| protocol.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Waits for the handshake line within the start timeout.
fn await_handshake(config: &PluginConfig, child: &mut Child) -> Result<Handshake, PluginError> {
    let name = config.name();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PluginError::connect(name, "failed to capture stdout"))?;
    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_drain(name, stderr);
    }

    let (sender, receiver) = mpsc::channel();
    spawn_stdout_reader(name, stdout, sender).map_err(|source| PluginError::Connect {
        name: name.to_owned(),
        message: String::from("failed to spawn stdout reader"),
        source: Some(Arc::new(source)),
    })?;

    let timeout = config.start_timeout();
    let line = match receiver.recv_timeout(timeout) {
        Ok(Ok(line)) => line,
        Ok(Err(source)) => {
            return Err(PluginError::Connect {
                name: name.to_owned(),
                message: String::from("failed to read handshake"),
                source: Some(Arc::new(source)),
            });
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                target: PROCESS_TARGET,
                plugin = name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "plugin did not complete its handshake in time"
            );
            return Err(PluginError::connect(
                name,
                format!("no handshake within {timeout:?}"),
            ));
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(PluginError::connect(name, "stdout reader stopped"));
        }
    };

    if line.trim().is_empty() {
        return Err(PluginError::connect(
            name,
            "plugin exited before completing its handshake",
        ));
    }
    handshake::parse(config, &line)
}

/// Reads the handshake line, forwards it, then logs the rest of stdout.
fn spawn_stdout_reader(
    name: &str,
    stdout: ChildStdout,
    sender: Sender<io::Result<String>>,
) -> io::Result<()> {
    let plugin = name.to_owned();
    thread::Builder::new()
        .name(thread_name("stdout", name))
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut first = String::new();
            let result = reader.read_line(&mut first).map(|_| first);
            if sender.send(result).is_err() {
                return;
            }
            for line in reader.lines().map_while(Result::ok) {
                debug!(target: PROCESS_TARGET, plugin = %plugin, stdout = %line, "plugin output");
            }
        })?;
    Ok(())
}

fn spawn_stderr_drain(name: &str, stderr: ChildStderr) {
    let plugin = name.to_owned();
    let spawned = thread::Builder::new()
        .name(thread_name("stderr", name))
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                debug!(target: PROCESS_TARGET, plugin = %plugin, stderr = %line, "plugin stderr");
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: PROCESS_TARGET,
            plugin = name,
            %error,
            "failed to spawn stderr drain; plugin stderr is discarded"
        );
    }
}

/// Kills `child` and reaps it. Errors mean the process is already gone.
fn kill(name: &str, child: &mut Child) {
    if let Err(error) = child.kill() {
        debug!(target: PROCESS_TARGET, plugin = name, %error, "kill failed");
    }
    if let Err(error) = child.wait() {
        debug!(target: PROCESS_TARGET, plugin = name, %error, "wait failed");
    }
}

/// Handle to a plugin process that completed its handshake.
struct ProcessClient {
    name: String,
    child: Mutex<Child>,
    address: SocketAddr,
    dial_timeout: Duration,
    closed: AtomicBool,
}

impl ProcessClient {
    fn new(config: &PluginConfig, child: Child, handshake: &Handshake) -> Self {
        Self {
            name: config.name().to_owned(),
            child: Mutex::new(child),
            address: handshake.address,
            dial_timeout: config.dial_options().connect_timeout(),
            closed: AtomicBool::new(false),
        }
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ping_error(&self, message: String) -> PluginError {
        PluginError::Ping {
            name: self.name.clone(),
            message,
        }
    }
}

impl ClientHandle for ProcessClient {
    fn ping(&self) -> Result<(), PluginError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.ping_error(String::from("RPC channel is closed")));
        }
        TcpStream::connect_timeout(&self.address, self.dial_timeout)
            .map(drop)
            .map_err(|error| self.ping_error(format!("dial {}: {error}", self.address)))
    }

    fn has_exited(&self) -> bool {
        match self.child().try_wait() {
            Ok(status) => status.is_some(),
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    plugin = self.name.as_str(),
                    %error,
                    "cannot query plugin process; treating it as exited"
                );
                true
            }
        }
    }

    fn close_rpc(&self) -> Result<(), PluginError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        let mut child = self.child();
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        debug!(
            target: PROCESS_TARGET,
            plugin = self.name.as_str(),
            pid = child.id(),
            "terminating plugin process"
        );
        kill(&self.name, &mut child);
    }
}

impl Drop for ProcessClient {
    fn drop(&mut self) {
        self.terminate();
    }
}
