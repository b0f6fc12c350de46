use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::InstanceError;
use crate::logs::LogBuffer;
use crate::node::{Node, NodeOutput};
use crate::state::{InstanceState, StateCell};

const LOG_TARGET: &str = "embers::instance";

/// Grace period before scanning output, so a slow process has a chance to
/// begin emitting.
const STARTUP_GRACE: Duration = Duration::from_millis(200);
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_millis(3000);
/// Upper bound on waiting for the watchdog task to wind down; a stuck
/// watchdog must never hang the caller.
const WATCHDOG_SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Shared {
    state: StateCell,
    child: tokio::sync::Mutex<Option<Child>>,
    logs: std::sync::Mutex<LogBuffer>,
}

impl Shared {
    /// Terminates the process (if any) and blocks until its exit has been
    /// observed. SIGTERM first, then a hard kill.
    async fn terminate(&self) -> std::io::Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            kill_graceful(&mut child).await;
            child.wait().await?;
        }
        Ok(())
    }
}

/// One supervised server process: argument vector, bound port, lifecycle
/// state and captured output.
///
/// At most one OS process is associated with an instance at a time. All
/// state transitions are compare-and-swap operations on [`StateCell`], so
/// the three actors alive during startup (caller, output scanner, watchdog)
/// can never corrupt the lifecycle.
#[derive(Debug)]
pub struct Instance {
    args: Vec<String>,
    port: u16,
    ready: Regex,
    startup_timeout: Duration,
    echo_output: bool,
    shared: Arc<Shared>,
    _conf: Option<NamedTempFile>,
}

impl Instance {
    /// Creates an inactive instance. `args[0]` is the executable path;
    /// `ready` is the output pattern that signals the process is serving.
    pub fn new(args: Vec<String>, port: u16, ready: Regex) -> Self {
        let logs = LogBuffer::new();
        logs.close();
        Instance {
            args,
            port,
            ready,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            echo_output: false,
            shared: Arc::new(Shared {
                state: StateCell::new(),
                child: tokio::sync::Mutex::new(None),
                logs: std::sync::Mutex::new(logs),
            }),
            _conf: None,
        }
    }

    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Echo every captured line through tracing as it arrives.
    pub fn with_echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Ties the lifetime of a materialized config file to this instance.
    pub(crate) fn with_conf_file(mut self, conf: NamedTempFile) -> Self {
        self._conf = Some(conf);
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> InstanceState {
        self.shared.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.is_active()
    }

    /// Every output line captured during the current (or last) run, in
    /// emission order.
    pub fn captured_lines(&self) -> Vec<String> {
        self.shared.logs.lock().unwrap().lines()
    }

    /// Opens a reader over the captured output. Usable while the process
    /// runs (tailing) and after it has stopped or failed (diagnosis).
    pub fn output(&self) -> NodeOutput {
        Box::new(self.shared.logs.lock().unwrap().reader())
    }

    /// Starts the process and blocks until the readiness pattern is
    /// observed, the output stream ends, or the startup deadline fires.
    pub async fn start(&self) -> Result<(), InstanceError> {
        if !self.shared.state.set_activating() {
            return Err(InstanceError::AlreadyRunning);
        }

        // Fresh capture channel for this run; readers opened on a previous
        // run keep draining the old, closed buffer.
        let logs = LogBuffer::new();
        *self.shared.logs.lock().unwrap() = logs.clone();

        let mut child = match self.spawn_process() {
            Ok(child) => child,
            Err(e) => {
                self.shared.state.set_failed();
                return Err(InstanceError::Spawn(e));
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump_lines(stdout, logs.clone(), tx.clone(), self.echo_output));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump_lines(stderr, logs.clone(), tx.clone(), self.echo_output));
        }
        drop(tx);
        tokio::spawn(async move {
            for pump in pumps {
                let _ = pump.await;
            }
            logs.close();
        });

        *self.shared.child.lock().await = Some(child);

        let token = CancellationToken::new();
        let watchdog = spawn_watchdog(
            token.clone(),
            self.startup_timeout,
            Arc::clone(&self.shared),
        );

        sleep(STARTUP_GRACE).await;

        let outcome = loop {
            match rx.recv().await {
                Some(line) => {
                    if self.ready.is_match(&line) {
                        if self.shared.state.set_active() {
                            break Ok(());
                        }
                        // The watchdog won the race; the readiness signal
                        // arrived too late to count.
                        break Err(InstanceError::Internal(
                            "instance was deactivated before the ready pattern was observed"
                                .to_string(),
                        ));
                    }
                }
                None => {
                    // Output ended before readiness: the process exited or
                    // closed its streams. Reap it and record the failure.
                    let _ = self.shared.terminate().await;
                    if self.shared.state.set_failed() {
                        break Err(InstanceError::StartupFailed);
                    }
                    // Another actor moved the state first.
                    break Err(InstanceError::Internal(format!(
                        "state moved to {:?} while recording a startup failure",
                        self.shared.state.get()
                    )));
                }
            }
        };

        token.cancel();
        if timeout(WATCHDOG_SHUTDOWN_WAIT, watchdog).await.is_err() {
            warn!(target: LOG_TARGET, "watchdog did not wind down within the shutdown wait");
        }

        outcome
    }

    /// Stops the process and blocks until termination is observed. A stop
    /// request against an instance that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), InstanceError> {
        if !self.shared.state.set_deactivating() {
            debug!(
                target: LOG_TARGET,
                state = ?self.shared.state.get(),
                "stop requested while not running"
            );
            return Ok(());
        }
        self.shared.terminate().await?;
        if !self.shared.state.set_inactive() {
            return Err(InstanceError::Internal(format!(
                "could not settle to inactive from {:?}",
                self.shared.state.get()
            )));
        }
        Ok(())
    }

    fn spawn_process(&self) -> std::io::Result<Child> {
        let Some(exe) = self.args.first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argument vector",
            ));
        };
        let exe = Path::new(exe);

        let mut cmd = Command::new(exe);
        cmd.args(&self.args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = exe.parent().filter(|p| !p.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.spawn()
    }
}

#[async_trait]
impl Node for Instance {
    type Error = InstanceError;

    async fn start(&self) -> Result<(), InstanceError> {
        Instance::start(self).await
    }

    async fn stop(&self) -> Result<(), InstanceError> {
        Instance::stop(self).await
    }

    async fn is_active(&self) -> bool {
        Instance::is_active(self)
    }

    fn ports(&self) -> Vec<u16> {
        vec![self.port]
    }

    fn output(&self) -> NodeOutput {
        Instance::output(self)
    }
}

fn pump_lines<R>(
    stream: R,
    logs: LogBuffer,
    tx: UnboundedSender<String>,
    echo: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logs.append_line(&line);
            if echo {
                info!(target: LOG_TARGET, "{line}");
            }
            // The scanner goes away once readiness is resolved; captured
            // lines still land in the log buffer.
            let _ = tx.send(line);
        }
    })
}

/// Arms the startup deadline. If it elapses while the instance is still
/// activating, the watchdog forces the deactivating transition and kills
/// the process; against any other state it is a no-op.
fn spawn_watchdog(
    token: CancellationToken,
    deadline: Duration,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sleep(deadline) => {
                if shared.state.set_deactivating_by_timeout() {
                    debug!(target: LOG_TARGET, "startup deadline elapsed, terminating process");
                    if let Err(e) = shared.terminate().await {
                        warn!(target: LOG_TARGET, "could not terminate timed-out process: {e}");
                    }
                }
            }
        }
    })
}

#[cfg(unix)]
async fn kill_graceful(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(id) = child.id() {
        let _ = kill(Pid::from_raw(id as i32), Signal::SIGTERM);
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn kill_graceful(child: &mut Child) {
    let _ = child.kill().await;
}
