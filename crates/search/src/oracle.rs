//! Compile+measure oracles and the fault barriers around them.
//!
//! The search never runs an external compile step directly inside its own
//! control flow: [`CommandOracle`] runs it in a child process and
//! [`Isolated`] moves an in-process oracle onto its own thread. Both bound
//! every evaluation with a timeout.

use gramforge_optimizer::Decisions;
use std::any::Any;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const DEFAULT_MAX_RUNNING: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("compilation failed: {0}")]
    Compile(String),
    #[error("measurement failed: {0}")]
    Measure(String),
    #[error("degenerate cost {0}")]
    DegenerateCost(f64),
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
    #[error("evaluation crashed: {0}")]
    Crashed(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0} oracle calls still running, refusing to start another")]
    Saturated(usize),
}

/// Applies decisions to the program under search and measures the result.
///
/// Costs are lower-is-better; the search turns them into a speed-up
/// against [`CompileOracle::baseline_cost`].
pub trait CompileOracle: Send + Sync {
    type Artifact;

    /// Cost of the program compiled without any searched decision.
    fn baseline_cost(&self) -> Result<f64, OracleError>;

    fn compile(&self, decisions: &Decisions) -> Result<Self::Artifact, OracleError>;

    fn measure(&self, artifact: &Self::Artifact) -> Result<f64, OracleError>;

    fn compile_and_measure(&self, decisions: &Decisions) -> Result<f64, OracleError> {
        let artifact = self.compile(decisions)?;
        self.measure(&artifact)
    }
}

/// Runs each call of an in-process oracle on a dedicated thread and stops
/// waiting for it after `timeout`. Panics surface as
/// [`OracleError::Crashed`].
///
/// A timed-out worker thread is abandoned, not killed; oracles that can hang
/// forever belong in a [`CommandOracle`]. Once `max_running` calls are still
/// in flight, further calls fail with [`OracleError::Saturated`] instead of
/// spawning more threads.
pub struct Isolated<O> {
    inner: Arc<O>,
    timeout: Duration,
    running: Arc<AtomicUsize>,
    max_running: usize,
}

/// Counts one live worker thread until dropped.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<O: CompileOracle + 'static> Isolated<O> {
    pub fn new(oracle: O, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(oracle),
            timeout,
            running: Arc::new(AtomicUsize::new(0)),
            max_running: DEFAULT_MAX_RUNNING,
        }
    }

    pub fn with_max_running(mut self, max_running: usize) -> Self {
        self.max_running = max_running.max(1);
        self
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// Worker threads that have not finished yet, abandoned ones included.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn run<T, F>(&self, job: F) -> Result<T, OracleError>
    where
        T: Send + 'static,
        F: FnOnce(&O) -> Result<T, OracleError> + Send + 'static,
    {
        let running = self.running.fetch_add(1, Ordering::SeqCst);
        let guard = RunningGuard(Arc::clone(&self.running));
        if running >= self.max_running {
            return Err(OracleError::Saturated(running));
        }

        let oracle = Arc::clone(&self.inner);
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("gramforge-oracle".into())
            .spawn(move || {
                let _guard = guard;
                let result = panic::catch_unwind(AssertUnwindSafe(|| job(&oracle)));
                let _ = sender.send(result);
            })
            .map_err(|err| OracleError::Io(err.to_string()))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(OracleError::Crashed(panic_message(payload.as_ref()))),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = ?self.timeout,
                    running = self.running(),
                    "oracle call timed out, abandoning its thread"
                );
                Err(OracleError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(OracleError::Crashed("oracle thread exited without a result".into()))
            }
        }
    }
}

impl<O: CompileOracle + 'static> CompileOracle for Isolated<O> {
    /// The measured cost; compile and measure both run behind the barrier.
    type Artifact = f64;

    fn baseline_cost(&self) -> Result<f64, OracleError> {
        self.run(|oracle| oracle.baseline_cost())
    }

    fn compile(&self, decisions: &Decisions) -> Result<f64, OracleError> {
        let decisions = decisions.clone();
        self.run(move |oracle| oracle.compile_and_measure(&decisions))
    }

    fn measure(&self, cost: &f64) -> Result<f64, OracleError> {
        Ok(*cost)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "oracle panicked".into()
    }
}

/// What a finished compile-step process printed.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external command once per evaluation.
///
/// The command receives `{"decisions": {...}}` on stdin and reports the
/// measured cost as the last non-empty line of its stdout. A non-zero exit
/// is a compile failure. The baseline is the same command run with no
/// decisions.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a full command line, program first.
    pub fn from_command_line(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn spawn(&self) -> Result<Child, OracleError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| OracleError::Io(format!("spawning {}: {}", self.program, err)))
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, OracleError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(OracleError::Io(err.to_string())),
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<String>> {
    source.map(|mut source| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = source.read_to_string(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

impl CompileOracle for CommandOracle {
    type Artifact = CommandOutput;

    fn baseline_cost(&self) -> Result<f64, OracleError> {
        self.compile_and_measure(&Decisions::new())
    }

    fn compile(&self, decisions: &Decisions) -> Result<CommandOutput, OracleError> {
        let payload = serde_json::to_vec(&serde_json::json!({ "decisions": decisions }))
            .map_err(|err| OracleError::Io(err.to_string()))?;

        let mut child = self.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        // Fed off-thread; the child may read it late or never.
        let stdin = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            })
        });

        let status = self.wait(&mut child)?;
        if let Some(writer) = stdin {
            let _ = writer.join();
        }
        let output = CommandOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(program = %self.program, status = %status, "compile step finished");

        if !status.success() {
            let detail = output.stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(OracleError::Compile(format!("{} ({})", status, detail)));
        }
        Ok(output)
    }

    fn measure(&self, output: &CommandOutput) -> Result<f64, OracleError> {
        let line = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| OracleError::Measure("no cost printed on stdout".into()))?;
        line.parse::<f64>()
            .map_err(|_| OracleError::Measure(format!("cannot parse cost from {:?}", line)))
    }
}
