//! Bridge subprocess lifecycle: spawn, readiness, exit observation.
//!
//! Each session owns one OS process. A dedicated watcher task reads the
//! process's output and reports through an event channel, which turns the
//! ready-or-timeout race into an explicit bounded wait instead of a nest of
//! exit callbacks.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::{BrokerError, Result};

/// Audit sink receiving bridge output lines.
pub mod audit;

pub use audit::{AuditSink, TracingAudit};

/// Marker the bridge prints, alongside the connection id, once its listener
/// is accepting clients.
pub const READY_MARKER: &str = "bridge ready";

/// Invocation parameters for one bridging subprocess.
#[derive(Debug, Clone)]
pub struct BridgeSpec {
	/// Correlation token; appears in the readiness line.
	pub connection_id: String,
	/// Robot control host the bridge dials out to.
	pub robot_host: String,
	/// Port the robot-side agent listens on.
	pub robot_port: u16,
	/// Local application port the bridge serves clients on.
	pub app_port: u16,
	/// Idle window after which the bridge exits on its own.
	pub idle_timeout: Duration,
	/// Organization context for audit tagging.
	pub organization_id: String,
	/// Robot context for audit tagging.
	pub robot_id: String,
}

/// Lifecycle states of a supervised bridge process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
	Spawning,
	AwaitingReady,
	Ready,
	Running,
	Failed,
	Closed,
}

/// Events emitted by the watcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
	/// The readiness line was observed on stdout.
	Ready,
	/// The process exited; carries its exit code when one exists.
	Exited { status: Option<i32> },
}

/// Spawns bridging subprocesses and wires up their watcher tasks.
pub struct BridgeSupervisor {
	program: PathBuf,
	audit: Arc<dyn AuditSink>,
}

impl BridgeSupervisor {
	pub fn new(program: PathBuf, audit: Arc<dyn AuditSink>) -> Self {
		Self { program, audit }
	}

	/// Launches the bridge for `spec` and starts watching its output.
	///
	/// Must be called within a tokio runtime; a spawn-level OS failure is
	/// surfaced immediately, everything later arrives through the handle.
	pub fn launch(&self, spec: BridgeSpec) -> Result<BridgeHandle> {
		let mut command = Command::new(&self.program);
		command
			.arg("--connection-id")
			.arg(&spec.connection_id)
			.arg("--robot-host")
			.arg(&spec.robot_host)
			.arg("--robot-port")
			.arg(spec.robot_port.to_string())
			.arg("--app-port")
			.arg(spec.app_port.to_string())
			.arg("--idle-timeout")
			.arg(spec.idle_timeout.as_secs().to_string())
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());

		let mut child = command
			.spawn()
			.map_err(|e| BrokerError::Internal(format!("failed to spawn bridge {}: {e}", self.program.display())))?;
		let pid = child
			.id()
			.ok_or_else(|| BrokerError::Internal("bridge exited before a pid was available".to_string()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| BrokerError::Internal("bridge stdout was not piped".to_string()))?;
		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| BrokerError::Internal("bridge stderr was not piped".to_string()))?;

		debug!(target = "robolink.bridge", connection = %spec.connection_id, pid, port = spec.app_port, "bridge spawned");

		let child = Arc::new(Mutex::new(child));
		let (events_tx, events) = mpsc::channel(16);

		tokio::spawn(forward_stderr(Arc::clone(&self.audit), spec.clone(), stderr));
		tokio::spawn(watch_stdout(Arc::clone(&self.audit), spec.clone(), stdout, Arc::clone(&child), events_tx));

		Ok(BridgeHandle {
			pid,
			spec,
			child,
			events,
			state: BridgeState::AwaitingReady,
		})
	}
}

/// Reads stdout, forwards every line to the audit sink, reports readiness,
/// and reaps the process once the stream closes.
async fn watch_stdout(
	audit: Arc<dyn AuditSink>,
	spec: BridgeSpec,
	stdout: impl AsyncRead + Unpin,
	child: Arc<Mutex<Child>>,
	events: mpsc::Sender<BridgeEvent>,
) {
	let mut lines = BufReader::new(stdout).lines();
	let mut ready_sent = false;
	while let Ok(Some(line)) = lines.next_line().await {
		audit.line(&spec, "stdout", &line);
		if !ready_sent && line.contains(&spec.connection_id) && line.contains(READY_MARKER) {
			ready_sent = true;
			let _ = events.send(BridgeEvent::Ready).await;
		}
	}

	// Stdout closed: the process is gone or on its way out. Poll for the
	// exit with short lock holds, so a concurrent kill never waits on the
	// child mutex, then report whether or not anyone is still listening.
	let status = loop {
		match child.lock().await.try_wait() {
			Ok(Some(status)) => break status.code(),
			Ok(None) => tokio::time::sleep(Duration::from_millis(50)).await,
			Err(err) => {
				warn!(target = "robolink.bridge", connection = %spec.connection_id, error = %err, "failed to reap bridge");
				break None;
			}
		}
	};
	debug!(target = "robolink.bridge", connection = %spec.connection_id, code = ?status, "bridge exited");
	let _ = events.send(BridgeEvent::Exited { status }).await;
}

async fn forward_stderr(audit: Arc<dyn AuditSink>, spec: BridgeSpec, stderr: impl AsyncRead + Unpin) {
	let mut lines = BufReader::new(stderr).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		audit.line(&spec, "stderr", &line);
	}
}

/// Handle to a spawned bridge, held through readiness and handed to the
/// exit reconciler once the session is running.
#[derive(Debug)]
pub struct BridgeHandle {
	pid: u32,
	spec: BridgeSpec,
	child: Arc<Mutex<Child>>,
	events: mpsc::Receiver<BridgeEvent>,
	state: BridgeState,
}

impl BridgeHandle {
	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn state(&self) -> BridgeState {
		self.state
	}

	/// Waits for the readiness line, bounded by `timeout`.
	///
	/// The wait is a race: whichever of readiness and the timer resolves
	/// first wins. On timeout the subprocess is killed before the error
	/// returns, and a late readiness line is ignored. An exit before
	/// readiness is a spawn-level failure, reported distinctly.
	pub async fn await_ready(&mut self, timeout: Duration) -> Result<()> {
		match tokio::time::timeout(timeout, self.events.recv()).await {
			Ok(Some(BridgeEvent::Ready)) => {
				self.state = BridgeState::Ready;
				Ok(())
			}
			Ok(Some(BridgeEvent::Exited { status })) => {
				self.state = BridgeState::Failed;
				Err(BrokerError::Internal(format!(
					"bridge for connection {} exited before readiness (status {status:?})",
					self.spec.connection_id
				)))
			}
			Ok(None) => {
				self.state = BridgeState::Failed;
				Err(BrokerError::Internal(format!("bridge watcher for connection {} went away", self.spec.connection_id)))
			}
			Err(_) => {
				self.state = BridgeState::Failed;
				self.kill().await;
				Err(BrokerError::Timeout(format!(
					"bridge for connection {} produced no readiness line within {timeout:?}",
					self.spec.connection_id
				)))
			}
		}
	}

	/// Force-kills the subprocess. Exit reporting still happens through the
	/// watcher, so registry reconciliation is untouched by this path.
	pub async fn kill(&self) {
		if let Err(err) = self.child.lock().await.start_kill() {
			warn!(target = "robolink.bridge", connection = %self.spec.connection_id, error = %err, "failed to kill bridge");
		}
	}

	/// Marks the session running and releases the event stream so the
	/// lifecycle layer can reconcile the eventual exit.
	pub fn into_running(mut self) -> (u32, mpsc::Receiver<BridgeEvent>) {
		self.state = BridgeState::Running;
		(self.pid, self.events)
	}
}
