//! Create/join/close orchestration over registry, supervisor, and the
//! directory collaborators.

use std::sync::Arc;

use chrono::Utc;
use robolink_protocol::{ConnectionCoordinates, ConnectionView, RobotState, RobotSummary, Role, StatusFilter};
use robolink_runtime::{find_free_tcp_port_within_range, interrupt_pid, pid_is_alive};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::directory::{AccessPolicy, Robot, RobotDirectory, RobotStatus};
use crate::error::{BrokerError, Result};
use crate::registrar::BridgeRegistrar;
use crate::registry::{Connection, ConnectionStore};
use crate::supervisor::{BridgeEvent, BridgeSpec, BridgeSupervisor};

/// Spacing of the application-port scan; the bridge binds the allocated
/// port and its immediate neighbour.
const APP_PORT_STEP: u16 = 2;

/// Orchestrates bridging sessions end to end.
pub struct ConnectionBroker {
	config: BrokerConfig,
	store: Arc<dyn ConnectionStore>,
	directory: Arc<dyn RobotDirectory>,
	policy: Arc<dyn AccessPolicy>,
	registrar: Arc<dyn BridgeRegistrar>,
	supervisor: BridgeSupervisor,
}

impl ConnectionBroker {
	pub fn new(
		config: BrokerConfig,
		store: Arc<dyn ConnectionStore>,
		directory: Arc<dyn RobotDirectory>,
		policy: Arc<dyn AccessPolicy>,
		registrar: Arc<dyn BridgeRegistrar>,
		supervisor: BridgeSupervisor,
	) -> Self {
		Self {
			config,
			store,
			directory,
			policy,
			registrar,
			supervisor,
		}
	}

	/// Starts a bridging session against `robot_id`.
	///
	/// The registry record is written only after the bridge signalled
	/// readiness, so a failed or timed-out spawn leaves no trace.
	pub async fn create(&self, robot_id: &str, user_id: &str) -> Result<ConnectionCoordinates> {
		let robot = self.require_robot(robot_id).await?;
		self.require_operator(user_id, &robot.organization_id).await?;

		let agent_port = match self.directory.latest_status(robot_id).await? {
			Some(RobotStatus {
				state: RobotState::Operating,
				port: Some(port),
			}) => port,
			_ => return Err(BrokerError::PreconditionFailed(format!("robot {robot_id} is not operating"))),
		};

		// Check-then-insert with no transaction: two racing creates can both
		// pass this check before either persists. Accepted limitation of the
		// document-store design; randomizing the port pick below narrows the
		// companion port race without closing it.
		if self.store.find_active_by_robot(robot_id).await?.is_some() {
			return Err(BrokerError::Conflict(format!("robot {robot_id} already has an active connection")));
		}

		let (start, end) = self.config.app_port_range;
		let app_port = find_free_tcp_port_within_range(start, end, APP_PORT_STEP)
			.ok_or_else(|| BrokerError::CapacityExhausted(format!("no free port pair in {start}-{end}")))?;

		let connection_id = Uuid::new_v4().to_string();
		let spec = BridgeSpec {
			connection_id: connection_id.clone(),
			robot_host: robot.host.clone(),
			robot_port: agent_port,
			app_port,
			idle_timeout: self.config.idle_timeout,
			organization_id: robot.organization_id.clone(),
			robot_id: robot.id.clone(),
		};

		let mut handle = self.supervisor.launch(spec)?;
		handle.await_ready(self.config.startup_timeout).await?;

		let connection = Connection::new(&connection_id, robot_id, user_id, handle.pid(), app_port);
		self.store.insert(&connection).await?;

		let (_pid, events) = handle.into_running();
		self.spawn_exit_reconciler(connection_id.clone(), robot.host.clone(), agent_port, events);

		let register_id = self.registrar.register(&connection_id, user_id, app_port).await?;

		info!(
			target = "robolink.session",
			connection = %connection_id,
			robot = %robot_id,
			user = %user_id,
			port = app_port,
			"bridge session created"
		);

		Ok(ConnectionCoordinates {
			connection_id,
			hostname: self.config.hostname.clone(),
			port: app_port,
			register_id,
		})
	}

	/// Attaches a user to an existing session without spawning anything.
	pub async fn join(&self, connection_id: &str, user_id: &str) -> Result<ConnectionCoordinates> {
		let connection = self.require_connection(connection_id).await?;
		let robot = self.require_robot(&connection.robot_id).await?;
		self.require_operator(user_id, &robot.organization_id).await?;

		let register_id = self.registrar.register(&connection.id, user_id, connection.port).await?;

		Ok(ConnectionCoordinates {
			connection_id: connection.id,
			hostname: self.config.hostname.clone(),
			port: connection.port,
			register_id,
		})
	}

	/// Terminates a session. Idempotent: closing an already-inactive
	/// connection succeeds without touching the record again.
	pub async fn close(&self, connection_id: &str, user_id: &str) -> Result<()> {
		let connection = self.require_connection(connection_id).await?;
		let robot = self.require_robot(&connection.robot_id).await?;
		self.require_operator(user_id, &robot.organization_id).await?;

		if !connection.is_active {
			return Ok(());
		}

		// Interrupt, don't kill: the bridge winds down on SIGINT and its
		// exit lands in the watcher. A delivery failure is only logged; the
		// record still closes, and the startup sweep catches true orphans.
		if let Err(err) = interrupt_pid(connection.pid) {
			warn!(target = "robolink.session", connection = %connection_id, pid = connection.pid, error = %err, "interrupt failed");
		}

		// The exit reconciler may have already won this write; either way a
		// single closed_at survives.
		self.store.mark_closed(&connection.id, Utc::now()).await?;
		info!(target = "robolink.session", connection = %connection_id, user = %user_id, "bridge session closed");
		Ok(())
	}

	/// Fetches one sanitized session; scoped to organization membership.
	pub async fn get_by_id(&self, connection_id: &str, user_id: &str) -> Result<ConnectionView> {
		let connection = self.require_connection(connection_id).await?;
		let robot = self.require_robot(&connection.robot_id).await?;
		self.require_member(user_id, &robot.organization_id).await?;

		let state = self.directory.latest_status(&robot.id).await?.map(|status| status.state);
		Ok(connection.to_public_view(Some(RobotSummary {
			robot_id: robot.id,
			name: robot.name,
			state,
		})))
	}

	/// Lists a robot's session history; scoped to organization membership.
	pub async fn get_by_robot(&self, robot_id: &str, user_id: &str, filter: StatusFilter) -> Result<Vec<ConnectionView>> {
		let robot = self.require_robot(robot_id).await?;
		self.require_member(user_id, &robot.organization_id).await?;

		let summary = RobotSummary {
			robot_id: robot.id.clone(),
			name: robot.name.clone(),
			state: None,
		};
		let connections = self.store.find_by_robot(robot_id, filter).await?;
		Ok(connections.iter().map(|connection| connection.to_public_view(Some(summary.clone()))).collect())
	}

	/// Lists the caller's sessions across every robot they can see:
	/// user → organizations → robots → connections.
	pub async fn list_for_user(&self, user_id: &str, filter: StatusFilter) -> Result<Vec<ConnectionView>> {
		let organizations = self.directory.organizations_for_user(user_id).await?;
		let robots = self.directory.robots_in_organizations(&organizations).await?;
		let connections = self.store.find_for_robots(&robots, filter).await?;
		Ok(connections.iter().map(|connection| connection.to_public_view(None)).collect())
	}

	/// Closes active records whose process did not survive a broker restart.
	///
	/// Run once at boot, before serving: a crashed broker leaves records
	/// active with no supervisor attached, and this sweep is what reconciles
	/// them.
	pub async fn reconcile_startup(&self) -> Result<usize> {
		let mut swept = 0;
		for connection in self.store.list_active().await? {
			if pid_is_alive(connection.pid) {
				continue;
			}
			if self.store.mark_closed(&connection.id, Utc::now()).await? {
				swept += 1;
				info!(target = "robolink.session", connection = %connection.id, pid = connection.pid, "swept stale session");
			}
		}
		Ok(swept)
	}

	async fn require_robot(&self, robot_id: &str) -> Result<Robot> {
		self.directory
			.robot_by_id(robot_id)
			.await?
			.ok_or_else(|| BrokerError::NotFound(format!("robot {robot_id}")))
	}

	async fn require_connection(&self, connection_id: &str) -> Result<Connection> {
		self.store
			.find_by_id(connection_id)
			.await?
			.ok_or_else(|| BrokerError::NotFound(format!("connection {connection_id}")))
	}

	async fn require_operator(&self, user_id: &str, organization_id: &str) -> Result<()> {
		if self.policy.is_user_allowed(user_id, organization_id, &Role::OPERATOR_TIER).await? {
			Ok(())
		} else {
			Err(BrokerError::Forbidden(format!("user {user_id} lacks an operator role in {organization_id}")))
		}
	}

	async fn require_member(&self, user_id: &str, organization_id: &str) -> Result<()> {
		if self.policy.is_member(user_id, organization_id).await? {
			Ok(())
		} else {
			Err(BrokerError::Forbidden(format!("user {user_id} is not a member of {organization_id}")))
		}
	}

	/// Watches for the bridge exit and reconciles the registry.
	///
	/// No-op by construction until a record exists: the task is only spawned
	/// after the insert. Its own failures are logged, never propagated;
	/// nobody is waiting on this path.
	fn spawn_exit_reconciler(&self, connection_id: String, robot_host: String, agent_port: u16, mut events: mpsc::Receiver<BridgeEvent>) {
		let store = Arc::clone(&self.store);
		let registrar = Arc::clone(&self.registrar);
		tokio::spawn(async move {
			while let Some(event) = events.recv().await {
				let BridgeEvent::Exited { status } = event else {
					continue;
				};
				debug!(target = "robolink.session", connection = %connection_id, code = ?status, "reconciling bridge exit");
				match store.mark_closed(&connection_id, Utc::now()).await {
					Ok(true) => {
						info!(target = "robolink.session", connection = %connection_id, "session closed after bridge exit");
					}
					Ok(false) => {} // an explicit close already won this write
					Err(err) => {
						warn!(target = "robolink.session", connection = %connection_id, error = %err, "failed to reconcile bridge exit");
					}
				}
				if let Err(err) = registrar.stop_agent(&robot_host, agent_port).await {
					debug!(target = "robolink.session", connection = %connection_id, error = %err, "agent stop notification failed");
				}
				break;
			}
		});
	}
}
