#![cfg(unix)]

//! End-to-end session lifecycle over an in-memory registry, fake fleet
//! collaborators, and a scripted bridge subprocess.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use robolink_broker::config::BrokerConfig;
use robolink_broker::directory::{AccessPolicy, Robot, RobotDirectory, RobotStatus};
use robolink_broker::error::{BrokerError, Result};
use robolink_broker::registrar::BridgeRegistrar;
use robolink_broker::registry::memory::MemoryConnectionStore;
use robolink_broker::registry::{Connection, ConnectionStore};
use robolink_broker::supervisor::{BridgeSupervisor, TracingAudit};
use robolink_broker::ConnectionBroker;
use robolink_protocol::{RobotState, Role, StatusFilter};
use tempfile::TempDir;

const READY_BRIDGE: &str = r#"#!/bin/sh
cid=""
while [ "$#" -gt 0 ]; do
	case "$1" in
		--connection-id) cid="$2"; shift ;;
	esac
	shift
done
echo "$cid bridge ready"
exec sleep 30
"#;

const SILENT_BRIDGE: &str = "#!/bin/sh\nexec sleep 30\n";

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
	use std::os::unix::fs::PermissionsExt;

	let path = dir.path().join("bridge.sh");
	std::fs::write(&path, body).expect("script should be written");
	let mut permissions = std::fs::metadata(&path).expect("script metadata should load").permissions();
	permissions.set_mode(0o755);
	std::fs::set_permissions(&path, permissions).expect("script should become executable");
	path
}

struct FakeDirectory {
	robots: HashMap<String, Robot>,
	statuses: HashMap<String, RobotStatus>,
	memberships: HashMap<String, Vec<String>>,
}

impl FakeDirectory {
	fn fleet() -> Self {
		let mut robots = HashMap::new();
		robots.insert(
			"robot-1".to_string(),
			Robot {
				id: "robot-1".to_string(),
				organization_id: "org-1".to_string(),
				name: "warehouse picker".to_string(),
				host: "127.0.0.1".to_string(),
			},
		);
		robots.insert(
			"robot-2".to_string(),
			Robot {
				id: "robot-2".to_string(),
				organization_id: "org-1".to_string(),
				name: "dock loader".to_string(),
				host: "127.0.0.1".to_string(),
			},
		);

		let mut statuses = HashMap::new();
		statuses.insert(
			"robot-1".to_string(),
			RobotStatus {
				state: RobotState::Operating,
				port: Some(9000),
			},
		);
		statuses.insert(
			"robot-2".to_string(),
			RobotStatus {
				state: RobotState::Offline,
				port: None,
			},
		);

		let mut memberships = HashMap::new();
		memberships.insert("alice".to_string(), vec!["org-1".to_string()]);
		memberships.insert("bob".to_string(), vec!["org-1".to_string()]);

		Self {
			robots,
			statuses,
			memberships,
		}
	}
}

#[async_trait]
impl RobotDirectory for FakeDirectory {
	async fn robot_by_id(&self, robot_id: &str) -> Result<Option<Robot>> {
		Ok(self.robots.get(robot_id).cloned())
	}

	async fn latest_status(&self, robot_id: &str) -> Result<Option<RobotStatus>> {
		Ok(self.statuses.get(robot_id).cloned())
	}

	async fn organizations_for_user(&self, user_id: &str) -> Result<Vec<String>> {
		Ok(self.memberships.get(user_id).cloned().unwrap_or_default())
	}

	async fn robots_in_organizations(&self, organization_ids: &[String]) -> Result<Vec<String>> {
		Ok(self
			.robots
			.values()
			.filter(|robot| organization_ids.contains(&robot.organization_id))
			.map(|robot| robot.id.clone())
			.collect())
	}
}

/// alice operates org-1, bob only watches it, nobody else is a member.
struct FakePolicy {
	roles: HashMap<(String, String), Role>,
}

impl FakePolicy {
	fn fleet() -> Self {
		let mut roles = HashMap::new();
		roles.insert(("alice".to_string(), "org-1".to_string()), Role::Operator);
		roles.insert(("bob".to_string(), "org-1".to_string()), Role::Viewer);
		Self { roles }
	}
}

#[async_trait]
impl AccessPolicy for FakePolicy {
	async fn is_user_allowed(&self, user_id: &str, organization_id: &str, roles: &[Role]) -> Result<bool> {
		let held = self.roles.get(&(user_id.to_string(), organization_id.to_string()));
		Ok(held.is_some_and(|role| roles.contains(role)))
	}

	async fn is_member(&self, user_id: &str, organization_id: &str) -> Result<bool> {
		Ok(self.roles.contains_key(&(user_id.to_string(), organization_id.to_string())))
	}
}

#[derive(Default)]
struct FakeRegistrar {
	registered: AtomicUsize,
	stopped: AtomicUsize,
}

#[async_trait]
impl BridgeRegistrar for FakeRegistrar {
	async fn register(&self, _connection_id: &str, _user_id: &str, _app_port: u16) -> Result<String> {
		let n = self.registered.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(format!("reg-{n}"))
	}

	async fn stop_agent(&self, _robot_host: &str, _robot_port: u16) -> Result<()> {
		self.stopped.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

struct Harness {
	broker: ConnectionBroker,
	store: Arc<MemoryConnectionStore>,
	registrar: Arc<FakeRegistrar>,
	_dir: TempDir,
}

fn harness(script: &str, startup_timeout: Duration) -> Harness {
	let dir = TempDir::new().expect("temp dir should be created");
	let program = write_script(&dir, script);
	let config = BrokerConfig {
		app_port_range: (42000, 42400),
		startup_timeout,
		idle_timeout: Duration::from_secs(60),
		hostname: "fleet.test".to_string(),
		bridge_program: program.clone(),
	};

	let store = Arc::new(MemoryConnectionStore::new());
	let registrar = Arc::new(FakeRegistrar::default());
	let store_handle: Arc<dyn ConnectionStore> = store.clone();
	let registrar_handle: Arc<dyn BridgeRegistrar> = registrar.clone();
	let broker = ConnectionBroker::new(
		config,
		store_handle,
		Arc::new(FakeDirectory::fleet()),
		Arc::new(FakePolicy::fleet()),
		registrar_handle,
		BridgeSupervisor::new(program, Arc::new(TracingAudit)),
	);

	Harness {
		broker,
		store,
		registrar,
		_dir: dir,
	}
}

fn ready_harness() -> Harness {
	harness(READY_BRIDGE, Duration::from_secs(5))
}

async fn wait_until_inactive(store: &MemoryConnectionStore, connection_id: &str) -> Connection {
	for _ in 0..50 {
		let record = store.find_by_id(connection_id).await.unwrap().expect("record should exist");
		if !record.is_active {
			return record;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
	panic!("connection {connection_id} never went inactive");
}

#[tokio::test]
async fn create_returns_coordinates_and_persists_one_active_record() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	assert_eq!(coords.hostname, "fleet.test");
	assert!((42000..=42400).contains(&coords.port));

	let record = harness.store.find_active_by_robot("robot-1").await.unwrap().expect("one active record");
	assert_eq!(record.id, coords.connection_id);
	assert_eq!(record.port, coords.port);
	assert_eq!(record.created_by, "alice");
	assert!(record.closed_at.is_none());

	// The sanitized view never carries the pid.
	let view = serde_json::to_value(record.to_public_view(None)).unwrap();
	assert!(view.get("pid").is_none());

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
}

#[tokio::test]
async fn second_create_for_the_same_robot_conflicts() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	let err = harness.broker.create("robot-1", "alice").await.unwrap_err();
	assert!(matches!(err, BrokerError::Conflict(_)), "got {err}");
	// No second bridge was registered.
	assert_eq!(harness.registrar.registered.load(Ordering::SeqCst), 1);
	assert_eq!(harness.store.find_by_robot("robot-1", StatusFilter::All).await.unwrap().len(), 1);

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
}

#[tokio::test]
async fn robot_must_be_operating_with_a_port() {
	let harness = ready_harness();
	let err = harness.broker.create("robot-2", "alice").await.unwrap_err();
	assert!(matches!(err, BrokerError::PreconditionFailed(_)), "got {err}");
}

#[tokio::test]
async fn unknown_robot_is_not_found() {
	let harness = ready_harness();
	let err = harness.broker.create("robot-9", "alice").await.unwrap_err();
	assert!(matches!(err, BrokerError::NotFound(_)), "got {err}");
}

#[tokio::test]
async fn create_requires_an_operator_role() {
	let harness = ready_harness();

	let err = harness.broker.create("robot-1", "bob").await.unwrap_err();
	assert!(matches!(err, BrokerError::Forbidden(_)), "viewer: got {err}");

	let err = harness.broker.create("robot-1", "mallory").await.unwrap_err();
	assert!(matches!(err, BrokerError::Forbidden(_)), "outsider: got {err}");
}

#[tokio::test]
async fn timeout_leaves_no_registry_record() {
	let harness = harness(SILENT_BRIDGE, Duration::from_millis(300));
	let err = harness.broker.create("robot-1", "alice").await.unwrap_err();
	assert!(matches!(err, BrokerError::Timeout(_)), "got {err}");
	assert!(harness.store.find_by_robot("robot-1", StatusFilter::All).await.unwrap().is_empty());
	assert_eq!(harness.registrar.registered.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn close_is_idempotent_with_a_single_closed_at() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
	let record = harness.store.find_by_id(&coords.connection_id).await.unwrap().unwrap();
	assert!(!record.is_active);
	let first_closed_at = record.closed_at.expect("closed_at should be stamped");

	// Second close succeeds without touching the record; the bridge's own
	// exit event races the same transition and must also be a no-op.
	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
	tokio::time::sleep(Duration::from_millis(500)).await;

	let record = harness.store.find_by_id(&coords.connection_id).await.unwrap().unwrap();
	assert_eq!(record.closed_at, Some(first_closed_at));
}

#[tokio::test]
async fn bridge_exit_reconciles_the_registry() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();
	let record = harness.store.find_by_id(&coords.connection_id).await.unwrap().unwrap();

	// The bridge dies on its own; nobody calls close.
	robolink_runtime::interrupt_pid(record.pid).unwrap();

	let record = wait_until_inactive(&harness.store, &coords.connection_id).await;
	assert!(record.closed_at.is_some());

	// Best-effort agent stop fired exactly once.
	for _ in 0..50 {
		if harness.registrar.stopped.load(Ordering::SeqCst) > 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
	assert_eq!(harness.registrar.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn join_reuses_the_running_bridge() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	let joined = harness.broker.join(&coords.connection_id, "alice").await.unwrap();
	assert_eq!(joined.connection_id, coords.connection_id);
	assert_eq!(joined.port, coords.port);
	assert_ne!(joined.register_id, coords.register_id);

	// Still exactly one record; join never spawns.
	assert_eq!(harness.store.find_by_robot("robot-1", StatusFilter::All).await.unwrap().len(), 1);
	assert_eq!(harness.registrar.registered.load(Ordering::SeqCst), 2);

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
}

#[tokio::test]
async fn join_requires_an_existing_connection() {
	let harness = ready_harness();
	let err = harness.broker.join("missing", "alice").await.unwrap_err();
	assert!(matches!(err, BrokerError::NotFound(_)), "got {err}");
}

#[tokio::test]
async fn reads_are_scoped_to_organization_membership() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	// A viewer can read but not operate.
	let view = harness.broker.get_by_id(&coords.connection_id, "bob").await.unwrap();
	assert_eq!(view.connection_id, coords.connection_id);
	let robot = view.robot.expect("robot summary should be attached");
	assert_eq!(robot.robot_id, "robot-1");
	assert_eq!(robot.state, Some(RobotState::Operating));

	let err = harness.broker.get_by_id(&coords.connection_id, "mallory").await.unwrap_err();
	assert!(matches!(err, BrokerError::Forbidden(_)), "got {err}");

	let history = harness.broker.get_by_robot("robot-1", "bob", StatusFilter::All).await.unwrap();
	assert_eq!(history.len(), 1);

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
}

#[tokio::test]
async fn list_for_user_walks_orgs_robots_connections() {
	let harness = ready_harness();
	let coords = harness.broker.create("robot-1", "alice").await.unwrap();

	let active = harness.broker.list_for_user("alice", StatusFilter::Active).await.unwrap();
	assert_eq!(active.len(), 1);
	assert_eq!(active[0].connection_id, coords.connection_id);

	assert!(harness.broker.list_for_user("mallory", StatusFilter::Active).await.unwrap().is_empty());

	harness.broker.close(&coords.connection_id, "alice").await.unwrap();
	let record = harness.store.find_by_id(&coords.connection_id).await.unwrap().unwrap();
	assert!(!record.is_active);

	assert!(harness.broker.list_for_user("alice", StatusFilter::Active).await.unwrap().is_empty());
	assert_eq!(harness.broker.list_for_user("alice", StatusFilter::Inactive).await.unwrap().len(), 1);
	assert_eq!(harness.broker.list_for_user("alice", StatusFilter::All).await.unwrap().len(), 1);
}

#[tokio::test]
async fn startup_reconciliation_sweeps_dead_pids() {
	let harness = ready_harness();

	// A record whose process died with a previous broker instance, and one
	// whose pid is demonstrably alive.
	let dead = Connection::new("conn-dead", "robot-1", "alice", 4_194_000, 42100);
	let live = Connection::new("conn-live", "robot-2", "alice", std::process::id(), 42102);
	harness.store.insert(&dead).await.unwrap();
	harness.store.insert(&live).await.unwrap();

	let swept = harness.broker.reconcile_startup().await.unwrap();
	assert_eq!(swept, 1);

	let dead = harness.store.find_by_id("conn-dead").await.unwrap().unwrap();
	assert!(!dead.is_active);
	assert!(dead.closed_at.is_some());

	let live = harness.store.find_by_id("conn-live").await.unwrap().unwrap();
	assert!(live.is_active);
}
