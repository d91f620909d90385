//! Persisted connection records and the store seam over the document store.
//!
//! The store is the only durable shared state in the broker; nothing about a
//! session outlives the supervisor's handlers except its record here.
//! Records are append-only history per robot: they transition to inactive
//! but are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use async_trait::async_trait;
use robolink_protocol::{ConnectionView, RobotSummary, StatusFilter};

use crate::error::Result;

/// MongoDB-backed store used in production.
pub mod mongo;

/// In-memory store for tests and single-node development.
pub mod memory;

/// One bridging session between a user and a robot.
///
/// Persisted only after the subprocess signalled readiness, so a record
/// always corresponds to a process that at least started. `pid` and `port`
/// are set once at spawn time and never mutated; `closed_at` is written at
/// most once, on the transition to inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
	#[serde(rename = "_id")]
	pub id: String,
	pub robot_id: String,
	pub created_by: String,
	pub is_active: bool,
	pub pid: u32,
	pub port: u16,
	#[serde(with = "chrono::serde::ts_milliseconds")]
	pub created_at: DateTime<Utc>,
	#[serde(default, with = "chrono::serde::ts_milliseconds_option")]
	pub closed_at: Option<DateTime<Utc>>,
}

impl Connection {
	/// Builds a new active record.
	///
	/// `id` is the correlation token already handed to the subprocess; the
	/// record and the process must agree on it.
	pub fn new(id: &str, robot_id: &str, created_by: &str, pid: u32, port: u16) -> Self {
		Self {
			id: id.to_string(),
			robot_id: robot_id.to_string(),
			created_by: created_by.to_string(),
			is_active: true,
			pid,
			port,
			created_at: Utc::now(),
			closed_at: None,
		}
	}

	/// Projects the record into the sanitized wire shape.
	///
	/// The pid is dropped here and nowhere reintroduced; an attached robot
	/// summary was already built without the robot's secret.
	pub fn to_public_view(&self, robot: Option<RobotSummary>) -> ConnectionView {
		ConnectionView {
			connection_id: self.id.clone(),
			robot_id: self.robot_id.clone(),
			created_by: self.created_by.clone(),
			is_active: self.is_active,
			port: self.port,
			created_at: self.created_at,
			closed_at: self.closed_at,
			robot,
		}
	}
}

/// Persistence seam for connection records.
///
/// The per-robot single-active invariant is NOT enforced here; the lifecycle
/// layer checks `find_active_by_robot` before spawning, and the window
/// between that check and `insert` is an accepted race of the design.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
	/// Persists a new record. Always an insert, never an upsert.
	async fn insert(&self, connection: &Connection) -> Result<()>;

	async fn find_by_id(&self, id: &str) -> Result<Option<Connection>>;

	/// Historical records for one robot, newest first.
	async fn find_by_robot(&self, robot_id: &str, filter: StatusFilter) -> Result<Vec<Connection>>;

	/// Records across a set of robots, newest first. This is the final hop of
	/// the user → organizations → robots → connections join; the earlier hops
	/// belong to the fleet directory.
	async fn find_for_robots(&self, robot_ids: &[String], filter: StatusFilter) -> Result<Vec<Connection>>;

	/// The at-most-one active record for a robot.
	async fn find_active_by_robot(&self, robot_id: &str) -> Result<Option<Connection>>;

	/// Every active record, for startup reconciliation.
	async fn list_active(&self) -> Result<Vec<Connection>>;

	/// Transitions a record to inactive, stamping `closed_at`.
	///
	/// Idempotent: returns `true` only when this call performed the
	/// transition. A record already inactive keeps its original timestamp.
	async fn mark_closed(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool>;
}
