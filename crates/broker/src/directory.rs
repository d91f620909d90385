//! Fleet directory and access-control seams.
//!
//! Organizations, robots, and permissions are owned by external services;
//! the broker only consumes the lookups below. Implementations live with
//! the composition root.

use async_trait::async_trait;
use robolink_protocol::{RobotState, Role};

use crate::error::Result;

/// Robot record subset the broker needs.
///
/// The robot's secret credential is deliberately not part of this shape, so
/// nothing downstream can leak it.
#[derive(Debug, Clone)]
pub struct Robot {
	pub id: String,
	pub organization_id: String,
	pub name: String,
	pub host: String,
}

/// Latest agent status snapshot for a robot.
#[derive(Debug, Clone)]
pub struct RobotStatus {
	pub state: RobotState,
	pub port: Option<u16>,
}

/// Read-only lookups over the fleet directory.
#[async_trait]
pub trait RobotDirectory: Send + Sync {
	async fn robot_by_id(&self, robot_id: &str) -> Result<Option<Robot>>;

	/// Latest status snapshot. Implementations degrade snapshots older than
	/// their staleness window to Offline before returning them.
	async fn latest_status(&self, robot_id: &str) -> Result<Option<RobotStatus>>;

	/// Organizations the user belongs to.
	async fn organizations_for_user(&self, user_id: &str) -> Result<Vec<String>>;

	/// Robots owned by any of the given organizations.
	async fn robots_in_organizations(&self, organization_ids: &[String]) -> Result<Vec<String>>;
}

/// Permission checks against an organization.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
	/// Whether `user_id` holds one of `roles` in `organization_id`.
	async fn is_user_allowed(&self, user_id: &str, organization_id: &str, roles: &[Role]) -> Result<bool>;

	/// Whether `user_id` belongs to `organization_id` at all.
	async fn is_member(&self, user_id: &str, organization_id: &str) -> Result<bool>;
}
