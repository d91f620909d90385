//! Request and response payloads for connection operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RobotState;

/// Body for `POST /connection/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
	pub robot_id: String,
}

/// Network coordinates a client needs to reach a bridging session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCoordinates {
	pub connection_id: String,
	pub hostname: String,
	pub port: u16,
	pub register_id: String,
}

/// Envelope returned by create and join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatesResponse {
	pub message: String,
	pub connection: ConnectionCoordinates,
}

/// Robot projection attached to connection views.
///
/// Deliberately omits the robot's secret credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotSummary {
	pub robot_id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<RobotState>,
}

/// Sanitized connection record exposed over HTTP.
///
/// The subprocess pid never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
	pub connection_id: String,
	pub robot_id: String,
	pub created_by: String,
	pub is_active: bool,
	pub port: u16,
	pub created_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub closed_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub robot: Option<RobotSummary>,
}

/// Envelope returned by single-connection reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionResponse {
	pub message: String,
	pub connection: ConnectionView,
}

/// Envelope returned by list reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionListResponse {
	pub message: String,
	pub connections: Vec<ConnectionView>,
}

/// Structured error body produced by the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
	pub message: String,
	pub code: String,
}
