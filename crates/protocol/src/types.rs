//! Shared enumerations used across broker operations.

use serde::{Deserialize, Serialize};

/// Organization-scoped role held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Owner,
	Admin,
	Operator,
	Analyst,
	Viewer,
}

impl Role {
	/// Roles allowed to create, join, and close bridging sessions.
	pub const OPERATOR_TIER: [Role; 4] = [Role::Owner, Role::Admin, Role::Operator, Role::Analyst];

	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Owner => "owner",
			Role::Admin => "admin",
			Role::Operator => "operator",
			Role::Analyst => "analyst",
			Role::Viewer => "viewer",
		}
	}
}

/// Listing filter over connection activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
	#[default]
	All,
	Active,
	Inactive,
}

impl StatusFilter {
	/// Whether a record with `is_active` passes this filter.
	pub fn matches(&self, is_active: bool) -> bool {
		match self {
			StatusFilter::All => true,
			StatusFilter::Active => is_active,
			StatusFilter::Inactive => !is_active,
		}
	}
}

/// Robot agent state as last reported to the fleet directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotState {
	Online,
	Operating,
	Offline,
	Unknown,
}
