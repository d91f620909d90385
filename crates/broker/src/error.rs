//! Broker failure taxonomy shared by registry, supervisor, and lifecycle.

use thiserror::Error;

/// Convenience alias used across the broker crate.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Failure classes surfaced to the HTTP layer.
///
/// Each variant maps to exactly one response status; the lifecycle layer
/// never collapses two classes into one.
#[derive(Debug, Error)]
pub enum BrokerError {
	#[error("{0} not found")]
	NotFound(String),
	#[error("unauthorized: {0}")]
	Unauthorized(String),
	#[error("forbidden: {0}")]
	Forbidden(String),
	#[error("conflict: {0}")]
	Conflict(String),
	#[error("precondition failed: {0}")]
	PreconditionFailed(String),
	#[error("timeout: {0}")]
	Timeout(String),
	#[error("capacity exhausted: {0}")]
	CapacityExhausted(String),
	#[error("internal error: {0}")]
	Internal(String),
}

impl BrokerError {
	/// Stable machine-readable code carried in HTTP error bodies.
	pub fn code(&self) -> &'static str {
		match self {
			BrokerError::NotFound(_) => "not_found",
			BrokerError::Unauthorized(_) => "unauthorized",
			BrokerError::Forbidden(_) => "forbidden",
			BrokerError::Conflict(_) => "conflict",
			BrokerError::PreconditionFailed(_) => "precondition_failed",
			BrokerError::Timeout(_) => "timeout",
			BrokerError::CapacityExhausted(_) => "capacity_exhausted",
			BrokerError::Internal(_) => "internal",
		}
	}
}

impl From<std::io::Error> for BrokerError {
	fn from(err: std::io::Error) -> Self {
		BrokerError::Internal(err.to_string())
	}
}

impl From<mongodb::error::Error> for BrokerError {
	fn from(err: mongodb::error::Error) -> Self {
		BrokerError::Internal(format!("document store: {err}"))
	}
}

impl From<reqwest::Error> for BrokerError {
	fn from(err: reqwest::Error) -> Self {
		BrokerError::Internal(format!("http collaborator: {err}"))
	}
}
