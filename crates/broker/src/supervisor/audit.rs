//! Audit sink for bridge process output.

use tracing::info;

use super::BridgeSpec;

/// Receives every line a bridge writes to stdout or stderr.
///
/// A side channel, not part of the control contract: sinks must not block
/// and must not fail the watcher.
pub trait AuditSink: Send + Sync {
	fn line(&self, spec: &BridgeSpec, stream: &str, line: &str);
}

/// Default sink forwarding output to the tracing pipeline, tagged with the
/// session's organization and robot context for downstream log shipping.
pub struct TracingAudit;

impl AuditSink for TracingAudit {
	fn line(&self, spec: &BridgeSpec, stream: &str, line: &str) {
		info!(
			target = "robolink.bridge",
			organization = %spec.organization_id,
			robot = %spec.robot_id,
			connection = %spec.connection_id,
			stream,
			"{line}"
		);
	}
}
