//! Environment-derived broker configuration.

use std::path::PathBuf;
use std::time::Duration;

use robolink_runtime::parse_range;

use crate::error::{BrokerError, Result};

const ENV_APP_PORT_RANGE: &str = "ROBOLINK_APP_PORT_RANGE";
const ENV_STARTUP_TIMEOUT_MS: &str = "ROBOLINK_STARTUP_TIMEOUT_MS";
const ENV_IDLE_TIMEOUT_SECS: &str = "ROBOLINK_IDLE_TIMEOUT_SECS";
const ENV_HOSTNAME: &str = "ROBOLINK_HOSTNAME";
const ENV_BRIDGE_PROGRAM: &str = "ROBOLINK_BRIDGE_PROGRAM";

const DEFAULT_APP_PORT_RANGE: (u16, u16) = (9100, 9900);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_millis(4000);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_HOSTNAME: &str = "127.0.0.1";
const DEFAULT_BRIDGE_PROGRAM: &str = "robot-bridge";

/// Settings consumed by the supervisor and lifecycle layers.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
	/// Inclusive range the bridge application port is allocated from.
	pub app_port_range: (u16, u16),
	/// Bound on the wait for the bridge readiness line.
	pub startup_timeout: Duration,
	/// Idle timeout handed to the bridge on its command line.
	pub idle_timeout: Duration,
	/// Externally reachable name returned in connection coordinates.
	pub hostname: String,
	/// Bridging executable, resolved through PATH when not absolute.
	pub bridge_program: PathBuf,
}

impl BrokerConfig {
	/// Reads configuration from process environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let app_port_range = match lookup(ENV_APP_PORT_RANGE) {
			Some(raw) => {
				let range = parse_range(&raw)
					.ok_or_else(|| BrokerError::Internal(format!("invalid {ENV_APP_PORT_RANGE}: {raw:?}")))?;
				if range.0 > range.1 {
					return Err(BrokerError::Internal(format!("invalid {ENV_APP_PORT_RANGE}: start exceeds end in {raw:?}")));
				}
				range
			}
			None => DEFAULT_APP_PORT_RANGE,
		};

		let startup_timeout = duration_from(&lookup, ENV_STARTUP_TIMEOUT_MS, Duration::from_millis, DEFAULT_STARTUP_TIMEOUT)?;
		let idle_timeout = duration_from(&lookup, ENV_IDLE_TIMEOUT_SECS, Duration::from_secs, DEFAULT_IDLE_TIMEOUT)?;

		Ok(Self {
			app_port_range,
			startup_timeout,
			idle_timeout,
			hostname: lookup(ENV_HOSTNAME).unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
			bridge_program: lookup(ENV_BRIDGE_PROGRAM).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_BRIDGE_PROGRAM)),
		})
	}
}

fn duration_from(lookup: &impl Fn(&str) -> Option<String>, name: &str, unit: fn(u64) -> Duration, default: Duration) -> Result<Duration> {
	match lookup(name) {
		Some(raw) => raw
			.trim()
			.parse()
			.map(unit)
			.map_err(|_| BrokerError::Internal(format!("invalid {name}: {raw:?}"))),
		None => Ok(default),
	}
}
