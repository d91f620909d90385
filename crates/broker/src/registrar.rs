//! Registration seam to the spawned bridging process.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{BrokerError, Result};

/// Calls into a running bridge (and, best-effort, the robot-side agent).
#[async_trait]
pub trait BridgeRegistrar: Send + Sync {
	/// Registers a user's coordinates with the bridge; returns the register
	/// id the client presents when attaching.
	async fn register(&self, connection_id: &str, user_id: &str, app_port: u16) -> Result<String>;

	/// Asks the robot-side agent to wind down. Best-effort: callers log
	/// failures and move on.
	async fn stop_agent(&self, robot_host: &str, robot_port: u16) -> Result<()>;
}

/// HTTP registrar talking to the bridge's local application port.
pub struct HttpBridgeRegistrar {
	client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterReply {
	register_id: String,
}

impl HttpBridgeRegistrar {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(2))
			.build()
			.map_err(|e| BrokerError::Internal(format!("failed to build registrar client: {e}")))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl BridgeRegistrar for HttpBridgeRegistrar {
	async fn register(&self, connection_id: &str, user_id: &str, app_port: u16) -> Result<String> {
		let url = format!("http://127.0.0.1:{app_port}/register");
		let reply: RegisterReply = self
			.client
			.post(&url)
			.json(&json!({ "connectionId": connection_id, "userId": user_id }))
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;
		debug!(target = "robolink.session", connection = %connection_id, register = %reply.register_id, "registered with bridge");
		Ok(reply.register_id)
	}

	async fn stop_agent(&self, robot_host: &str, robot_port: u16) -> Result<()> {
		let url = format!("http://{robot_host}:{robot_port}/stop");
		self.client.post(&url).send().await?.error_for_status()?;
		Ok(())
	}
}
