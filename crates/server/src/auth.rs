//! Bearer-credential verification against the external auth service.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use robolink_broker::error::{BrokerError, Result};
use serde::Deserialize;
use serde_json::json;

/// Verified caller identity.
#[derive(Debug, Clone)]
pub struct UserIdentity {
	pub user_id: String,
}

/// Collaborator seam to the authentication service.
///
/// Authentication itself is external; the broker only consumes the verified
/// user id this produces.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	/// Verifies a bearer token. Any rejection maps to `Unauthorized`.
	async fn verify(&self, token: &str) -> Result<UserIdentity>;
}

/// Pulls the bearer token out of request headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Identity provider backed by the auth service's verify endpoint.
pub struct HttpIdentityProvider {
	client: reqwest::Client,
	verify_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyReply {
	user_id: String,
}

impl HttpIdentityProvider {
	pub fn new(verify_url: impl Into<String>) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(2))
			.build()
			.map_err(|e| BrokerError::Internal(format!("failed to build identity client: {e}")))?;
		Ok(Self {
			client,
			verify_url: verify_url.into(),
		})
	}
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
	async fn verify(&self, token: &str) -> Result<UserIdentity> {
		let response = self
			.client
			.post(&self.verify_url)
			.json(&json!({ "token": token }))
			.send()
			.await
			.map_err(|e| BrokerError::Internal(format!("auth service unreachable: {e}")))?;

		if !response.status().is_success() {
			return Err(BrokerError::Unauthorized("credential rejected".to_string()));
		}

		let reply: VerifyReply = response
			.json()
			.await
			.map_err(|e| BrokerError::Internal(format!("malformed verification reply: {e}")))?;
		Ok(UserIdentity { user_id: reply.user_id })
	}
}
