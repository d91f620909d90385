//! Response mapping for broker failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use robolink_broker::BrokerError;
use robolink_protocol::ErrorBody;
use tracing::error;

/// Wrapper giving every broker failure an HTTP rendering.
pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
	fn from(err: BrokerError) -> Self {
		Self(err)
	}
}

/// Status code for each failure class; one-to-one, no collapsing.
pub fn status_for(err: &BrokerError) -> StatusCode {
	match err {
		BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
		BrokerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
		BrokerError::Forbidden(_) => StatusCode::FORBIDDEN,
		BrokerError::Conflict(_) => StatusCode::CONFLICT,
		BrokerError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
		BrokerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
		BrokerError::CapacityExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
		BrokerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = status_for(&self.0);
		if status.is_server_error() {
			error!(target = "robolink.http", code = self.0.code(), error = %self.0, "request failed");
		}
		let body = ErrorBody {
			message: self.0.to_string(),
			code: self.0.code().to_string(),
		};
		(status, Json(body)).into_response()
	}
}
