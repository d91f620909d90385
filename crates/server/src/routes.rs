//! Router and request handlers for the connection surface.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use robolink_broker::BrokerError;
use robolink_protocol::{
	ConnectionListResponse, ConnectionResponse, CoordinatesResponse, CreateConnectionRequest, StatusFilter,
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::{UserIdentity, bearer_token};
use crate::error::ApiError;

/// Builds the HTTP surface. Every `/connection` route requires a bearer
/// credential; `/healthz` does not.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/healthz", get(healthz))
		.route("/connection", get(list_connections))
		.route("/connection/create", post(create_connection))
		.route("/connection/join/{connection_id}", post(join_connection))
		.route("/connection/close/{connection_id}", post(close_connection))
		.route("/connection/robot/{robot_id}", get(robot_connections))
		.route("/connection/{connection_id}", get(get_connection))
		.with_state(state)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserIdentity, ApiError> {
	let token = bearer_token(headers).ok_or_else(|| ApiError(BrokerError::Unauthorized("missing bearer credential".to_string())))?;
	Ok(state.identity.verify(token).await?)
}

async fn healthz() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn create_connection(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(body): Json<CreateConnectionRequest>,
) -> Result<Json<CoordinatesResponse>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	let connection = state.broker.create(&body.robot_id, &user.user_id).await?;
	Ok(Json(CoordinatesResponse {
		message: "connection created".to_string(),
		connection,
	}))
}

async fn join_connection(
	State(state): State<AppState>,
	Path(connection_id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<CoordinatesResponse>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	let connection = state.broker.join(&connection_id, &user.user_id).await?;
	Ok(Json(CoordinatesResponse {
		message: "connection joined".to_string(),
		connection,
	}))
}

async fn close_connection(
	State(state): State<AppState>,
	Path(connection_id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	state.broker.close(&connection_id, &user.user_id).await?;
	Ok(Json(serde_json::json!({ "message": "connection closed" })))
}

async fn get_connection(
	State(state): State<AppState>,
	Path(connection_id): Path<String>,
	headers: HeaderMap,
) -> Result<Json<ConnectionResponse>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	let connection = state.broker.get_by_id(&connection_id, &user.user_id).await?;
	Ok(Json(ConnectionResponse {
		message: "connection found".to_string(),
		connection,
	}))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
	#[serde(default)]
	status: StatusFilter,
}

async fn list_connections(
	State(state): State<AppState>,
	Query(query): Query<ListQuery>,
	headers: HeaderMap,
) -> Result<Json<ConnectionListResponse>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	let connections = state.broker.list_for_user(&user.user_id, query.status).await?;
	Ok(Json(ConnectionListResponse {
		message: "connections listed".to_string(),
		connections,
	}))
}

async fn robot_connections(
	State(state): State<AppState>,
	Path(robot_id): Path<String>,
	Query(query): Query<ListQuery>,
	headers: HeaderMap,
) -> Result<Json<ConnectionListResponse>, ApiError> {
	let user = authenticate(&state, &headers).await?;
	let connections = state.broker.get_by_robot(&robot_id, &user.user_id, query.status).await?;
	Ok(Json(ConnectionListResponse {
		message: "connections listed".to_string(),
		connections,
	}))
}
