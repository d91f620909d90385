//! In-memory implementation of the connection store.
//!
//! Backs tests and single-node development; ordering and idempotency match
//! the MongoDB implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use robolink_protocol::StatusFilter;
use tokio::sync::RwLock;

use super::{Connection, ConnectionStore};
use crate::error::{BrokerError, Result};

#[derive(Default)]
pub struct MemoryConnectionStore {
	records: RwLock<HashMap<String, Connection>>,
}

impl MemoryConnectionStore {
	pub fn new() -> Self {
		Self::default()
	}
}

fn newest_first(mut records: Vec<Connection>) -> Vec<Connection> {
	records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
	records
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
	async fn insert(&self, connection: &Connection) -> Result<()> {
		let mut records = self.records.write().await;
		if records.contains_key(&connection.id) {
			return Err(BrokerError::Internal(format!("duplicate connection id {}", connection.id)));
		}
		records.insert(connection.id.clone(), connection.clone());
		Ok(())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Connection>> {
		Ok(self.records.read().await.get(id).cloned())
	}

	async fn find_by_robot(&self, robot_id: &str, filter: StatusFilter) -> Result<Vec<Connection>> {
		let records = self.records.read().await;
		let matched = records
			.values()
			.filter(|record| record.robot_id == robot_id && filter.matches(record.is_active))
			.cloned()
			.collect();
		Ok(newest_first(matched))
	}

	async fn find_for_robots(&self, robot_ids: &[String], filter: StatusFilter) -> Result<Vec<Connection>> {
		let records = self.records.read().await;
		let matched = records
			.values()
			.filter(|record| robot_ids.contains(&record.robot_id) && filter.matches(record.is_active))
			.cloned()
			.collect();
		Ok(newest_first(matched))
	}

	async fn find_active_by_robot(&self, robot_id: &str) -> Result<Option<Connection>> {
		let records = self.records.read().await;
		Ok(records.values().find(|record| record.robot_id == robot_id && record.is_active).cloned())
	}

	async fn list_active(&self) -> Result<Vec<Connection>> {
		let records = self.records.read().await;
		Ok(records.values().filter(|record| record.is_active).cloned().collect())
	}

	async fn mark_closed(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool> {
		let mut records = self.records.write().await;
		match records.get_mut(id) {
			Some(record) if record.is_active => {
				record.is_active = false;
				record.closed_at = Some(closed_at);
				Ok(true)
			}
			Some(_) => Ok(false),
			None => Ok(false),
		}
	}
}
