//! Read-only MongoDB lookups over the fleet directory collections.
//!
//! Robot and organization CRUD belongs to the fleet-management services;
//! the broker only reads the subset below. Robot documents are deserialized
//! without their secret credential, so it cannot reach a response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection};
use robolink_broker::directory::{AccessPolicy, Robot, RobotDirectory, RobotStatus};
use robolink_broker::error::Result;
use robolink_protocol::{RobotState, Role};
use serde::Deserialize;

/// Snapshots older than this degrade to Offline.
const STATUS_STALE_AFTER_SECS: i64 = 5 * 60;

#[derive(Debug, Deserialize)]
struct RobotDoc {
	#[serde(rename = "_id")]
	id: String,
	organization_id: String,
	name: String,
	host: String,
}

#[derive(Debug, Deserialize)]
struct MemberDoc {
	user_id: String,
	role: Role,
}

#[derive(Debug, Deserialize)]
struct OrganizationDoc {
	#[serde(rename = "_id")]
	id: String,
	#[serde(default)]
	members: Vec<MemberDoc>,
}

#[derive(Debug, Deserialize)]
struct RobotStatusDoc {
	state: RobotState,
	#[serde(default)]
	port: Option<u16>,
	#[serde(with = "chrono::serde::ts_milliseconds")]
	reported_at: DateTime<Utc>,
}

pub struct MongoDirectory {
	robots: Collection<RobotDoc>,
	organizations: Collection<OrganizationDoc>,
	statuses: Collection<RobotStatusDoc>,
}

impl MongoDirectory {
	pub fn new(client: &Client, database: &str) -> Self {
		let database = client.database(database);
		Self {
			robots: database.collection("robots"),
			organizations: database.collection("organizations"),
			statuses: database.collection("robot_status"),
		}
	}
}

fn snapshot_from(doc: RobotStatusDoc, now: DateTime<Utc>) -> RobotStatus {
	if now - doc.reported_at > chrono::Duration::seconds(STATUS_STALE_AFTER_SECS) {
		return RobotStatus {
			state: RobotState::Offline,
			port: None,
		};
	}
	RobotStatus {
		state: doc.state,
		port: doc.port,
	}
}

#[async_trait]
impl RobotDirectory for MongoDirectory {
	async fn robot_by_id(&self, robot_id: &str) -> Result<Option<Robot>> {
		let doc = self.robots.find_one(doc! {"_id": robot_id}).await?;
		Ok(doc.map(|doc| Robot {
			id: doc.id,
			organization_id: doc.organization_id,
			name: doc.name,
			host: doc.host,
		}))
	}

	async fn latest_status(&self, robot_id: &str) -> Result<Option<RobotStatus>> {
		let mut cursor = self
			.statuses
			.find(doc! {"robot_id": robot_id})
			.sort(doc! {"reported_at": -1})
			.limit(1)
			.await?;
		let doc = cursor.try_next().await?;
		Ok(doc.map(|doc| snapshot_from(doc, Utc::now())))
	}

	async fn organizations_for_user(&self, user_id: &str) -> Result<Vec<String>> {
		let cursor = self.organizations.find(doc! {"members.user_id": user_id}).await?;
		let organizations: Vec<OrganizationDoc> = cursor.try_collect().await?;
		Ok(organizations.into_iter().map(|organization| organization.id).collect())
	}

	async fn robots_in_organizations(&self, organization_ids: &[String]) -> Result<Vec<String>> {
		if organization_ids.is_empty() {
			return Ok(Vec::new());
		}
		let cursor = self.robots.find(doc! {"organization_id": {"$in": organization_ids.to_vec()}}).await?;
		let robots: Vec<RobotDoc> = cursor.try_collect().await?;
		Ok(robots.into_iter().map(|robot| robot.id).collect())
	}
}

#[async_trait]
impl AccessPolicy for MongoDirectory {
	async fn is_user_allowed(&self, user_id: &str, organization_id: &str, roles: &[Role]) -> Result<bool> {
		let Some(organization) = self.organizations.find_one(doc! {"_id": organization_id}).await? else {
			return Ok(false);
		};
		Ok(organization
			.members
			.iter()
			.any(|member| member.user_id == user_id && roles.contains(&member.role)))
	}

	async fn is_member(&self, user_id: &str, organization_id: &str) -> Result<bool> {
		let found = self
			.organizations
			.find_one(doc! {"_id": organization_id, "members.user_id": user_id})
			.await?;
		Ok(found.is_some())
	}
}
