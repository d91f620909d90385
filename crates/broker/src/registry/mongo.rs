//! MongoDB implementation of the connection store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, IndexModel};
use robolink_protocol::StatusFilter;

use super::{Connection, ConnectionStore};
use crate::error::Result;

const COLLECTION: &str = "connections";

pub struct MongoConnectionStore {
	collection: Collection<Connection>,
}

impl MongoConnectionStore {
	/// Connects to the document store and prepares the collection indexes.
	pub async fn connect(url: &str, database: &str) -> Result<Self> {
		let options = ClientOptions::parse(url).await?;
		let client = Client::with_options(options)?;
		Self::with_client(&client, database).await
	}

	/// Builds a store over an existing client, creating indexes up front.
	pub async fn with_client(client: &Client, database: &str) -> Result<Self> {
		let collection = client.database(database).collection::<Connection>(COLLECTION);
		ensure_indexes(&collection).await?;
		Ok(Self { collection })
	}
}

async fn ensure_indexes(collection: &Collection<Connection>) -> Result<()> {
	// Non-unique on purpose: the single-active-per-robot invariant is a
	// check-before-spawn in the lifecycle layer, and the window between the
	// check and the insert stays open in this design.
	let robot_index = IndexModel::builder().keys(doc! {"robot_id": 1, "is_active": 1}).build();
	collection.create_index(robot_index).await?;

	let created_index = IndexModel::builder().keys(doc! {"created_at": -1}).build();
	collection.create_index(created_index).await?;

	Ok(())
}

fn apply_filter(mut query: Document, filter: StatusFilter) -> Document {
	match filter {
		StatusFilter::All => {}
		StatusFilter::Active => {
			query.insert("is_active", true);
		}
		StatusFilter::Inactive => {
			query.insert("is_active", false);
		}
	}
	query
}

#[async_trait]
impl ConnectionStore for MongoConnectionStore {
	async fn insert(&self, connection: &Connection) -> Result<()> {
		self.collection.insert_one(connection).await?;
		Ok(())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Connection>> {
		Ok(self.collection.find_one(doc! {"_id": id}).await?)
	}

	async fn find_by_robot(&self, robot_id: &str, filter: StatusFilter) -> Result<Vec<Connection>> {
		let query = apply_filter(doc! {"robot_id": robot_id}, filter);
		let cursor = self.collection.find(query).sort(doc! {"created_at": -1}).await?;
		Ok(cursor.try_collect().await?)
	}

	async fn find_for_robots(&self, robot_ids: &[String], filter: StatusFilter) -> Result<Vec<Connection>> {
		if robot_ids.is_empty() {
			return Ok(Vec::new());
		}
		let query = apply_filter(doc! {"robot_id": {"$in": robot_ids.to_vec()}}, filter);
		let cursor = self.collection.find(query).sort(doc! {"created_at": -1}).await?;
		Ok(cursor.try_collect().await?)
	}

	async fn find_active_by_robot(&self, robot_id: &str) -> Result<Option<Connection>> {
		Ok(self.collection.find_one(doc! {"robot_id": robot_id, "is_active": true}).await?)
	}

	async fn list_active(&self) -> Result<Vec<Connection>> {
		let cursor = self.collection.find(doc! {"is_active": true}).await?;
		Ok(cursor.try_collect().await?)
	}

	async fn mark_closed(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool> {
		// Filtering on is_active makes the second writer a no-op, so the
		// explicit-close and exit-event paths can race safely.
		let update = doc! {"$set": {"is_active": false, "closed_at": closed_at.timestamp_millis()}};
		let outcome = self.collection.update_one(doc! {"_id": id, "is_active": true}, update).await?;
		Ok(outcome.modified_count == 1)
	}
}
