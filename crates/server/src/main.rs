//! robolinkd, the robolink fleet connection broker daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use robolink_broker::ConnectionBroker;
use robolink_broker::config::BrokerConfig;
use robolink_broker::directory::{AccessPolicy, RobotDirectory};
use robolink_broker::registrar::HttpBridgeRegistrar;
use robolink_broker::registry::ConnectionStore;
use robolink_broker::registry::mongo::MongoConnectionStore;
use robolink_broker::supervisor::{BridgeSupervisor, TracingAudit};
use robolink_server::auth::HttpIdentityProvider;
use robolink_server::directory::MongoDirectory;
use robolink_server::{AppState, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "robolinkd", about = "Fleet connection broker daemon", version)]
struct Args {
	/// Socket address the HTTP surface binds to.
	#[arg(long, default_value = "127.0.0.1:8780")]
	bind: SocketAddr,
}

fn env_or(name: &str, default: &str) -> String {
	std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let args = Args::parse();
	let config = BrokerConfig::from_env().context("broker configuration")?;

	let mongo_url = env_or("ROBOLINK_MONGO_URL", "mongodb://127.0.0.1:27017");
	let mongo_db = env_or("ROBOLINK_MONGO_DB", "robolink");
	let auth_url = env_or("ROBOLINK_AUTH_URL", "http://127.0.0.1:8700/verify");

	let options = mongodb::options::ClientOptions::parse(&mongo_url).await.context("mongo url")?;
	let client = mongodb::Client::with_options(options).context("mongo client")?;

	let store: Arc<dyn ConnectionStore> = Arc::new(MongoConnectionStore::with_client(&client, &mongo_db).await?);
	let directory = Arc::new(MongoDirectory::new(&client, &mongo_db));
	let robot_directory: Arc<dyn RobotDirectory> = directory.clone();
	let access_policy: Arc<dyn AccessPolicy> = directory;
	let supervisor = BridgeSupervisor::new(config.bridge_program.clone(), Arc::new(TracingAudit));

	let broker = Arc::new(ConnectionBroker::new(
		config,
		store,
		robot_directory,
		access_policy,
		Arc::new(HttpBridgeRegistrar::new()?),
		supervisor,
	));

	// Records left active by a crashed instance point at processes that no
	// longer exist; close them before accepting traffic.
	let swept = broker.reconcile_startup().await?;
	if swept > 0 {
		info!(target = "robolink.session", swept, "closed stale sessions from a previous run");
	}

	let app = router(AppState {
		broker,
		identity: Arc::new(HttpIdentityProvider::new(auth_url)?),
	});

	let listener = tokio::net::TcpListener::bind(args.bind).await.context("bind http listener")?;
	info!(target = "robolink.http", addr = %args.bind, "robolinkd listening");
	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	info!(target = "robolink.http", "shutdown signal received");
}
