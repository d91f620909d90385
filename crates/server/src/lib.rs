//! HTTP service wiring for the robolink connection broker.

use std::sync::Arc;

use robolink_broker::ConnectionBroker;

/// Bearer-credential verification seam.
pub mod auth;
/// Read-only MongoDB fleet directory lookups.
pub mod directory;
/// Response mapping for broker failures.
pub mod error;
/// Router and request handlers.
pub mod routes;

pub use routes::router;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
	pub broker: Arc<ConnectionBroker>,
	pub identity: Arc<dyn auth::IdentityProvider>,
}
