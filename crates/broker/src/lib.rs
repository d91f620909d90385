//! Connection broker core for the robolink fleet backend.
//!
//! Creates, supervises, and tears down a per-session bridging process
//! between a requesting user and a robot: permission checks, port
//! allocation, subprocess readiness with a bounded wait, a persisted
//! registry of sessions, and reconciliation between process exits and
//! registry state.

/// Environment-derived configuration.
pub mod config;
/// Fleet directory and access-control seams.
pub mod directory;
/// Failure taxonomy and result alias.
pub mod error;
/// Create/join/close orchestration.
pub mod lifecycle;
/// Registration seam to the bridging process.
pub mod registrar;
/// Persisted connection records and stores.
pub mod registry;
/// Bridge subprocess supervision.
pub mod supervisor;

pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use lifecycle::ConnectionBroker;
pub use registry::{Connection, ConnectionStore};
pub use supervisor::{BridgeSupervisor, TracingAudit};
