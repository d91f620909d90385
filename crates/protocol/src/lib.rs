//! Wire types for the robolink connection broker.
//!
//! This crate contains the serde-serializable types exchanged over the
//! broker's HTTP surface. These types represent the "protocol layer" - the
//! shapes of data as they appear on the wire.
//!
//! Types in this crate are:
//! * Pure data: no behavior beyond serialization/deserialization
//! * Sanitized: nothing here ever carries a subprocess pid or a robot secret
//! * Stable: changes only when the wire contract changes
//!
//! The broker core builds these views in `robolink-broker`.

pub mod connection;
pub mod types;

pub use connection::*;
pub use types::*;
