//! Process and port lifecycle helpers shared by broker and server crates.

/// TCP port probing, allocation, and range parsing.
pub mod port;
/// Process liveness and signalling helpers.
pub mod process;

pub use port::{find_free_tcp_port_within_range, parse_range, port_available};
pub use process::{interrupt_pid, pid_is_alive};
