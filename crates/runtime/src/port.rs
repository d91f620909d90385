//! TCP port probing and allocation for bridge application ports.

use rand::seq::SliceRandom;
use tracing::debug;

/// Returns `true` when `port` can be bound on localhost.
///
/// Any bind error counts as unavailable, not just "address in use"; the
/// probe never claims a port is free on an ambiguous failure. The probe
/// listener is dropped immediately, so the port stays free afterwards.
pub fn port_available(port: u16) -> bool {
	std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Scans `start..=end` in `step` increments and picks a free port at random.
///
/// A candidate qualifies only when it and the immediately following port
/// number are both unbound. The returned port is chosen uniformly among all
/// qualifying candidates rather than first-found, which spreads allocations
/// across the range when several broker instances scan concurrently.
///
/// Returns `None` when the scan yields no candidates; callers treat that as
/// capacity exhaustion rather than retrying.
pub fn find_free_tcp_port_within_range(start: u16, end: u16, step: u16) -> Option<u16> {
	let step = step.max(1);
	let mut candidates = Vec::new();
	let mut port = start;
	while port <= end {
		if port < u16::MAX && port_available(port) && port_available(port + 1) {
			candidates.push(port);
		}
		match port.checked_add(step) {
			Some(next) => port = next,
			None => break,
		}
	}

	let picked = candidates.choose(&mut rand::thread_rng()).copied();
	debug!(target = "robolink.port", start, end, candidates = candidates.len(), picked = ?picked, "port scan finished");
	picked
}

/// Parses an `"A-B"` range string into its two bounds.
///
/// Returns `None` when either side is missing or non-numeric. Ordering of
/// the bounds is left to the caller.
pub fn parse_range(raw: &str) -> Option<(u16, u16)> {
	let (start, end) = raw.split_once('-')?;
	let start = start.trim().parse().ok()?;
	let end = end.trim().parse().ok()?;
	Some((start, end))
}
