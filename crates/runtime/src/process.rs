//! Process liveness checks and interrupt delivery for bridge subprocesses.

use std::path::PathBuf;

use tracing::debug;

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	#[cfg(unix)]
	{
		if pid == 0 {
			return false;
		}

		if PathBuf::from("/proc").join(pid.to_string()).exists() {
			return true;
		}

		std::process::Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(not(unix))]
	{
		pid == std::process::id()
	}
}

/// Sends SIGINT to `pid` without waiting for the process to exit.
///
/// The bridge terminates gracefully on interrupt; its exit is observed by
/// the supervisor's watcher, never by this call.
pub fn interrupt_pid(pid: u32) -> std::io::Result<()> {
	#[cfg(unix)]
	{
		debug!(target = "robolink.process", pid, "sending SIGINT");
		let status = std::process::Command::new("kill").args(["-INT", &pid.to_string()]).status()?;
		if status.success() {
			Ok(())
		} else {
			Err(std::io::Error::other(format!("kill -INT {pid} exited with {status}")))
		}
	}

	#[cfg(not(unix))]
	{
		let _ = pid;
		Err(std::io::Error::other("interrupt signalling requires a unix platform"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[cfg(unix)]
	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[cfg(unix)]
	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[cfg(unix)]
	#[test]
	fn interrupt_terminates_a_sleeping_child() {
		let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
		interrupt_pid(child.id()).unwrap();
		let status = child.wait().unwrap();
		assert!(!status.success());
	}

	#[cfg(unix)]
	#[test]
	fn interrupt_on_missing_pid_reports_an_error() {
		// Near the top of the default pid range; extremely unlikely to exist.
		assert!(interrupt_pid(4_194_000).is_err());
	}
}
