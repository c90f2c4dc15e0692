//! Pidfile reading and signal delivery.
//!
//! Liveness is judged by `kill(pid, 0)` alone. A pid recycled by an unrelated
//! process after an unclean exit reads as running.

use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::types::{SignalKind, State};

/// Read the pid stored in `pidfile`: its whole trimmed content as a decimal.
///
/// Zero and negative values are rejected since `kill` would address a
/// process group with them.
pub fn read_pid(pidfile: &Path) -> Option<i32> {
	std::fs::read_to_string(pidfile)
		.ok()
		.and_then(|s| s.trim().parse::<i32>().ok())
		.filter(|pid| *pid > 0)
}

pub fn status(pidfile: &Path) -> State {
	if signal(pidfile, SignalKind::Probe) {
		State::Running
	} else {
		State::Stopped
	}
}

/// Send `kind` to the process named by `pidfile`. False when there is no
/// usable pid or delivery failed.
pub fn signal(pidfile: &Path, kind: SignalKind) -> bool {
	match read_pid(pidfile) {
		Some(pid) => signal_pid(pid, kind),
		None => false,
	}
}

pub fn signal_pid(pid: i32, kind: SignalKind) -> bool {
	let sig = match kind {
		SignalKind::Probe => None,
		SignalKind::Terminate => Some(Signal::SIGTERM),
		SignalKind::HangUp => Some(Signal::SIGHUP),
	};
	kill(Pid::from_raw(pid), sig).is_ok()
}
