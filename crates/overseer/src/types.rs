use std::collections::BTreeMap;
use std::fmt;

/// Instance key to human-readable status. Every engine operation returns one.
pub type StatusMap = BTreeMap<String, String>;

/// The two states the engine can observe through a pidfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Running,
	Stopped,
}

impl State {
	pub fn is_running(&self) -> bool {
		matches!(self, State::Running)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			State::Running => "running",
			State::Stopped => "stopped",
		}
	}
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How an instance's command line is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// Long-lived, detaches and maintains its own pidfile.
	Daemon,
	/// One-shot pass over the resource; the exit code is the result.
	Examine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
	Probe,
	Terminate,
	HangUp,
}

pub const NOT_RESTARTED: &str = "not restarted";
pub const UNCONFIGURED: &str = "unconfigured";
