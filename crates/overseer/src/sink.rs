use std::fmt;

/// Severity of a message handed to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Debug,
	Notice,
	Warning,
	Crit,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Severity::Debug => "debug",
			Severity::Notice => "notice",
			Severity::Warning => "warning",
			Severity::Crit => "crit",
		})
	}
}

/// Where the engine reports transitions, anomalies and fatal conditions.
///
/// The engine never decides how messages are delivered.
pub trait LogSink: Send + Sync {
	fn log(&self, severity: Severity, message: &str);

	fn debug(&self, message: &str) {
		self.log(Severity::Debug, message);
	}

	fn notice(&self, message: &str) {
		self.log(Severity::Notice, message);
	}

	fn warning(&self, message: &str) {
		self.log(Severity::Warning, message);
	}

	fn crit(&self, message: &str) {
		self.log(Severity::Crit, message);
	}
}

/// Forwards to `tracing`; `notice` becomes `info` and `crit` becomes `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
	fn log(&self, severity: Severity, message: &str) {
		match severity {
			Severity::Debug => tracing::debug!("{}", message),
			Severity::Notice => tracing::info!("{}", message),
			Severity::Warning => tracing::warn!("{}", message),
			Severity::Crit => tracing::error!("{}", message),
		}
	}
}

/// Records every message; used by tests to assert on warnings.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct MemorySink {
	records: std::sync::Mutex<Vec<(Severity, String)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn records(&self) -> Vec<(Severity, String)> {
		self.records.lock().map(|r| r.clone()).unwrap_or_default()
	}

	/// Messages at exactly `severity` that mention `needle`.
	pub fn matching(&self, severity: Severity, needle: &str) -> Vec<String> {
		self.records()
			.into_iter()
			.filter(|(s, m)| *s == severity && m.contains(needle))
			.map(|(_, m)| m)
			.collect()
	}
}

#[cfg(any(test, feature = "test-support"))]
impl LogSink for MemorySink {
	fn log(&self, severity: Severity, message: &str) {
		if let Ok(mut records) = self.records.lock() {
			records.push((severity, message.to_string()));
		}
	}
}
