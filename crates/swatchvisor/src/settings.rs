use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ── Settings file (~/.config/swatchvisor/config.toml) ───────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
	#[serde(default)]
	pub tree: TreeConfig,
	#[serde(default)]
	pub swatch: SwatchConfig,
	#[serde(default)]
	pub supervisor: SupervisorSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeConfig {
	#[serde(default = "default_root")]
	pub root: PathBuf,
	/// Name of the generated file in each instance directory. Never a fragment.
	#[serde(default = "default_config_name")]
	pub config_name: String,
	/// Directories whose name matches are skipped, recursively.
	#[serde(default = "default_ignore")]
	pub ignore: String,
}

impl Default for TreeConfig {
	fn default() -> Self {
		Self { root: default_root(), config_name: default_config_name(), ignore: default_ignore() }
	}
}

fn default_root() -> PathBuf { PathBuf::from("/etc/swatchvisor") }
fn default_config_name() -> String { ".swatchrc".into() }
fn default_ignore() -> String { r"^(\.git|\.svn|\.hg|\.bzr|CVS|RCS|_darcs)$".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct SwatchConfig {
	#[serde(default = "default_bin")]
	pub bin: String,
	#[serde(default = "default_tail")]
	pub tail: String,
	#[serde(default = "default_grep")]
	pub grep: String,
	/// Passed through as `--tail-args` when non-empty.
	#[serde(default)]
	pub tail_args: String,
	/// Minimum leading-literal length that turns on the grep pre-filter; 0 disables it.
	#[serde(default)]
	pub substring_threshold: usize,
}

impl Default for SwatchConfig {
	fn default() -> Self {
		Self {
			bin: default_bin(),
			tail: default_tail(),
			grep: default_grep(),
			tail_args: String::new(),
			substring_threshold: 0,
		}
	}
}

fn default_bin() -> String { "/usr/bin/swatchdog".into() }
fn default_tail() -> String { "/usr/bin/tail".into() }
fn default_grep() -> String { "/bin/grep".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
	pub pid_dir: Option<PathBuf>,
	#[serde(default = "default_pid_prefix")]
	pub pid_prefix: String,
	#[serde(default = "default_wait_timeout")]
	pub wait_timeout_secs: u64,
	#[serde(default = "default_wait_interval")]
	pub wait_interval_ms: u64,
	#[serde(default = "default_true")]
	pub timely_reload: bool,
}

impl Default for SupervisorSettings {
	fn default() -> Self {
		Self {
			pid_dir: None,
			pid_prefix: default_pid_prefix(),
			wait_timeout_secs: default_wait_timeout(),
			wait_interval_ms: default_wait_interval(),
			timely_reload: true,
		}
	}
}

fn default_pid_prefix() -> String { "swatch".into() }
fn default_wait_timeout() -> u64 { 10 }
fn default_wait_interval() -> u64 { 250 }
fn default_true() -> bool { true }

impl Settings {
	/// Read settings from `path`. A missing file means defaults; anything
	/// unreadable or malformed is an error.
	pub fn load(path: &Path) -> Result<Settings> {
		match std::fs::read_to_string(path) {
			Ok(content) => toml::from_str(&content).map_err(|source| Error::Parse {
				path: path.to_path_buf(),
				source,
			}),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
			Err(source) => Err(Error::Read { path: path.to_path_buf(), source }),
		}
	}

	pub fn pid_dir(&self) -> PathBuf {
		self.supervisor
			.pid_dir
			.clone()
			.unwrap_or_else(crate::paths::pid_dir)
	}

	pub fn engine_config(&self) -> overseer::SupervisorConfig {
		overseer::SupervisorConfig {
			wait_timeout: Duration::from_secs(self.supervisor.wait_timeout_secs),
			wait_interval: Duration::from_millis(self.supervisor.wait_interval_ms.max(1)),
			timely_reload: self.supervisor.timely_reload,
		}
	}
}
