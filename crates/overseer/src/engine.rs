use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::probe;
use crate::sink::LogSink;
use crate::types::*;

/// The capability set the engine needs from a concrete kind of instance.
///
/// `scan` is called once at the top of every operation and its result is
/// passed back into `discover`, `materialize` and `extraneous`, so a provider
/// never has to cache what it saw on disk.
pub trait InstanceProvider {
	type Snapshot;
	type Error: std::error::Error;

	fn scan(&self) -> Result<Self::Snapshot, Self::Error>;

	/// Every instance key the snapshot declares.
	fn discover(&self, snapshot: &Self::Snapshot) -> Vec<String>;

	fn pidfile_path(&self, key: &str) -> PathBuf;

	/// Program followed by its arguments.
	fn command(&self, key: &str, mode: Mode) -> Vec<String>;

	/// Modification time of the configuration the daemon should be running with.
	fn config_modified(&self, key: &str) -> Option<SystemTime>;

	/// Whether the daemon picks up new configuration on SIGHUP.
	fn is_hup_capable(&self, _key: &str) -> bool {
		false
	}

	/// Regenerate configuration for `keys`, returning the ones that changed.
	fn materialize(&self, snapshot: &Self::Snapshot, keys: &[String]) -> BTreeSet<String>;

	/// Keys that still have a pidfile but are no longer declared.
	fn extraneous(&self, snapshot: &Self::Snapshot) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	pub wait_timeout: Duration,
	pub wait_interval: Duration,
	/// Reload running instances whose configuration changed or is newer than their pidfile.
	pub timely_reload: bool,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			wait_timeout: Duration::from_secs(10),
			wait_interval: Duration::from_millis(250),
			timely_reload: true,
		}
	}
}

pub struct Supervisor<P> {
	provider: P,
	config: SupervisorConfig,
	log: Arc<dyn LogSink>,
}

impl<P: InstanceProvider> Supervisor<P> {
	pub fn new(provider: P, config: SupervisorConfig, log: Arc<dyn LogSink>) -> Self {
		Self { provider, config, log }
	}

	pub fn provider(&self) -> &P {
		&self.provider
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	pub fn status(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		Ok(to_status_map(self.probe_all(&targets)))
	}

	pub fn start(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		self.provider.materialize(&snapshot, &targets);
		Ok(to_status_map(self.start_keys(&targets)))
	}

	pub fn stop(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		Ok(to_status_map(self.stop_keys(&targets)))
	}

	/// Stop, then start individually only what actually went down.
	pub fn restart(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		self.provider.materialize(&snapshot, &targets);

		let mut result = StatusMap::new();
		let mut down = Vec::new();
		for (key, state) in self.stop_keys(&targets) {
			if state.is_running() {
				self.log.warning(&format!("{}: failed to stop, not restarted", key));
				result.insert(key, NOT_RESTARTED.to_string());
			} else {
				down.push(key);
			}
		}
		for key in &down {
			result.extend(to_status_map(self.start_keys(std::slice::from_ref(key))));
		}
		Ok(result)
	}

	pub fn reload(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		self.provider.materialize(&snapshot, &targets);
		Ok(self.reload_keys(&targets))
	}

	/// Bring the targets in line with the declared configuration doing as
	/// little as possible. Without an explicit filter, instances that are no
	/// longer declared are stopped too.
	pub fn ensure(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		let changed = self.provider.materialize(&snapshot, &targets);
		let current = self.probe_all(&targets);

		let to_start: Vec<String> = current
			.iter()
			.filter(|(_, state)| !state.is_running())
			.map(|(key, _)| key.clone())
			.collect();

		let mut to_reload = Vec::new();
		if self.config.timely_reload {
			for key in &targets {
				if to_start.contains(key) {
					continue;
				}
				if changed.contains(key) {
					self.log.debug(&format!("{}: configuration changed", key));
					to_reload.push(key.clone());
				} else if self.config_is_stale(key) {
					self.log.debug(&format!("{}: configuration newer than pidfile", key));
					to_reload.push(key.clone());
				}
			}
		}

		let mut result = to_status_map(current);
		if !to_start.is_empty() {
			result.extend(to_status_map(self.start_keys(&to_start)));
		}
		if !to_reload.is_empty() {
			result.extend(self.reload_keys(&to_reload));
		}

		if instances.is_none() {
			let extra = self.provider.extraneous(&snapshot);
			if !extra.is_empty() {
				self.log.notice(&format!("stopping {} unconfigured instance(s)", extra.len()));
				for (key, state) in self.stop_keys(&extra) {
					result.insert(key, format!("{} ({})", state, UNCONFIGURED));
				}
			}
		}

		Ok(result)
	}

	/// Run the one-shot examine command for every target and record how it exited.
	pub fn examine(&self, instances: Option<&[String]>) -> Result<StatusMap, P::Error> {
		let snapshot = self.provider.scan()?;
		let targets = self.targets(&snapshot, instances);
		self.provider.materialize(&snapshot, &targets);

		let mut result = StatusMap::new();
		for key in targets {
			let outcome = self.run_examine(&key);
			if outcome == "ok" {
				self.log.notice(&format!("{}: examined", key));
			} else {
				self.log.warning(&format!("{}: examine {}", key, outcome));
			}
			result.insert(key, outcome);
		}
		Ok(result)
	}

	/// Instances whose pidfile outlived their configuration.
	pub fn to_stop(&self) -> Result<Vec<String>, P::Error> {
		let snapshot = self.provider.scan()?;
		Ok(self.provider.extraneous(&snapshot))
	}

	fn targets(&self, snapshot: &P::Snapshot, instances: Option<&[String]>) -> Vec<String> {
		match instances {
			Some(list) => {
				let mut seen = BTreeSet::new();
				list.iter().filter(|k| seen.insert(k.as_str())).cloned().collect()
			}
			None => self.provider.discover(snapshot),
		}
	}

	fn probe_all(&self, keys: &[String]) -> BTreeMap<String, State> {
		keys.iter()
			.map(|key| (key.clone(), probe::status(&self.provider.pidfile_path(key))))
			.collect()
	}

	fn start_keys(&self, keys: &[String]) -> BTreeMap<String, State> {
		let mut result = BTreeMap::new();
		let mut spawned = Vec::new();

		for key in keys {
			let pidfile = self.provider.pidfile_path(key);
			if probe::status(&pidfile).is_running() {
				self.log.notice(&format!("{}: already running", key));
				result.insert(key.clone(), State::Running);
				continue;
			}
			self.remove_stale(key, &pidfile);
			match self.spawn_daemon(key) {
				Ok(pid) => {
					self.log.debug(&format!("{}: spawned (pid {})", key, pid));
					spawned.push(key.clone());
				}
				Err(e) => {
					self.log.warning(&format!("{}: failed to spawn: {}", key, e));
					result.insert(key.clone(), State::Stopped);
				}
			}
		}

		for (key, state) in self.wait_for(&spawned, State::Running) {
			if state.is_running() {
				self.log.notice(&format!("{}: started", key));
			} else {
				self.log.warning(&format!(
					"{}: not running after {:?}",
					key, self.config.wait_timeout
				));
			}
			result.insert(key, state);
		}
		result
	}

	fn stop_keys(&self, keys: &[String]) -> BTreeMap<String, State> {
		let mut result = BTreeMap::new();
		let mut signalled = Vec::new();

		for key in keys {
			let pidfile = self.provider.pidfile_path(key);
			match probe::read_pid(&pidfile) {
				None => {
					self.log.warning(&format!(
						"{}: no usable pidfile at {}, treating as stopped",
						key,
						pidfile.display()
					));
					result.insert(key.clone(), State::Stopped);
				}
				Some(pid) => {
					if probe::signal_pid(pid, SignalKind::Terminate) {
						self.log.debug(&format!("{}: sent SIGTERM to pid {}", key, pid));
					} else {
						self.log.warning(&format!("{}: failed to signal pid {}", key, pid));
					}
					signalled.push(key.clone());
				}
			}
		}

		for (key, state) in self.wait_for(&signalled, State::Stopped) {
			if state.is_running() {
				self.log.warning(&format!(
					"{}: still running after {:?}",
					key, self.config.wait_timeout
				));
			} else {
				self.log.notice(&format!("{}: stopped", key));
			}
			result.insert(key, state);
		}
		result
	}

	/// SIGHUP where the daemon supports it, otherwise stop and start one at a time.
	fn reload_keys(&self, keys: &[String]) -> StatusMap {
		let mut result = StatusMap::new();
		let (hup, cycle): (Vec<&String>, Vec<&String>) =
			keys.iter().partition(|key| self.provider.is_hup_capable(key));

		for key in hup {
			let pidfile = self.provider.pidfile_path(key);
			if probe::signal(&pidfile, SignalKind::HangUp) {
				self.log.notice(&format!("{}: reloaded", key));
			} else {
				self.log.warning(&format!("{}: failed to deliver SIGHUP", key));
			}
			result.insert(key.clone(), probe::status(&pidfile).to_string());
		}

		for key in cycle {
			let single = std::slice::from_ref(key);
			let stopped = self.stop_keys(single);
			if stopped.get(key).is_some_and(State::is_running) {
				self.log.warning(&format!("{}: failed to stop, not reloaded", key));
				result.insert(key.clone(), NOT_RESTARTED.to_string());
				continue;
			}
			let state = self
				.start_keys(single)
				.remove(key)
				.unwrap_or(State::Stopped);
			if !state.is_running() {
				self.log.warning(&format!("{}: stopped for reload but did not come back", key));
			}
			result.insert(key.clone(), state.to_string());
		}
		result
	}

	/// Poll until every key is in `want` or the timeout passes. A timeout
	/// too large to represent as an instant never expires.
	fn wait_for(&self, keys: &[String], want: State) -> BTreeMap<String, State> {
		let deadline = Instant::now().checked_add(self.config.wait_timeout);
		loop {
			let states = self.probe_all(keys);
			if states.values().all(|s| *s == want) {
				return states;
			}
			let pause = match deadline {
				Some(deadline) => {
					let now = Instant::now();
					if now >= deadline {
						return states;
					}
					self.config.wait_interval.min(deadline - now)
				}
				None => self.config.wait_interval,
			};
			std::thread::sleep(pause);
		}
	}

	fn remove_stale(&self, key: &str, pidfile: &Path) {
		match std::fs::remove_file(pidfile) {
			Ok(()) => self.log.debug(&format!("{}: removed stale pidfile {}", key, pidfile.display())),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => self.log.warning(&format!(
				"{}: cannot remove stale pidfile {}: {}",
				key,
				pidfile.display(),
				e
			)),
		}
	}

	fn spawn_daemon(&self, key: &str) -> io::Result<u32> {
		let argv = self.provider.command(key, Mode::Daemon);
		let (program, args) = argv
			.split_first()
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

		let mut child = Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.process_group(0)
			.spawn()?;
		let pid = child.id();
		// The daemon forks away; reap the direct child so it never lingers as a zombie.
		std::thread::spawn(move || {
			let _ = child.wait();
		});
		Ok(pid)
	}

	fn run_examine(&self, key: &str) -> String {
		let argv = self.provider.command(key, Mode::Examine);
		let Some((program, args)) = argv.split_first() else {
			return "failed (spawn: empty command line)".to_string();
		};
		match Command::new(program).args(args).stdin(Stdio::null()).status() {
			Ok(status) if status.success() => "ok".to_string(),
			Ok(status) => match status.code() {
				Some(code) => format!("failed (exit {})", code),
				None => "failed (signal)".to_string(),
			},
			Err(e) => format!("failed (spawn: {})", e),
		}
	}

	fn config_is_stale(&self, key: &str) -> bool {
		let pid_modified = std::fs::metadata(self.provider.pidfile_path(key))
			.and_then(|m| m.modified())
			.ok();
		match (self.provider.config_modified(key), pid_modified) {
			(Some(config), Some(pid)) => config > pid,
			_ => false,
		}
	}
}

fn to_status_map(states: BTreeMap<String, State>) -> StatusMap {
	states
		.into_iter()
		.map(|(key, state)| (key, state.to_string()))
		.collect()
}
