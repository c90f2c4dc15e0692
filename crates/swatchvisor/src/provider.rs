use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use overseer::{InstanceProvider, LogSink, Mode};
use regex::Regex;

use crate::command::{self, Invocation};
use crate::error::{Error, Result};
use crate::materialize::{self, Materializer};
use crate::pidname;
use crate::settings::Settings;
use crate::tree::{ConfigTree, Scanner};

/// Swatch instances: one swatchdog daemon per log file found in the tree.
pub struct SwatchProvider {
	settings: Settings,
	pid_dir: PathBuf,
	ignore: Regex,
	log: Arc<dyn LogSink>,
}

impl SwatchProvider {
	pub fn new(settings: Settings, log: Arc<dyn LogSink>) -> Result<Self> {
		let ignore = Regex::new(&settings.tree.ignore).map_err(|source| Error::Pattern {
			pattern: settings.tree.ignore.clone(),
			source,
		})?;
		let pid_dir = settings.pid_dir();
		if let Err(e) = std::fs::create_dir_all(&pid_dir) {
			log.warning(&format!("cannot create pidfile directory {}: {}", pid_dir.display(), e));
		}
		Ok(Self { settings, pid_dir, ignore, log })
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn config_path(&self, key: &str) -> PathBuf {
		materialize::config_path(&self.settings.tree.root, key, &self.settings.tree.config_name)
	}

	/// Pidfile names shared by more than one discovered key.
	pub fn collisions(&self, tree: &ConfigTree) -> BTreeMap<String, Vec<String>> {
		let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
		for key in tree.keys() {
			by_name
				.entry(pidname::pidfile_name(&self.settings.supervisor.pid_prefix, key))
				.or_default()
				.push(key.clone());
		}
		by_name.retain(|_, keys| keys.len() > 1);
		by_name
	}
}

impl InstanceProvider for SwatchProvider {
	type Snapshot = ConfigTree;
	type Error = Error;

	fn scan(&self) -> Result<ConfigTree> {
		let scanner = Scanner {
			config_name: &self.settings.tree.config_name,
			ignore: &self.ignore,
			log: self.log.as_ref(),
		};
		let tree = scanner.scan(&self.settings.tree.root)?;
		self.log.debug(&format!(
			"scanned {}: {} instance(s)",
			tree.root().display(),
			tree.len()
		));
		Ok(tree)
	}

	fn discover(&self, tree: &ConfigTree) -> Vec<String> {
		for (name, keys) in self.collisions(tree) {
			self.log.warning(&format!("{} keys share pidfile {}: {}", keys.len(), name, keys.join(", ")));
		}
		tree.keys().cloned().collect()
	}

	fn pidfile_path(&self, key: &str) -> PathBuf {
		self.pid_dir.join(pidname::pidfile_name(&self.settings.supervisor.pid_prefix, key))
	}

	fn command(&self, key: &str, mode: Mode) -> Vec<String> {
		let config_path = self.config_path(key);
		let pidfile = self.pidfile_path(key);
		let inv = Invocation {
			key,
			config_path: &config_path,
			pidfile: &pidfile,
		};
		command::build(&self.settings.swatch, &inv, mode)
	}

	fn config_modified(&self, key: &str) -> Option<SystemTime> {
		std::fs::metadata(self.config_path(key))
			.and_then(|m| m.modified())
			.ok()
	}

	/// swatchdog has no in-place reload.
	fn is_hup_capable(&self, _key: &str) -> bool {
		false
	}

	fn materialize(&self, tree: &ConfigTree, keys: &[String]) -> BTreeSet<String> {
		let materializer = Materializer {
			config_name: &self.settings.tree.config_name,
			log: self.log.as_ref(),
		};
		materializer.update(tree, keys)
	}

	fn extraneous(&self, tree: &ConfigTree) -> Vec<String> {
		let prefix = &self.settings.supervisor.pid_prefix;
		let valid: BTreeSet<String> = tree
			.keys()
			.map(|key| pidname::pidfile_name(prefix, key))
			.collect();

		let entries = match std::fs::read_dir(&self.pid_dir) {
			Ok(entries) => entries,
			Err(e) => {
				if e.kind() != std::io::ErrorKind::NotFound {
					self.log.warning(&format!("cannot list {}: {}", self.pid_dir.display(), e));
				}
				return Vec::new();
			}
		};

		let mut extra: Vec<String> = entries
			.flatten()
			.filter_map(|entry| entry.file_name().into_string().ok())
			.filter(|name| !valid.contains(name))
			.filter_map(|name| pidname::key_from_pidfile_name(prefix, &name))
			.collect();
		extra.sort();
		extra
	}
}
