//! Discovery of instances from the configuration tree.
//!
//! Every directory under the root that holds at least one fragment is an
//! instance. Its key is the directory's path relative to the root with a
//! leading `/`, which is also the log file the instance watches:
//! `root/var/log/auth.log/10-ssh` is fragment `10-ssh` of `/var/log/auth.log`.

use std::collections::{BTreeMap, HashSet};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use overseer::LogSink;
use regex::Regex;

use crate::error::{Error, Result};

pub const ROOT_KEY: &str = "/";

/// Result of one scan: instance key to fragment names in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
	root: PathBuf,
	fragments: BTreeMap<String, Vec<String>>,
}

impl ConfigTree {
	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn keys(&self) -> impl Iterator<Item = &String> {
		self.fragments.keys()
	}

	pub fn contains(&self, key: &str) -> bool {
		self.fragments.contains_key(key)
	}

	pub fn fragments(&self, key: &str) -> Option<&[String]> {
		self.fragments.get(key).map(Vec::as_slice)
	}

	pub fn fragment_paths(&self, key: &str) -> Option<Vec<PathBuf>> {
		let dir = key_dir(&self.root, key);
		self.fragments(key)
			.map(|names| names.iter().map(|name| dir.join(name)).collect())
	}

	pub fn len(&self) -> usize {
		self.fragments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fragments.is_empty()
	}
}

/// Directory holding the fragments of `key`.
pub fn key_dir(root: &Path, key: &str) -> PathBuf {
	root.join(key.trim_start_matches('/'))
}

/// Name of the temporary file the materializer renames over `config_name`.
pub fn temp_name(config_name: &str) -> String {
	format!("{}.tmp", config_name)
}

fn child_key(parent: &str, name: &str) -> String {
	if parent == ROOT_KEY {
		format!("/{}", name)
	} else {
		format!("{}/{}", parent, name)
	}
}

pub struct Scanner<'a> {
	pub config_name: &'a str,
	pub ignore: &'a Regex,
	pub log: &'a dyn LogSink,
}

impl Scanner<'_> {
	/// Walk `root`. Only an unreadable root is an error; unreadable
	/// subdirectories and entries are logged and skipped. A directory reached
	/// twice (through a symlink cycle or a second link) is walked once.
	pub fn scan(&self, root: &Path) -> Result<ConfigTree> {
		let root_error = |source| Error::Root { path: root.to_path_buf(), source };
		let meta = std::fs::metadata(root).map_err(root_error)?;
		let entries = std::fs::read_dir(root).map_err(root_error)?;
		let mut tree = ConfigTree {
			root: root.to_path_buf(),
			fragments: BTreeMap::new(),
		};
		let mut seen = HashSet::from([(meta.dev(), meta.ino())]);
		self.visit(entries, root, ROOT_KEY, &mut tree.fragments, &mut seen);
		Ok(tree)
	}

	fn visit(
		&self,
		entries: std::fs::ReadDir,
		dir: &Path,
		key: &str,
		out: &mut BTreeMap<String, Vec<String>>,
		seen: &mut HashSet<(u64, u64)>,
	) {
		let skip = temp_name(self.config_name);
		for entry in entries {
			let entry = match entry {
				Ok(e) => e,
				Err(e) => {
					self.log.warning(&format!("error listing {}: {}", dir.display(), e));
					continue;
				}
			};
			let path = entry.path();
			let name = match entry.file_name().into_string() {
				Ok(n) => n,
				Err(raw) => {
					self.log.warning(&format!("skipping non UTF-8 name {:?} in {}", raw, dir.display()));
					continue;
				}
			};
			// follows symlinks
			let meta = match std::fs::metadata(&path) {
				Ok(m) => m,
				Err(e) => {
					self.log.warning(&format!("cannot stat {}: {}", path.display(), e));
					continue;
				}
			};

			if meta.is_dir() {
				if self.ignore.is_match(&name) {
					self.log.debug(&format!("ignoring directory {}", path.display()));
					continue;
				}
				if !seen.insert((meta.dev(), meta.ino())) {
					self.log.warning(&format!("skipping {}: directory already scanned", path.display()));
					continue;
				}
				match std::fs::read_dir(&path) {
					Ok(children) => self.visit(children, &path, &child_key(key, &name), out, seen),
					Err(e) => self.log.warning(&format!("cannot read {}: {}", path.display(), e)),
				}
			} else if meta.is_file() {
				if name == self.config_name || name == skip {
					continue;
				}
				out.entry(key.to_string()).or_default().push(name);
			}
		}
	}
}
