//! Regenerates each instance's consolidated configuration from its fragments.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use overseer::LogSink;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::tree::{key_dir, temp_name, ConfigTree};

pub fn digest(bytes: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	hex::encode(hasher.finalize())
}

pub fn config_path(root: &Path, key: &str, config_name: &str) -> PathBuf {
	key_dir(root, key).join(config_name)
}

pub struct Materializer<'a> {
	pub config_name: &'a str,
	pub log: &'a dyn LogSink,
}

impl Materializer<'_> {
	/// Rewrite the configuration of every key whose fragments no longer match
	/// it. Returns the keys that were rewritten; failures are logged and
	/// leave the key out.
	pub fn update(&self, tree: &ConfigTree, keys: &[String]) -> BTreeSet<String> {
		let mut changed = BTreeSet::new();
		for key in keys {
			match self.update_one(tree, key) {
				Ok(true) => {
					self.log.notice(&format!("{}: configuration updated", key));
					changed.insert(key.clone());
				}
				Ok(false) => {}
				Err(e) => self.log.warning(&format!("{}: configuration not updated: {}", key, e)),
			}
		}
		changed
	}

	fn update_one(&self, tree: &ConfigTree, key: &str) -> Result<bool> {
		let Some(fragments) = tree.fragment_paths(key) else {
			self.log.warning(&format!("{}: not in configuration tree", key));
			return Ok(false);
		};

		let mut content = Vec::new();
		for path in &fragments {
			let bytes = fs::read(path).map_err(|source| Error::Read { path: path.clone(), source })?;
			content.extend_from_slice(&bytes);
		}

		let target = config_path(tree.root(), key, self.config_name);
		let current = match fs::read(&target) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
			Err(e) => {
				self.log.debug(&format!("{}: cannot read {}: {}", key, target.display(), e));
				Vec::new()
			}
		};

		if digest(&current) == digest(&content) {
			return Ok(false);
		}
		write_atomic(&target, &temp_name(self.config_name), &content)?;
		Ok(true)
	}
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
fn write_atomic(path: &Path, temp_name: &str, contents: &[u8]) -> Result<()> {
	let tmp_path = path.with_file_name(temp_name);
	fs::write(&tmp_path, contents).map_err(|source| Error::Write { path: tmp_path.clone(), source })?;
	fs::rename(&tmp_path, path).map_err(|source| {
		let _ = fs::remove_file(&tmp_path);
		Error::Write { path: path.to_path_buf(), source }
	})
}
