//! Pidfile names for instance keys, and back.
//!
//! The forward transform collapses every run of characters outside
//! `[A-Za-z0-9]` into one `_`, so it is not injective: `/var/log/a-b` and
//! `/var/log/a/b` share `swatch_var_log_a_b.pid`. The inverse therefore
//! recovers a key in which every `_` stands for `/`. Existing pidfiles keep
//! being interpreted the same way.

const SUFFIX: &str = ".pid";

fn flatten(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	let mut in_run = false;
	for c in key.chars() {
		if c.is_ascii_alphanumeric() {
			out.push(c);
			in_run = false;
		} else if !in_run {
			out.push('_');
			in_run = true;
		}
	}
	out
}

pub fn pidfile_name(prefix: &str, key: &str) -> String {
	format!("{}{}{}", prefix, flatten(key), SUFFIX)
}

/// Recover the instance key a pidfile was named after.
///
/// Only names the forward transform could have produced for a rooted key
/// are accepted; anything else in the pidfile directory is not ours.
pub fn key_from_pidfile_name(prefix: &str, name: &str) -> Option<String> {
	let middle = name.strip_prefix(prefix)?.strip_suffix(SUFFIX)?;
	if !middle.starts_with('_') {
		return None;
	}
	let key = middle.replace('_', "/");
	(flatten(&key) == middle).then_some(key)
}
