//! Command lines for swatchdog.
//!
//! In daemon mode a configuration with a single `watchfor` whose regex
//! starts with a long literal gets its log stream pre-filtered by
//! `grep -F`, which is far cheaper than swatchdog's own matching.

use std::path::Path;
use std::sync::LazyLock;

use overseer::Mode;
use regex::Regex;

use crate::settings::SwatchConfig;

static WATCHFOR_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?mi)^[ \t]*watchfor[ \t]*=?[ \t]*/(.*)/([a-z]*)[ \t]*$").expect("watchfor regex")
});

/// A fixed string every line matched by the configuration must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefilter {
	pub literal: String,
	pub ignore_case: bool,
}

/// One `watchfor` declaration: the regex body and its trailing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPattern<'a> {
	pub regex: &'a str,
	pub flags: &'a str,
}

/// Everything needed to build one instance's command line.
pub struct Invocation<'a> {
	pub key: &'a str,
	pub config_path: &'a Path,
	pub pidfile: &'a Path,
}

pub fn build(swatch: &SwatchConfig, inv: &Invocation<'_>, mode: Mode) -> Vec<String> {
	let mut argv = vec![swatch.bin.clone()];
	match mode {
		Mode::Daemon => {
			argv.push("--daemon".into());
			argv.push(format!("--config-file={}", inv.config_path.display()));
			argv.push(format!("--pid-file={}", inv.pidfile.display()));
			match daemon_prefilter(swatch, inv.config_path) {
				Some(filter) => argv.push(format!(
					"--read-pipe={} -n 0 -F {} | {} --line-buffered{} -F {}",
					swatch.tail,
					shell_quote(inv.key),
					swatch.grep,
					if filter.ignore_case { " -i" } else { "" },
					shell_quote(&filter.literal)
				)),
				None => {
					argv.push(format!("--tail-file={}", inv.key));
					if !swatch.tail_args.is_empty() {
						argv.push(format!("--tail-args={}", swatch.tail_args));
					}
				}
			}
		}
		Mode::Examine => {
			argv.push(format!("--config-file={}", inv.config_path.display()));
			argv.push(format!("--examine={}", inv.key));
		}
	}
	argv
}

fn daemon_prefilter(swatch: &SwatchConfig, config_path: &Path) -> Option<Prefilter> {
	if swatch.substring_threshold == 0 {
		return None;
	}
	let config = std::fs::read_to_string(config_path).ok()?;
	prefilter(&config, swatch.substring_threshold)
}

/// Every `watchfor` declaration in a swatchdog configuration.
pub fn watch_patterns(config: &str) -> Vec<WatchPattern<'_>> {
	WATCHFOR_RE
		.captures_iter(config)
		.filter_map(|c| {
			Some(WatchPattern {
				regex: c.get(1)?.as_str(),
				flags: c.get(2).map_or("", |m| m.as_str()),
			})
		})
		.collect()
}

/// The run of `[A-Za-z0-9_]` a pattern starts with.
pub fn literal_prefix(pattern: &str) -> &str {
	let end = pattern
		.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
		.unwrap_or(pattern.len());
	&pattern[..end]
}

/// The literal prefix, if every match of `pattern` must contain it.
///
/// A quantifier right after the run makes its last character optional and a
/// top-level `|` offers matches without it; neither yields a literal.
pub fn required_prefix(pattern: &str) -> Option<&str> {
	let literal = literal_prefix(pattern);
	if literal.is_empty() || has_top_level_alternation(pattern) {
		return None;
	}
	match pattern[literal.len()..].chars().next() {
		Some('?' | '*' | '{') => None,
		_ => Some(literal),
	}
}

fn has_top_level_alternation(pattern: &str) -> bool {
	let mut depth = 0usize;
	let mut in_class = false;
	let mut chars = pattern.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => {
				chars.next();
			}
			']' if in_class => in_class = false,
			_ if in_class => {}
			'[' => in_class = true,
			'(' => depth += 1,
			')' => depth = depth.saturating_sub(1),
			'|' if depth == 0 => return true,
			_ => {}
		}
	}
	false
}

/// Literal to pre-filter on: only with exactly one `watchfor` whose required
/// literal prefix is longer than `threshold`. An `i` flag carries over to grep.
pub fn prefilter(config: &str, threshold: usize) -> Option<Prefilter> {
	if threshold == 0 {
		return None;
	}
	match watch_patterns(config).as_slice() {
		[only] => {
			let literal = required_prefix(only.regex)?;
			(literal.len() > threshold).then(|| Prefilter {
				literal: literal.to_string(),
				ignore_case: only.flags.contains('i'),
			})
		}
		_ => None,
	}
}

pub fn shell_quote(word: &str) -> String {
	if !word.is_empty()
		&& word
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
	{
		return word.to_string();
	}
	format!("'{}'", word.replace('\'', r"'\''"))
}
