use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to read {}: {}", .path.display(), .source)]
	Read { path: PathBuf, source: io::Error },

	#[error("failed to write {}: {}", .path.display(), .source)]
	Write { path: PathBuf, source: io::Error },

	#[error("failed to parse {}: {}", .path.display(), .source)]
	Parse { path: PathBuf, source: toml::de::Error },

	#[error("invalid ignore pattern {:?}: {}", .pattern, .source)]
	Pattern { pattern: String, source: regex::Error },

	#[error("cannot scan configuration root {}: {}", .path.display(), .source)]
	Root { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
