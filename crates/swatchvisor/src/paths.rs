//! Default locations under the XDG base directories.

use std::ffi::OsString;
use std::path::PathBuf;

const APP: &str = env!("CARGO_PKG_NAME");

/// `$XDG_CONFIG_HOME/swatchvisor/config.toml`
pub fn settings_path() -> PathBuf {
	xdg_base("XDG_CONFIG_HOME", ".config").join(APP).join("config.toml")
}

/// `$XDG_STATE_HOME/swatchvisor/run`
pub fn pid_dir() -> PathBuf {
	xdg_base("XDG_STATE_HOME", ".local/state").join(APP).join("run")
}

fn xdg_base(var: &str, under_home: &str) -> PathBuf {
	resolve_base(std::env::var_os(var), std::env::var_os("HOME"), under_home)
}

fn resolve_base(explicit: Option<OsString>, home: Option<OsString>, under_home: &str) -> PathBuf {
	match (explicit, home) {
		(Some(dir), _) if !dir.is_empty() => PathBuf::from(dir),
		(_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(under_home),
		_ => std::env::temp_dir(),
	}
}
