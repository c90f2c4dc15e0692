use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use overseer::{probe, InstanceProvider, MemorySink, Mode, Severity, Supervisor};
use regex::Regex;
use swatchvisor::materialize::{self, Materializer};
use swatchvisor::pidname;
use swatchvisor::settings::Settings;
use swatchvisor::tree::{Scanner, ROOT_KEY};
use swatchvisor::SwatchProvider;

/// Stands in for swatchdog: writes its pid where told, then idles.
const FAKE_SWATCH: &str = r#"#!/bin/sh
pidfile=
for arg in "$@"; do
	case "$arg" in
		--pid-file=*) pidfile="${arg#--pid-file=}" ;;
		--examine=*) exit 0 ;;
	esac
done
echo $$ > "$pidfile"
exec sleep 30
"#;

struct Fixture {
	dir: tempfile::TempDir,
	sink: Arc<MemorySink>,
}

impl Fixture {
	fn new() -> Self {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir_all(dir.path().join("tree")).unwrap();
		fs::create_dir_all(dir.path().join("run")).unwrap();
		let swatch = dir.path().join("swatchdog");
		fs::write(&swatch, FAKE_SWATCH).unwrap();
		fs::set_permissions(&swatch, fs::Permissions::from_mode(0o755)).unwrap();
		Self { dir, sink: Arc::new(MemorySink::new()) }
	}

	fn root(&self) -> PathBuf {
		self.dir.path().join("tree")
	}

	fn pid_dir(&self) -> PathBuf {
		self.dir.path().join("run")
	}

	fn fragment(&self, key: &str, name: &str, content: &str) -> PathBuf {
		let dir = self.root().join(key.trim_start_matches('/'));
		fs::create_dir_all(&dir).unwrap();
		let path = dir.join(name);
		fs::write(&path, content).unwrap();
		path
	}

	fn settings(&self) -> Settings {
		let mut settings = Settings::default();
		settings.tree.root = self.root();
		settings.swatch.bin = self.dir.path().join("swatchdog").display().to_string();
		settings.supervisor.pid_dir = Some(self.pid_dir());
		settings.supervisor.wait_timeout_secs = 5;
		settings.supervisor.wait_interval_ms = 20;
		settings
	}

	fn provider(&self, settings: Settings) -> SwatchProvider {
		SwatchProvider::new(settings, self.sink.clone()).unwrap()
	}

	fn supervisor(&self) -> Supervisor<SwatchProvider> {
		let settings = self.settings();
		let config = settings.engine_config();
		Supervisor::new(self.provider(settings), config, self.sink.clone())
	}

	fn scanner_tree(&self) -> swatchvisor::ConfigTree {
		let ignore = Regex::new(&Settings::default().tree.ignore).unwrap();
		Scanner {
			config_name: ".swatchrc",
			ignore: &ignore,
			log: self.sink.as_ref(),
		}
		.scan(&self.root())
		.unwrap()
	}
}

impl Drop for Fixture {
	fn drop(&mut self) {
		for entry in fs::read_dir(self.pid_dir()).into_iter().flatten().flatten() {
			if let Some(pid) = probe::read_pid(&entry.path()) {
				let _ = nix::sys::signal::kill(
					nix::unistd::Pid::from_raw(pid),
					nix::sys::signal::Signal::SIGKILL,
				);
			}
		}
	}
}

fn read(path: &Path) -> String {
	fs::read_to_string(path).unwrap()
}

// --- scanner ---

#[test]
fn scan_groups_fragments_by_directory() {
	let fx = Fixture::new();
	fx.fragment("/var/log/auth.log", "10-ssh", "watchfor /sshd/\n");
	fx.fragment("/var/log/auth.log", "20-sudo", "watchfor /sudo/\n");
	fx.fragment("/var/log/nginx/error.log", "upstream", "watchfor /upstream/\n");
	fx.fragment("/var/log/auth.log", ".swatchrc", "stale output\n");
	fx.fragment("/var/log/auth.log/.git", "HEAD", "ref\n");
	fs::create_dir_all(fx.root().join("var/log/empty")).unwrap();

	let tree = fx.scanner_tree();
	let keys: Vec<&String> = tree.keys().collect();
	assert_eq!(keys, vec!["/var/log/auth.log", "/var/log/nginx/error.log"]);

	let mut auth = tree.fragments("/var/log/auth.log").unwrap().to_vec();
	auth.sort();
	assert_eq!(auth, vec!["10-ssh", "20-sudo"]);
	assert_eq!(tree.fragments("/var/log/nginx/error.log").unwrap(), ["upstream"]);
	assert!(!tree.contains("/var/log/empty"));
	assert!(!tree.contains("/var/log/auth.log/.git"));
}

#[test]
fn scan_registers_root_level_files_under_root_key() {
	let fx = Fixture::new();
	fx.fragment("/", "global", "watchfor /x/\n");
	let tree = fx.scanner_tree();
	assert_eq!(tree.fragments(ROOT_KEY).unwrap(), ["global"]);
}

#[test]
fn scan_walks_symlink_cycles_once() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	std::os::unix::fs::symlink(".", fx.root().join("var/log/a/loop")).unwrap();
	std::os::unix::fs::symlink(fx.root().join("var"), fx.root().join("var/log/up")).unwrap();

	let tree = fx.scanner_tree();
	assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["/var/log/a"]);
	assert_eq!(fx.sink.matching(Severity::Warning, "already scanned").len(), 2);
}

#[test]
fn scan_follows_symlinked_instance_directories() {
	let fx = Fixture::new();
	let elsewhere = fx.dir.path().join("elsewhere");
	fs::create_dir_all(&elsewhere).unwrap();
	fs::write(elsewhere.join("one"), "watchfor /x/\n").unwrap();
	fs::create_dir_all(fx.root().join("var/log")).unwrap();
	std::os::unix::fs::symlink(&elsewhere, fx.root().join("var/log/app.log")).unwrap();

	let tree = fx.scanner_tree();
	assert_eq!(tree.fragments("/var/log/app.log").unwrap(), ["one"]);
}

#[test]
fn rescan_of_unchanged_tree_is_equal() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "1\n");
	fx.fragment("/var/log/a", "two", "2\n");
	fx.fragment("/var/log/b", "one", "1\n");
	assert_eq!(fx.scanner_tree(), fx.scanner_tree());
}

#[test]
fn scan_of_missing_root_is_an_error() {
	let fx = Fixture::new();
	let mut settings = fx.settings();
	settings.tree.root = fx.dir.path().join("nope");
	let provider = fx.provider(settings);
	assert!(matches!(provider.scan(), Err(swatchvisor::Error::Root { .. })));
}

#[test]
fn invalid_ignore_pattern_is_rejected() {
	let fx = Fixture::new();
	let mut settings = fx.settings();
	settings.tree.ignore = "(".into();
	assert!(matches!(
		SwatchProvider::new(settings, fx.sink.clone()),
		Err(swatchvisor::Error::Pattern { .. })
	));
}

// --- materializer ---

#[test]
fn materialize_concatenates_in_scan_order_and_is_idempotent() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /one/\n");
	fx.fragment("/var/log/a", "two", "watchfor /two/\n");
	fx.fragment("/var/log/b", "only", "watchfor /b/\n");

	let tree = fx.scanner_tree();
	let keys: Vec<String> = tree.keys().cloned().collect();
	let m = Materializer { config_name: ".swatchrc", log: fx.sink.as_ref() };

	let first = m.update(&tree, &keys);
	assert_eq!(first.len(), 2);

	let expected: String = tree
		.fragment_paths("/var/log/a")
		.unwrap()
		.iter()
		.map(|p| read(p))
		.collect();
	let config_a = materialize::config_path(&fx.root(), "/var/log/a", ".swatchrc");
	assert_eq!(read(&config_a), expected);

	let second = m.update(&fx.scanner_tree(), &keys);
	assert!(second.is_empty());
	assert_eq!(read(&config_a), expected);
}

#[test]
fn changing_one_fragment_rewrites_only_its_instance() {
	let fx = Fixture::new();
	let frag = fx.fragment("/var/log/a", "one", "watchfor /one/\n");
	fx.fragment("/var/log/b", "one", "watchfor /b/\n");

	let m = Materializer { config_name: ".swatchrc", log: fx.sink.as_ref() };
	let tree = fx.scanner_tree();
	let keys: Vec<String> = tree.keys().cloned().collect();
	m.update(&tree, &keys);

	let config_b = materialize::config_path(&fx.root(), "/var/log/b", ".swatchrc");
	let before_b = (read(&config_b), fs::metadata(&config_b).unwrap().modified().unwrap());

	fs::write(&frag, "watchfor /changed/\n").unwrap();
	let changed = m.update(&fx.scanner_tree(), &keys);
	assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["/var/log/a".to_string()]);

	let config_a = materialize::config_path(&fx.root(), "/var/log/a", ".swatchrc");
	assert_eq!(read(&config_a), "watchfor /changed/\n");
	assert_eq!((read(&config_b), fs::metadata(&config_b).unwrap().modified().unwrap()), before_b);
	assert!(!config_a.with_file_name(".swatchrc.tmp").exists());
}

#[test]
fn unreadable_fragment_skips_only_that_instance() {
	let fx = Fixture::new();
	let doomed = fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	fx.fragment("/var/log/b", "one", "watchfor /b/\n");

	let tree = fx.scanner_tree();
	fs::remove_file(&doomed).unwrap();

	let m = Materializer { config_name: ".swatchrc", log: fx.sink.as_ref() };
	let keys: Vec<String> = tree.keys().cloned().collect();
	let changed = m.update(&tree, &keys);

	assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["/var/log/b".to_string()]);
	assert!(!materialize::config_path(&fx.root(), "/var/log/a", ".swatchrc").exists());
	assert_eq!(fx.sink.matching(Severity::Warning, "/var/log/a: configuration not updated").len(), 1);
}

// --- command builder ---

#[test]
fn daemon_command_uses_prefilter_above_threshold() {
	let fx = Fixture::new();
	fx.fragment("/var/log/app.log", "main", "watchfor /foo_bar_baz .*failed/\n  echo\n");

	let build = |threshold: usize| {
		let mut settings = fx.settings();
		settings.swatch.substring_threshold = threshold;
		let provider = fx.provider(settings);
		let tree = provider.scan().unwrap();
		provider.materialize(&tree, &["/var/log/app.log".to_string()]);
		provider.command("/var/log/app.log", Mode::Daemon)
	};

	let piped = build(10);
	assert!(piped.contains(&"--daemon".to_string()));
	assert_eq!(
		piped.last().unwrap(),
		"--read-pipe=/usr/bin/tail -n 0 -F /var/log/app.log | /bin/grep --line-buffered -F foo_bar_baz"
	);
	assert!(!piped.iter().any(|a| a.starts_with("--tail-file=")));

	let plain = build(12);
	assert_eq!(plain.last().unwrap(), "--tail-file=/var/log/app.log");
	assert!(!plain.iter().any(|a| a.starts_with("--read-pipe=")));

	let disabled = build(0);
	assert_eq!(disabled.last().unwrap(), "--tail-file=/var/log/app.log");
}

#[test]
fn daemon_command_points_at_config_and_pidfile() {
	let fx = Fixture::new();
	let provider = fx.provider(fx.settings());
	let argv = provider.command("/var/log/syslog", Mode::Daemon);
	assert_eq!(argv[0], fx.settings().swatch.bin);
	assert!(argv.contains(&format!(
		"--config-file={}",
		fx.root().join("var/log/syslog/.swatchrc").display()
	)));
	assert!(argv.contains(&format!(
		"--pid-file={}",
		fx.pid_dir().join("swatch_var_log_syslog.pid").display()
	)));
}

// --- extraneous instances ---

#[test]
fn extraneous_recovers_unconfigured_keys() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	let provider = fx.provider(fx.settings());

	for name in [
		"swatch_var_log_a.pid",
		"swatch_var_log_gone.pid",
		"swatch_srv_old_log.pid",
		"swatch__weird.pid",
		"unrelated.pid",
		"swatch_var_log_a.pid.bak",
	] {
		fs::write(fx.pid_dir().join(name), "1\n").unwrap();
	}

	let tree = provider.scan().unwrap();
	let extra = provider.extraneous(&tree);
	assert_eq!(extra, vec!["/srv/old/log".to_string(), "/var/log/gone".to_string()]);

	for key in &extra {
		let name = pidname::pidfile_name("swatch", key);
		assert!(fx.pid_dir().join(&name).exists(), "{}", name);
		assert_eq!(provider.pidfile_path(key), fx.pid_dir().join(name));
	}
}

#[test]
fn discover_warns_about_pidfile_collisions() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a-b", "one", "watchfor /x/\n");
	fx.fragment("/var/log/a/b", "one", "watchfor /y/\n");
	let provider = fx.provider(fx.settings());
	let tree = provider.scan().unwrap();

	assert_eq!(provider.discover(&tree).len(), 2);
	assert_eq!(provider.collisions(&tree).len(), 1);
	assert_eq!(fx.sink.matching(Severity::Warning, "swatch_var_log_a_b.pid").len(), 1);
}

// --- end to end ---

#[test]
fn ensure_converges_and_second_pass_is_a_no_op() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	fx.fragment("/var/log/b", "one", "watchfor /b/\n");
	let sup = fx.supervisor();

	let first = sup.ensure(None).unwrap();
	assert_eq!(first.len(), 2);
	assert!(first.values().all(|s| s == "running"), "{:?}", first);

	let pidfile_a = sup.provider().pidfile_path("/var/log/a");
	let pidfile_b = sup.provider().pidfile_path("/var/log/b");
	let pids = (probe::read_pid(&pidfile_a), probe::read_pid(&pidfile_b));

	let second = sup.ensure(None).unwrap();
	assert_eq!(second, first);
	assert_eq!((probe::read_pid(&pidfile_a), probe::read_pid(&pidfile_b)), pids);

	sup.stop(None).unwrap();
}

#[test]
fn ensure_reloads_changed_instance_only() {
	let fx = Fixture::new();
	let frag = fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	fx.fragment("/var/log/b", "one", "watchfor /b/\n");
	let sup = fx.supervisor();
	sup.ensure(None).unwrap();

	let pidfile_a = sup.provider().pidfile_path("/var/log/a");
	let pidfile_b = sup.provider().pidfile_path("/var/log/b");
	let (pid_a, pid_b) = (probe::read_pid(&pidfile_a), probe::read_pid(&pidfile_b));

	fs::write(&frag, "watchfor /a changed/\n").unwrap();
	let result = sup.ensure(None).unwrap();
	assert!(result.values().all(|s| s == "running"), "{:?}", result);
	assert_ne!(probe::read_pid(&pidfile_a), pid_a);
	assert_eq!(probe::read_pid(&pidfile_b), pid_b);

	sup.stop(None).unwrap();
}

#[test]
fn ensure_reloads_when_config_is_newer_than_pidfile() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	let sup = fx.supervisor();
	sup.ensure(None).unwrap();
	let pidfile = sup.provider().pidfile_path("/var/log/a");
	let pid = probe::read_pid(&pidfile);

	let config = fs::File::options()
		.write(true)
		.open(sup.provider().config_path("/var/log/a"))
		.unwrap();
	config.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();

	sup.ensure(None).unwrap();
	assert_ne!(probe::read_pid(&pidfile), pid);
	sup.stop(None).unwrap();
}

#[test]
fn ensure_stops_instances_removed_from_tree() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	fx.fragment("/var/log/b", "one", "watchfor /b/\n");
	let sup = fx.supervisor();
	sup.ensure(None).unwrap();

	fs::remove_dir_all(fx.root().join("var/log/b")).unwrap();
	assert_eq!(sup.to_stop().unwrap(), vec!["/var/log/b".to_string()]);

	let result = sup.ensure(None).unwrap();
	assert_eq!(result["/var/log/a"], "running");
	assert_eq!(result["/var/log/b"], "stopped (unconfigured)");
	assert_eq!(result.len(), 2);

	sup.stop(None).unwrap();
}

#[test]
fn stop_without_pidfile_reports_stopped() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	let sup = fx.supervisor();
	let result = sup.stop(None).unwrap();
	assert_eq!(result["/var/log/a"], "stopped");
	assert_eq!(fx.sink.matching(Severity::Warning, "no usable pidfile").len(), 1);
}

#[test]
fn scan_runs_examine_mode_once() {
	let fx = Fixture::new();
	fx.fragment("/var/log/a", "one", "watchfor /a/\n");
	let sup = fx.supervisor();
	let result = sup.examine(None).unwrap();
	assert_eq!(result["/var/log/a"], "ok");
	assert!(sup.provider().config_path("/var/log/a").exists());
	assert!(!sup.provider().pidfile_path("/var/log/a").exists());
}
