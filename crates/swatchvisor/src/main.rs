use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use overseer::{probe, InstanceProvider, LogSink, Supervisor, TracingSink};
use owo_colors::OwoColorize;
use serde::Serialize;

use swatchvisor::paths;
use swatchvisor::tree::ROOT_KEY;
use swatchvisor::{logging, output, Settings, SwatchProvider};

#[derive(Parser)]
#[command(name = "swatchvisor", version, about = "Keep one swatchdog daemon per log file running")]
struct Cli {
	/// Settings file [default: $XDG_CONFIG_HOME/swatchvisor/config.toml]
	#[arg(short, long, global = true, value_name = "FILE")]
	config: Option<PathBuf>,
	/// Configuration tree root
	#[arg(long, global = true, value_name = "DIR")]
	root: Option<PathBuf>,
	/// Directory holding the daemons' pidfiles
	#[arg(long, global = true, value_name = "DIR")]
	pid_dir: Option<PathBuf>,
	/// Seconds to wait for daemons to reach the wanted state
	#[arg(long, global = true, value_name = "SECS")]
	timeout: Option<u64>,
	/// Do not reload running daemons whose configuration changed
	#[arg(long, global = true)]
	no_timely_reload: bool,
	/// Print statuses as JSON
	#[arg(long, global = true)]
	json: bool,
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
	/// Start daemons that are not running
	Start(Targets),
	/// Stop daemons
	Stop(Targets),
	/// Stop, then start again what went down
	Restart(Targets),
	/// Regenerate configuration and cycle daemons
	Reload(Targets),
	/// Converge: start what is down, reload what is stale, stop what is unconfigured
	Ensure(Targets),
	/// Show whether each daemon is running
	Status(Targets),
	/// Run each configuration once over its whole log file
	Scan(Targets),
	/// Show discovered instances, their fragments and pidfiles
	List,
}

#[derive(Args)]
struct Targets {
	/// Log files to act on [default: every instance in the tree]
	instances: Vec<String>,
}

impl Targets {
	fn filter(&self) -> Option<Vec<String>> {
		if self.instances.is_empty() {
			None
		} else {
			Some(self.instances.iter().map(|i| normalize_key(i)).collect())
		}
	}
}

fn normalize_key(raw: &str) -> String {
	let trimmed = raw.trim_end_matches('/');
	if trimmed.is_empty() {
		ROOT_KEY.to_string()
	} else if trimmed.starts_with('/') {
		trimmed.to_string()
	} else {
		format!("/{}", trimmed)
	}
}

fn main() {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(e) if e.use_stderr() => {
			logging::init(false);
			TracingSink.crit("invalid command line");
			e.exit();
		}
		Err(e) => e.exit(),
	};

	logging::init(cli.verbose);
	let log: Arc<dyn LogSink> = Arc::new(TracingSink);
	match run(cli, Arc::clone(&log)) {
		Ok(code) => std::process::exit(code),
		Err(e) => {
			log.crit(&format!("{:#}", e));
			std::process::exit(1);
		}
	}
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
	let path = cli.config.clone().unwrap_or_else(paths::settings_path);
	let mut settings = Settings::load(&path).context("loading settings")?;
	if let Some(root) = &cli.root {
		settings.tree.root = root.clone();
	}
	if let Some(pid_dir) = &cli.pid_dir {
		settings.supervisor.pid_dir = Some(pid_dir.clone());
	}
	if let Some(timeout) = cli.timeout {
		settings.supervisor.wait_timeout_secs = timeout;
	}
	if cli.no_timely_reload {
		settings.supervisor.timely_reload = false;
	}
	Ok(settings)
}

fn run(cli: Cli, log: Arc<dyn LogSink>) -> anyhow::Result<i32> {
	let settings = load_settings(&cli)?;
	let engine_config = settings.engine_config();
	let provider = SwatchProvider::new(settings, Arc::clone(&log))?;
	let sup = Supervisor::new(provider, engine_config, log);

	let (statuses, want) = match &cli.command {
		Cmd::List => return list(sup.provider(), cli.json),
		Cmd::Start(t) => (sup.start(t.filter().as_deref())?, Some("running")),
		Cmd::Stop(t) => (sup.stop(t.filter().as_deref())?, Some("stopped")),
		Cmd::Restart(t) => (sup.restart(t.filter().as_deref())?, Some("running")),
		Cmd::Reload(t) => (sup.reload(t.filter().as_deref())?, Some("running")),
		Cmd::Ensure(t) => (sup.ensure(t.filter().as_deref())?, Some("running")),
		Cmd::Status(t) => (sup.status(t.filter().as_deref())?, None),
		Cmd::Scan(t) => (sup.examine(t.filter().as_deref())?, Some("ok")),
	};

	if cli.json {
		println!("{}", output::render_json(&statuses));
	} else {
		print!("{}", output::render(&statuses));
	}

	match want {
		Some(want) if !output::all_settled(&statuses, want) => Ok(2),
		_ => Ok(0),
	}
}

#[derive(Serialize)]
struct ListEntry {
	key: String,
	fragments: Vec<String>,
	config: PathBuf,
	pidfile: PathBuf,
	state: String,
}

fn list(provider: &SwatchProvider, json: bool) -> anyhow::Result<i32> {
	let tree = provider.scan()?;
	let entries: Vec<ListEntry> = tree
		.keys()
		.map(|key| {
			let pidfile = provider.pidfile_path(key);
			ListEntry {
				key: key.clone(),
				fragments: tree.fragments(key).unwrap_or_default().to_vec(),
				config: provider.config_path(key),
				state: probe::status(&pidfile).to_string(),
				pidfile,
			}
		})
		.collect();
	let collisions = provider.collisions(&tree);

	if json {
		println!("{}", serde_json::to_string_pretty(&entries)?);
		return Ok(if collisions.is_empty() { 0 } else { 2 });
	}

	for entry in &entries {
		println!("{} {}", entry.key.bold(), entry.state.dimmed());
		println!("  config   {}", entry.config.display());
		println!("  pidfile  {}", entry.pidfile.display());
		println!("  fragments {}", entry.fragments.join(", "));
		if entry.key == ROOT_KEY {
			println!("  {}", "fragments directly under the root: this instance tails no log file".yellow());
		}
	}
	for (name, keys) in &collisions {
		println!("{} {} is shared by {}", "collision".red(), name, keys.join(", "));
	}
	Ok(if collisions.is_empty() { 0 } else { 2 })
}
