use owo_colors::OwoColorize;
use overseer::StatusMap;

pub fn render(statuses: &StatusMap) -> String {
	let width = statuses.keys().map(|k| k.len()).max().unwrap_or(0);
	let mut out = String::new();
	for (key, status) in statuses {
		let (circle, label) = match status.as_str() {
			"running" | "ok" => ("●".green().to_string(), status.green().to_string()),
			"stopped" => ("○".dimmed().to_string(), status.dimmed().to_string()),
			s if s.ends_with("(unconfigured)") => ("○".yellow().to_string(), status.yellow().to_string()),
			_ => ("●".red().to_string(), status.red().to_string()),
		};
		out.push_str(&format!("{} {:<width$} {}\n", circle, key, label, width = width));
	}
	out
}

pub fn render_json(statuses: &StatusMap) -> String {
	serde_json::to_string_pretty(statuses).unwrap_or_else(|_| "{}".to_string())
}

/// True when every instance ended where the operation wanted it.
pub fn all_settled(statuses: &StatusMap, want: &str) -> bool {
	statuses
		.values()
		.all(|s| s == want || (s.starts_with("stopped") && s.ends_with("(unconfigured)")))
}
