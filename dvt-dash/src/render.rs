//! Plain-terminal views for the non-interactive commands.

use colored::{ColoredString, Colorize};
use dvt_common::config::{ConfigWarning, LoadedConfig, Severity};
use dvt_common::{CATALOG, ModuleStatus, TestResult, TestStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Format a duration in seconds as a human-readable string.
pub fn humanize_duration(secs: i64) -> String {
    let secs = secs.max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Indent each line of text with a given prefix.
fn indent_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_label(status: &TestStatus) -> ColoredString {
    let label = status.label();
    match status {
        TestStatus::Running => label.yellow().bold(),
        TestStatus::Completed => label.green().bold(),
        TestStatus::Failed => label.red().bold(),
        TestStatus::Unknown(_) => label.dimmed(),
    }
}

fn local_time(result: &TestResult) -> String {
    result
        .start_time
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// One line per result, newest first as given.
pub fn format_results(results: &[&TestResult]) -> String {
    if results.is_empty() {
        return "No test results.".dimmed().to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:<19}  {:<18}  {:<8}  {:>7}  {}",
            "STARTED", "TYPE", "STATUS", "TOOK", "TEST ID"
        )
        .bold()
    );
    for result in results {
        let took = result
            .duration()
            .map(|d| humanize_duration(d.num_seconds()))
            .unwrap_or_else(|| "-".to_string());
        // Pad before colouring so escape codes do not skew the columns.
        let status = format!("{:<8}", result.status.label());
        let status = status.replace(result.status.label(), &status_label(&result.status).to_string());
        let _ = writeln!(
            out,
            "{:<19}  {:<18}  {}  {:>7}  {}",
            local_time(result),
            result.test_type,
            status,
            took,
            result.id
        );
        if let Some(error) = result.terminal_error() {
            let _ = writeln!(out, "{}", indent_lines(error, "    ").red());
        }
    }
    out
}

pub fn format_result_detail(result: &TestResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Test:".bold(), result.id);
    let _ = writeln!(out, "{} {}", "Type:".bold(), result.test_type);
    let _ = writeln!(out, "{} {}", "Category:".bold(), result.category);
    let _ = writeln!(out, "{} {}", "Status:".bold(), status_label(&result.status));
    let _ = writeln!(out, "{} {}", "Started:".bold(), local_time(result));
    if let Some(end) = result.end_time {
        let _ = writeln!(
            out,
            "{} {}",
            "Finished:".bold(),
            end.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(duration) = result.duration() {
        let _ = writeln!(
            out,
            "{} {}",
            "Took:".bold(),
            humanize_duration(duration.num_seconds())
        );
    }
    if let Some(error) = result.terminal_error() {
        let _ = writeln!(out, "{} {}", "Error:".bold(), error.red());
    }
    if !result.result_payload.is_empty() {
        let payload = serde_json::to_string_pretty(&result.result_payload)
            .unwrap_or_else(|err| format!("unprintable payload: {err}"));
        let _ = writeln!(out, "{}", "Results:".bold());
        let _ = writeln!(out, "{}", indent_lines(&payload, "  "));
    }
    out
}

pub fn format_catalog() -> String {
    let mut out = String::new();
    for definition in &CATALOG {
        let _ = writeln!(
            out,
            "{} ({})",
            definition.name.bold(),
            definition.category.id().cyan()
        );
        let _ = writeln!(out, "  {}", definition.description);
        for check in definition.sub_checks {
            let _ = writeln!(out, "    - {check}");
        }
    }
    out
}

pub fn format_status(
    api_url: &str,
    health: Result<&str, String>,
    modules: Result<&BTreeMap<String, ModuleStatus>, String>,
) -> String {
    let mut out = String::new();
    let health_line = match health {
        Ok(status) if status == "ok" => status.green().to_string(),
        Ok(status) => status.yellow().to_string(),
        Err(err) => format!("{} ({err})", "unreachable".red()),
    };
    let _ = writeln!(out, "{} {api_url}: {health_line}", "Backend".bold());
    match modules {
        Ok(modules) if modules.is_empty() => {
            let _ = writeln!(out, "  no test modules reported");
        }
        Ok(modules) => {
            for (test_type, module) in modules {
                let state = if module.status == "ready" {
                    module.status.green()
                } else {
                    module.status.yellow()
                };
                let _ = writeln!(out, "  {test_type:<18} {state}  {}", module.module.dimmed());
            }
        }
        Err(err) => {
            let _ = writeln!(out, "  module status unavailable: {}", err.red());
        }
    }
    out
}

fn severity_tag(severity: Severity) -> ColoredString {
    match severity {
        Severity::Info => "info".cyan(),
        Severity::Warning => "warning".yellow(),
        Severity::Error => "error".red().bold(),
    }
}

pub fn format_config(loaded: &LoadedConfig, live_url: &str, warnings: &[ConfigWarning]) -> String {
    let config = &loaded.config;
    let mut out = String::new();
    let file = loaded
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    let _ = writeln!(out, "{} {file}", "Config file:".bold());

    let ws_url = config.ws_url.clone().unwrap_or_default();
    let extra_devices = config.defaults.extra_devices.join(", ");
    let rows: [(&str, String); 9] = [
        ("api_url", config.api_url.clone()),
        ("ws_url", ws_url),
        ("request_timeout_secs", config.request_timeout_secs.to_string()),
        ("refresh_interval_ms", config.refresh_interval_ms.to_string()),
        ("refresh_ordering", config.refresh_ordering.to_string()),
        ("log_level", config.log_level.clone()),
        ("defaults.device_path", config.defaults.device_path.clone()),
        ("defaults.extra_devices", extra_devices),
        ("live_url", live_url.to_string()),
    ];
    for (key, value) in rows {
        let source = if key == "live_url" {
            "derived".to_string()
        } else {
            loaded.sources.get(key).to_string()
        };
        let shown = if value.is_empty() { "(unset)".to_string() } else { value };
        let _ = writeln!(out, "  {key:<24} {shown}  {}", format!("[{source}]").dimmed());
    }
    for warning in warnings {
        let _ = writeln!(
            out,
            "{} {}: {}",
            severity_tag(warning.severity),
            warning.key,
            warning.message
        );
    }
    out
}
