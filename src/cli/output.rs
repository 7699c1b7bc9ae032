// Output formatting and display for CLI

use crate::control::TargetConfiguration;
use crate::ipc::protocol::{AgentInfo, ControllerStatus, ResponseData};
use chrono::{DateTime, Local};
use colored::*;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a success response to stdout
pub fn print_success(data: &ResponseData) {
    match data {
        ResponseData::AgentLogsConfigured { generation, agents } => {
            println!(
                "{}",
                format!("✓ Agent log configuration #{} sent", generation)
                    .green()
                    .bold()
            );
            println!("  {}: {}", "Agents".bold(), agents);
        }

        ResponseData::TargetsApplied { generation, agents } => {
            println!(
                "{}",
                format!("✓ Log targets #{} applied", generation).green().bold()
            );
            println!("  {}: {}", "Agents".bold(), agents);
        }

        ResponseData::Targets(current) => print_targets(current.as_ref()),

        ResponseData::TailStarted { names } => {
            println!("{} Tailing {}", "ℹ".blue().bold(), names.join(", ").cyan());
        }

        ResponseData::Agents(agents) => print_agent_table(agents),

        ResponseData::Status(status) => print_status(status),

        ResponseData::Welcome { worker_id } => {
            println!("{} Registered as worker {}", "✓".green().bold(), worker_id);
        }

        ResponseData::Success(message) => {
            println!("{} {}", "✓".green().bold(), message);
        }
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn print_targets(current: Option<&TargetConfiguration>) {
    let Some(config) = current.filter(|c| !c.is_empty()) else {
        println!("{}", "No log targets are configured".yellow());
        return;
    };

    #[derive(Tabled)]
    struct TargetRow {
        #[tabled(rename = "Logger")]
        name: String,
        #[tabled(rename = "Level")]
        level: String,
    }

    let rows: Vec<TargetRow> = config
        .bindings()
        .iter()
        .map(|b| TargetRow {
            name: display_logger(&b.name),
            level: b.level.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Generation #{}", config.generation())
            .dimmed()
            .italic()
    );
}

/// Print a formatted table of workers
fn print_agent_table(agents: &[AgentInfo]) {
    #[derive(Tabled)]
    struct AgentRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Connected")]
        connected: String,
    }

    let rows: Vec<AgentRow> = agents
        .iter()
        .map(|a| AgentRow {
            id: a.id.to_string(),
            name: truncate(&a.name, 30),
            kind: if a.local {
                "controller".cyan().to_string()
            } else {
                "agent".green().to_string()
            },
            connected: {
                let datetime: DateTime<Local> = a.connected_at.into();
                datetime.format("%Y-%m-%d %H:%M:%S").to_string()
            },
        })
        .collect();

    let remote = agents.iter().filter(|a| !a.local).count();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} agent(s)", remote).dimmed().italic()
    );
}

fn print_status(status: &ControllerStatus) {
    println!("{}", "✓ Controller is running".green().bold());
    println!("  {:<16} {}", "PID:".bold(), status.pid);
    println!("  {:<16} {}", "Uptime:".bold(), format_duration(&status.uptime));
    println!("  {:<16} {}", "Agents:".bold(), status.agents);
    println!(
        "  {:<16} #{}",
        "Targets:".bold(),
        status.targets_generation
    );
    println!(
        "  {:<16} #{}",
        "Agent logs:".bold(),
        status.agent_logs_generation
    );
}

/// The root logger has an empty name
fn display_logger(name: &str) -> String {
    if name.is_empty() {
        "<root>".dimmed().to_string()
    } else {
        name.to_string()
    }
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Truncate a string to a maximum length
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(&Duration::from_secs(3700)), "1h 1m");
        assert_eq!(format_duration(&Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("hudson.remoting.PingThread", 10), "hudson....");
    }

    #[test]
    fn test_root_logger_display() {
        colored::control::set_override(false);
        assert_eq!(display_logger(""), "<root>");
        assert_eq!(display_logger("hudson"), "hudson");
    }
}
