//! `counsel log` — browse audit logs.
//!
//! Every tool call in a session: what ran ungated, what the reviewer
//! approved, edited or rejected, and what expired.

use crate::approval::types::Disposition;
use crate::audit::{AuditReader, LogFilter};
use anyhow::{bail, Context, Result};
use colored::Colorize;

pub fn run_log(
    session_id: Option<&str>,
    tool: Option<&str>,
    disposition: Option<&str>,
    limit: Option<usize>,
    summary_only: bool,
) -> Result<()> {
    let reader = AuditReader::new().context("Failed to initialize log reader")?;

    let entries = if let Some(sid) = session_id {
        reader
            .read_session(sid)
            .with_context(|| format!("Failed to read session: {}", sid))?
    } else {
        let entries = reader.read_latest_session()?;
        if entries.is_empty() {
            println!();
            println!("  {} No audit logs found.", "ℹ".blue());
            println!("  Run a plan through counsel first:");
            println!("    {}", "counsel run --data-room room.json --plan plan.json".dimmed());
            println!();
            return Ok(());
        }
        entries
    };

    let disposition = match disposition {
        None => None,
        Some(d) => match Disposition::from_str_loose(d) {
            Some(d) => Some(d),
            None => bail!(
                "Unknown disposition '{}'. Use ungated, approved, edited, rejected, expired or cancelled.",
                d
            ),
        },
    };
    let filter = LogFilter {
        session_id: session_id.map(|s| s.to_string()),
        tool_name: tool.map(|t| t.to_string()),
        disposition,
        limit,
    };
    let filtered = AuditReader::filter_entries(&entries, &filter);
    let summary = AuditReader::summarize(&entries);

    println!();
    if summary_only {
        println!("  {} Session: {}", "📋".to_string().bold(), summary.session_id.cyan());
        println!();
        println!(
            "  {} total | {} ungated | {} approved | {} edited | {} rejected | {} expired/cancelled",
            summary.total_calls.to_string().bold(),
            summary.ungated.to_string().dimmed(),
            summary.approved.to_string().green().bold(),
            summary.edited.to_string().cyan().bold(),
            summary.rejected.to_string().red().bold(),
            summary.abandoned.to_string().yellow().bold(),
        );
        if summary.failed > 0 {
            println!("  {} call(s) failed after approval", summary.failed.to_string().red());
        }
        if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
            println!("  Duration: {}", format_duration((end - start).num_seconds()));
        }
    } else {
        if let Some(first) = filtered.first() {
            println!("  Session: {}", first.session_id.cyan());
            println!();
        }
        for entry in &filtered {
            println!("  {}", AuditReader::format_entry(entry));
        }
        println!();
        println!("  {} {}", "─".repeat(40).dimmed(), summary.one_line().dimmed());
    }
    println!();
    Ok(())
}

pub fn run_log_list() -> Result<()> {
    let reader = AuditReader::new()?;
    let sessions = reader.list_sessions()?;

    println!();
    if sessions.is_empty() {
        println!("  {} No sessions found.", "ℹ".blue());
        println!();
        return Ok(());
    }

    println!("  {} Available sessions:", "📋".to_string().bold());
    println!();
    for session in &sessions {
        println!("  • {}", session);
    }
    println!();
    println!("  View a session: {}", "counsel log --session <id>".dimmed());
    println!();
    Ok(())
}

fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
