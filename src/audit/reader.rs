//! Audit log reader — filter, summarize and display session logs for
//! `counsel log`.

use crate::approval::types::Disposition;
use crate::audit::types::*;
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct AuditReader {
    log_dir: PathBuf,
}

impl AuditReader {
    /// Create a reader using the default log directory.
    pub fn new() -> Result<Self> {
        let log_dir = crate::audit::logger::AuditLogger::log_directory()?;
        Ok(Self { log_dir })
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            log_dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn read_session(&self, session_id: &str) -> Result<Vec<LogEntry>> {
        let path = self.log_dir.join(format!("{}.jsonl", session_id));
        self.read_file(&path)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<LogEntry>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read log file: {}", path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse log entry at line {}", i + 1))
            })
            .collect()
    }

    /// Entries from the most recently modified session log.
    pub fn read_latest_session(&self) -> Result<Vec<LogEntry>> {
        match self.find_latest_session()? {
            Some(path) => self.read_file(&path),
            None => Ok(Vec::new()),
        }
    }

    fn session_files(&self) -> Result<Vec<PathBuf>> {
        if !self.log_dir.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_dir(&self.log_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "jsonl"))
            .collect())
    }

    fn find_latest_session(&self) -> Result<Option<PathBuf>> {
        let mut files = self.session_files()?;
        files.sort_by(|a, b| {
            let a_time = fs::metadata(a).and_then(|m| m.modified()).ok();
            let b_time = fs::metadata(b).and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });
        Ok(files.into_iter().next())
    }

    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions: Vec<String> = self
            .session_files()?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    pub fn filter_entries(entries: &[LogEntry], filter: &LogFilter) -> Vec<LogEntry> {
        entries
            .iter()
            .filter(|e| {
                filter.session_id.as_ref().map_or(true, |s| &e.session_id == s)
                    && filter.tool_name.as_ref().map_or(true, |t| &e.tool_name == t)
                    && filter.disposition.map_or(true, |d| e.disposition == d)
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn summarize(entries: &[LogEntry]) -> SessionSummary {
        let mut summary = SessionSummary::default();

        if let Some(first) = entries.first() {
            summary.session_id = first.session_id.clone();
            summary.start_time = Some(first.timestamp);
        }
        if let Some(last) = entries.last() {
            summary.end_time = Some(last.timestamp);
        }

        summary.total_calls = entries.len();
        for entry in entries {
            match entry.disposition {
                Disposition::Ungated => summary.ungated += 1,
                Disposition::Approved => summary.approved += 1,
                Disposition::Edited => summary.edited += 1,
                Disposition::Rejected => summary.rejected += 1,
                Disposition::Expired | Disposition::Cancelled => summary.abandoned += 1,
            }
            if entry.status == "error" {
                summary.failed += 1;
            }
        }

        summary
    }

    /// Pretty-print a log entry for terminal display.
    pub fn format_entry(entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S").to_string();
        let label = entry.disposition.to_string().to_uppercase();
        let disposition = match entry.disposition {
            Disposition::Ungated => label.dimmed().to_string(),
            Disposition::Approved => label.green().to_string(),
            Disposition::Edited => label.cyan().to_string(),
            Disposition::Rejected => label.red().to_string(),
            Disposition::Expired | Disposition::Cancelled => label.yellow().to_string(),
        };

        let mut line = format!(
            "[{}] {} {}",
            timestamp.dimmed(),
            disposition,
            entry.tool_name.bold()
        );
        if entry.status == "error" {
            line.push_str(&format!(" {}", "(failed)".red()));
        }
        if let Some(ref reason) = entry.reason {
            line.push_str(&format!(": {}", reason.dimmed()));
        }
        line
    }
}
