//! Audit log writer — append-only JSONL files.
//!
//! Writes to `~/.counsel/logs/{session_id}.jsonl`, one JSON object per line.
//! Flushes after every write.

use crate::audit::types::LogEntry;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only audit logger that writes JSONL files.
pub struct AuditLogger {
    log_path: PathBuf,
    /// Kept open for the session lifetime
    file: File,
    entry_count: usize,
}

impl AuditLogger {
    /// Create a logger for a session in the default log directory.
    pub fn new(session_id: &str) -> Result<Self> {
        let log_dir = Self::log_directory()?;
        Self::in_dir(&log_dir, session_id)
    }

    /// Create a logger for a session under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, session_id: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        Self::with_path(dir.join(format!("{}.jsonl", session_id)))
    }

    /// Create a logger writing to a specific path.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

        Ok(Self {
            log_path,
            file,
            entry_count: 0,
        })
    }

    /// Append one entry and flush.
    pub fn log(&mut self, entry: &LogEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize log entry")?;
        writeln!(self.file, "{}", json).context("Failed to write log entry")?;
        self.file.flush().context("Failed to flush log file")?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Entries written by this logger (not counting earlier appends).
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Default log directory (~/.counsel/logs/).
    pub fn log_directory() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".counsel").join("logs"))
    }
}
