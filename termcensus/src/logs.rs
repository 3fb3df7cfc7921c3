//! Run log for pipeline diagnostics.
//!
//! Every diagnostic (coverage, duplicate counts, match counts) is recorded as a
//! [`LogEntry`] and forwarded to the `log` facade. The recorded entries travel
//! with the run summary so callers can inspect what a run reported.

use serde::{Deserialize, Serialize};

/// Log level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Pipeline stage that produced the entry
    pub stage: String,
    /// Log message
    pub message: String,
}

/// Collects the diagnostics of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry and emit it through the `log` facade.
    pub fn log(&mut self, level: LogLevel, stage: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => log::info!(target: "termcensus", "[{stage}] {message}"),
            LogLevel::Success => log::info!(target: "termcensus", "[{stage}] ✓ {message}"),
            LogLevel::Warning => log::warn!(target: "termcensus", "[{stage}] {message}"),
            LogLevel::Error => log::error!(target: "termcensus", "[{stage}] {message}"),
        }
        self.entries.push(LogEntry {
            level,
            stage: stage.to_string(),
            message,
        });
    }

    pub fn info(&mut self, stage: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, stage, message);
    }

    pub fn success(&mut self, stage: &str, message: impl Into<String>) {
        self.log(LogLevel::Success, stage, message);
    }

    pub fn warning(&mut self, stage: &str, message: impl Into<String>) {
        self.log(LogLevel::Warning, stage, message);
    }

    pub fn error(&mut self, stage: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, stage, message);
    }

    /// All recorded entries, in emission order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries recorded by one stage.
    pub fn stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    /// Number of warnings recorded so far.
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.level == LogLevel::Warning)
            .count()
    }
}
