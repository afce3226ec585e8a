//! Status and log reporting seam.
//!
//! The engine never prints or panics on routine events; it reports through a
//! [`Notifier`]. Persistent errors stay visible until explicitly acknowledged
//! by whatever front end consumes them.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Default maximum number of log lines to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str, detail: Option<&str>);
    /// Raise a condition that requires explicit user acknowledgement.
    /// It must stay active until the consumer acknowledges it.
    fn persistent_error(&self, message: &str);
}

/// Ring-buffer notifier. Keeps the newest `max_lines` entries plus the set of
/// unacknowledged persistent errors.
pub struct MemoryNotifier {
    entries: Mutex<VecDeque<LogEntry>>,
    persistent: Mutex<Vec<String>>,
    max_lines: usize,
}

impl MemoryNotifier {
    pub fn new(max_lines: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_lines.min(1024))),
            persistent: Mutex::new(Vec::new()),
            max_lines,
        }
    }

    fn push(&self, level: LogLevel, message: &str, detail: Option<&str>) {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            detail: detail.map(|d| d.to_string()),
        };

        let mut entries = self.entries.lock().unwrap();
        entries.push_back(entry);
        while entries.len() > self.max_lines {
            entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Persistent errors raised since the last [`acknowledge`](Self::acknowledge).
    pub fn persistent_errors(&self) -> Vec<String> {
        self.persistent.lock().unwrap().clone()
    }

    pub fn has_persistent_errors(&self) -> bool {
        !self.persistent.lock().unwrap().is_empty()
    }

    /// Clears the persistent-error set. Only an explicit acknowledgement
    /// clears it; logging more entries never does.
    pub fn acknowledge(&self) {
        self.persistent.lock().unwrap().clear();
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl Notifier for MemoryNotifier {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message, None);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message, None);
    }

    fn error(&self, message: &str, detail: Option<&str>) {
        self.push(LogLevel::Error, message, detail);
    }

    fn persistent_error(&self, message: &str) {
        self.push(LogLevel::Error, message, None);
        self.persistent.lock().unwrap().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_records_entries() {
        let notifier = MemoryNotifier::new(10);

        notifier.info("test message");
        assert_eq!(notifier.entries().len(), 1);

        notifier.warn("another message");
        assert_eq!(notifier.entries().len(), 2);
        assert_eq!(notifier.entries_at(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn test_notifier_rotation() {
        let notifier = MemoryNotifier::new(3);

        for i in 0..5 {
            notifier.info(&format!("message {}", i));
        }

        let entries = notifier.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "message 2");
    }

    #[test]
    fn test_error_detail_is_kept() {
        let notifier = MemoryNotifier::new(10);
        notifier.error("copy failed", Some("permission denied"));

        let errors = notifier.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].detail.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_persistent_errors_survive_until_acknowledged() {
        let notifier = MemoryNotifier::new(10);

        notifier.persistent_error("conflict skipped: a.txt");
        notifier.info("routine message");
        notifier.persistent_error("conflict skipped: b.txt");

        assert!(notifier.has_persistent_errors());
        assert_eq!(notifier.persistent_errors().len(), 2);

        notifier.acknowledge();
        assert!(!notifier.has_persistent_errors());
        // The log entries themselves remain.
        assert_eq!(notifier.entries_at(LogLevel::Error).len(), 2);
    }
}
