use crate::logging::Level;
use chrono::{DateTime, Local};

/// A single log record flowing through the logger directory
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Name of the logger the record was emitted on
    pub logger: String,
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Local>,
    /// Name (or id) of the emitting thread
    pub thread: String,
}

impl LogRecord {
    /// Create a record stamped with the current time and thread
    pub fn new(logger: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        let current = std::thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };

        Self {
            logger: logger.into(),
            level,
            message: message.into(),
            timestamp: Local::now(),
            thread,
        }
    }

    /// Format the record on a single line, support-bundle style
    ///
    /// `2026-10-18 09:14:03.221+0000 [main]\tINFO\thudson.model: message`
    pub fn format(&self) -> String {
        format!(
            "{} [{}]\t{}\t{}: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f%z"),
            self.thread,
            self.level,
            if self.logger.is_empty() { "<root>" } else { &self.logger },
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_contains_fields() {
        let record = LogRecord::new("hudson.model", Level::Info, "queue updated");
        let line = record.format();
        assert!(line.contains("\tINFO\t"));
        assert!(line.contains("hudson.model: queue updated"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_format_root_logger() {
        let record = LogRecord::new("", Level::Warning, "disk low");
        assert!(record.format().contains("<root>: disk low"));
    }
}
