//! Bounded on-device event log.
//!
//! One line per entry, `<unix_ts>|<LEVEL>|<message>`, truncated back to empty
//! once the file outgrows its byte limit. The log exists for post-hoc
//! diagnosis on a device nobody is watching; it must never take the loop
//! down, so every I/O failure is swallowed after a `tracing` warning.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventLogger
// ---------------------------------------------------------------------------

pub struct EventLogger {
    path: PathBuf,
    max_bytes: u64,
}

impl EventLogger {
    pub fn new(path: impl AsRef<Path>, max_bytes: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes,
        }
    }

    /// Append one entry, rotating first if the file is over the limit.
    pub fn append(&self, timestamp: i64, severity: Severity, message: &str) {
        if let Err(e) = self.try_append(timestamp, severity, message) {
            tracing::warn!(path = %self.path.display(), "device log write failed: {e}");
        }
    }

    fn try_append(&self, timestamp: i64, severity: Severity, message: &str) -> std::io::Result<()> {
        // Rotate by truncating: past entries are gone, new ones append from
        // empty. Checked before the write, so the file can exceed the limit
        // by at most one entry.
        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() > self.max_bytes {
                File::create(&self.path)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{timestamp}|{severity}|{message}")
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Unique throwaway log path per test.
    fn temp_log(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("co2-monitor-{}-{name}.log", std::process::id()))
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn entry_format_matches_contract() {
        let path = temp_log("format");
        let _ = std::fs::remove_file(&path);
        let log = EventLogger::new(&path, 50_000);

        log.append(1_700_000_000, Severity::Info, "monitor starting");

        assert_eq!(read(&path), "1700000000|INFO|monitor starting\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn severities_render_uppercase() {
        assert_eq!(Severity::Info.to_string(), "INFO");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn entries_append_in_order() {
        let path = temp_log("order");
        let _ = std::fs::remove_file(&path);
        let log = EventLogger::new(&path, 50_000);

        log.append(1, Severity::Info, "first");
        log.append(2, Severity::Error, "second");

        let lines: Vec<String> = read(&path).lines().map(str::to_string).collect();
        assert_eq!(lines, vec!["1|INFO|first", "2|ERROR|second"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rotation_truncates_old_content() {
        let path = temp_log("rotate");
        let _ = std::fs::remove_file(&path);
        // Tiny limit so a couple of entries trigger rotation.
        let log = EventLogger::new(&path, 40);

        log.append(1, Severity::Info, "this line alone is enough to pass 40 bytes");
        let before = read(&path);
        assert!(before.contains("enough"));

        // File is now over the limit; the next append truncates first.
        log.append(2, Severity::Info, "fresh start");
        let after = read(&path);
        assert!(!after.contains("enough"), "old content survived rotation: {after}");
        assert_eq!(after, "2|INFO|fresh start\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn size_never_exceeds_limit_by_more_than_one_entry() {
        let path = temp_log("bound");
        let _ = std::fs::remove_file(&path);
        let max = 200;
        let log = EventLogger::new(&path, max);

        let msg = "steady telemetry heartbeat entry";
        let entry_len = format!("{}|{}|{msg}\n", 1_700_000_000_i64, Severity::Info).len() as u64;

        for i in 0..50 {
            log.append(1_700_000_000 + i, Severity::Info, msg);
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            assert!(
                size <= max + entry_len,
                "log grew to {size} bytes (limit {max} + entry {entry_len})"
            );
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_failure_does_not_panic() {
        // A directory cannot be opened for appending; the error is swallowed.
        let log = EventLogger::new(std::env::temp_dir(), 50_000);
        log.append(1, Severity::Error, "goes nowhere");
    }
}
