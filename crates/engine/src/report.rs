//! Run reporting: warning/error tallies and the ffmpeg report side channel.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the warning/error counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub warnings: u64,
    pub errors: u64,
}

impl RunTally {
    /// Counts accumulated since an earlier snapshot.
    pub fn since(&self, earlier: RunTally) -> RunTally {
        RunTally {
            warnings: self.warnings.saturating_sub(earlier.warnings),
            errors: self.errors.saturating_sub(earlier.errors),
        }
    }
}

/// Counting wrapper over the log macros. Everything routed through a
/// reporter contributes to the run summary deltas.
#[derive(Debug, Default)]
pub struct Reporter {
    warnings: AtomicU64,
    errors: AtomicU64,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&self, message: impl Display) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("{}", message);
    }

    pub fn error(&self, message: impl Display) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!("{}", message);
    }

    pub fn snapshot(&self) -> RunTally {
        RunTally {
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Surfaces ffmpeg's report log as recoverable errors. The first two lines
/// are the report header and are skipped; every remaining line is an error.
/// Returns the number of lines surfaced.
pub fn drain_report_log(path: &Path, reporter: &Reporter) -> u64 {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            reporter.error(format!(
                "failed to read report log {}: {}",
                path.display(),
                e
            ));
            return 1;
        }
    };

    let mut count = 0;
    for line in content.lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        reporter.error(format!("FFmpeg report: {}", line));
        count += 1;
    }
    count
}
