//! Run summary: aggregate counts and the list of files that failed.

use crate::lifecycle::{FileReport, RoutingOutcome};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A quarantined file and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub file_name: String,
    /// Path in staging when the run started
    pub path: PathBuf,
    pub reason: String,
}

/// Totals for one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub backed_up: usize,
    pub quarantined: usize,
    /// In processing order, each file at most once
    pub failed_files: Vec<FailedFile>,
    pub elapsed: Duration,
    seen: HashSet<PathBuf>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one file's terminal outcome. A file already counted is ignored.
    pub fn record(&mut self, report: &FileReport) {
        if !self.seen.insert(report.media.path.clone()) {
            return;
        }

        self.processed += 1;
        match report.outcome {
            RoutingOutcome::BackedUp => self.backed_up += 1,
            RoutingOutcome::Quarantined => {
                self.quarantined += 1;
                self.failed_files.push(FailedFile {
                    file_name: report.media.file_name(),
                    path: report.media.path.clone(),
                    reason: report
                        .reason
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }
    }

    pub fn all_backed_up(&self) -> bool {
        self.quarantined == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files processed:   {}", self.processed)?;
        writeln!(f, "Backed up:         {}", self.backed_up)?;
        write!(f, "Quarantined:       {}", self.quarantined)?;
        if !self.failed_files.is_empty() {
            write!(f, "\nFailed files:")?;
            for failed in &self.failed_files {
                write!(f, "\n  {} - {}", failed.file_name, failed.reason)?;
            }
        }
        write!(f, "\nElapsed:           {:.1}s", self.elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{FileState, QuarantineReason};
    use crate::media::{Location, MediaFile, MediaKind};

    fn report(name: &str, outcome: RoutingOutcome) -> FileReport {
        let reason = match outcome {
            RoutingOutcome::BackedUp => None,
            RoutingOutcome::Quarantined => Some(QuarantineReason::DigestMismatch {
                path: PathBuf::from(format!("/backup/{}", name)),
            }),
        };
        FileReport {
            media: MediaFile::discovered(
                PathBuf::from(format!("/staging/{}", name)),
                MediaKind::DirectCopy,
            ),
            outcome,
            reason,
            trail: vec![FileState::Discovered, FileState::Terminal(outcome)],
            location: Some(match outcome {
                RoutingOutcome::BackedUp => Location::Backup,
                RoutingOutcome::Quarantined => Location::Quarantine,
            }),
            artifacts: vec![],
        }
    }

    #[test]
    fn test_counts() {
        let mut summary = RunSummary::new();
        summary.record(&report("a.avi", RoutingOutcome::BackedUp));
        summary.record(&report("b.avi", RoutingOutcome::Quarantined));
        summary.record(&report("c.avi", RoutingOutcome::BackedUp));

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.backed_up, 2);
        assert_eq!(summary.quarantined, 1);
        assert_eq!(summary.failed_files.len(), 1);
        assert_eq!(summary.failed_files[0].file_name, "b.avi");
        assert_eq!(
            summary.failed_files[0].reason,
            "digest mismatch after relocation: /backup/b.avi"
        );
        assert!(!summary.all_backed_up());
    }

    #[test]
    fn test_file_counted_once() {
        let mut summary = RunSummary::new();
        let failed = report("b.avi", RoutingOutcome::Quarantined);
        summary.record(&failed);
        summary.record(&failed);

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.quarantined, 1);
        assert_eq!(summary.failed_files.len(), 1);
    }

    #[test]
    fn test_empty_summary_display() {
        let summary = RunSummary::new();
        assert!(summary.all_backed_up());
        let text = summary.to_string();
        assert!(text.contains("Files processed:   0"));
        assert!(!text.contains("Failed files"));
    }

    #[test]
    fn test_display_lists_failures() {
        let mut summary = RunSummary::new();
        summary.record(&report("b.avi", RoutingOutcome::Quarantined));
        let text = summary.to_string();
        assert!(text.contains("Quarantined:       1"));
        assert!(text.contains("  b.avi - digest mismatch after relocation"));
    }
}
