use crate::{config::RunOptions, util::now_rfc3339};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

pub const SKIP_REASON: &str = "already analyzed";

/// Outcome for one discovered file, in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub file: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum JobOutcome {
    Success {
        /// Seconds.
        duration: f64,
        output_path: String,
    },
    Skipped {
        reason: String,
        output_path: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
        output_path: String,
    },
}

impl JobResult {
    pub fn success(file: String, duration: Duration, output: &Path) -> Self {
        Self {
            file,
            outcome: JobOutcome::Success {
                duration: duration.as_secs_f64(),
                output_path: output.display().to_string(),
            },
        }
    }

    pub fn skipped(file: String, output: &Path) -> Self {
        Self {
            file,
            outcome: JobOutcome::Skipped {
                reason: SKIP_REASON.to_string(),
                output_path: output.display().to_string(),
            },
        }
    }

    pub fn error(file: String, output: &Path, error: String, stderr: Option<String>) -> Self {
        Self {
            file,
            outcome: JobOutcome::Error {
                error,
                stderr,
                output_path: output.display().to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, JobOutcome::Skipped { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, JobOutcome::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_files: usize,
    pub successful: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Wall-clock seconds for the whole batch.
    pub total_duration: f64,
}

impl Summary {
    pub fn from_results(results: &[JobResult], total: Duration) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        let skipped = results.iter().filter(|r| r.is_skipped()).count();
        let errors = results.iter().filter(|r| r.is_error()).count();
        Self {
            total_files: results.len(),
            successful,
            skipped,
            errors,
            total_duration: total.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub timestamp: String,
    pub directory: String,
    pub options: RunOptions,
    pub summary: Summary,
    pub results: Vec<JobResult>,
}

impl BatchReport {
    pub fn new(root: &Path, options: &RunOptions, results: &[JobResult], total: Duration) -> Self {
        Self {
            timestamp: now_rfc3339(),
            directory: root.display().to_string(),
            options: options.clone(),
            summary: Summary::from_results(results, total),
            results: results.to_vec(),
        }
    }
}

/// Persists batch reports as JSON files inside the scanned directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    prefix: String,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new("batch-report")
    }
}

impl ReportWriter {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Writes `report` into `root` and returns the file's path. Existing files
    /// are never overwritten.
    pub fn write(&self, root: &Path, report: &BatchReport) -> Result<PathBuf> {
        let body = serde_json::to_string_pretty(report).context("serializing batch report")?;
        let stamp = file_stamp(OffsetDateTime::now_utc());

        for attempt in 0..100u32 {
            let name = if attempt == 0 {
                format!("{}-{}.json", self.prefix, stamp)
            } else {
                format!("{}-{}-{}.json", self.prefix, stamp, attempt)
            };
            let path = root.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("creating report: {}", path.display()));
                }
            };
            write_or_remove(&path, &mut file, &body)?;
            info!(path = %path.display(), "batch report written");
            return Ok(path);
        }

        Err(anyhow!(
            "could not find a free report file name in {}",
            root.display()
        ))
    }
}

/// Writes `body` to the freshly created `path`; a partial file is removed
/// rather than left behind as a truncated report.
fn write_or_remove<W: Write>(path: &Path, out: &mut W, body: &str) -> Result<()> {
    let written = out
        .write_all(body.as_bytes())
        .and_then(|_| out.write_all(b"\n"))
        .and_then(|_| out.flush());
    if let Err(err) = written {
        if let Err(rm) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %rm, "cannot remove partial report");
        }
        return Err(err).with_context(|| format!("writing report: {}", path.display()));
    }
    Ok(())
}

/// `20261018T120000.123456789Z`: sortable and safe in file names everywhere.
pub fn file_stamp(t: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:09}Z",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_has_nanoseconds() {
        let t = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789)
            .expect("valid timestamp");
        assert_eq!(file_stamp(t), "20231114T221320.123456789Z");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let r = JobResult::success("a.mp4".into(), Duration::from_millis(1500), Path::new("/x/a_analysis.txt"));
        let v = serde_json::to_value(&r).expect("serialize");
        assert_eq!(v["status"], "success");
        assert_eq!(v["duration"], 1.5);
        assert_eq!(v["outputPath"], "/x/a_analysis.txt");
        assert_eq!(v["file"], "a.mp4");

        let e = JobResult::error("b.mp4".into(), Path::new("/x/b_analysis.txt"), "boom".into(), None);
        let v = serde_json::to_value(&e).expect("serialize");
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "boom");
        assert_eq!(v["outputPath"], "/x/b_analysis.txt");
        assert!(v.get("stderr").is_none());
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "no space left on device"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_report() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join("batch-report-x.json");
        std::fs::write(&path, "{\"trunc").expect("seed partial file");

        let err = write_or_remove(&path, &mut FullDisk, "{}").unwrap_err();
        assert!(format!("{err:#}").contains("no space left"));
        assert!(!path.exists());
    }
}
