use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::jobs::{ColumnKind, CorrectionJob};

/// Outcome of one correction job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub sheet: String,
    pub column: String,
    pub kind: Option<ColumnKind>,
    pub rows: usize,
    pub batches: usize,
    /// Batches whose response was truncated or padded.
    pub batches_repaired: usize,
    /// Batches that kept their original values entirely.
    pub batches_failed: usize,
    /// Corrected values were written back.
    pub merged: bool,
}

impl JobReport {
    pub fn for_job(job: &CorrectionJob, batches: usize) -> Self {
        Self {
            sheet: job.sheet.clone(),
            column: job.column.clone(),
            kind: Some(job.kind),
            rows: job.positions.len(),
            batches,
            ..Self::default()
        }
    }
}

/// Everything a caller needs to know about a run; nothing is kept between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
    pub model: String,
    pub ai_skipped: bool,
    pub jobs: Vec<JobReport>,
    pub total_batches: usize,
    pub completed_batches: usize,
    /// Batches that fell back to the original values.
    pub fallbacks: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let merged = self.jobs.iter().filter(|j| j.merged).count();
        format!(
            "{} jobs ({} merged), {}/{} batches, {} fallbacks, {} warnings, {} errors",
            self.jobs.len(),
            merged,
            self.completed_batches,
            self.total_batches,
            self.fallbacks,
            self.warnings.len(),
            self.errors.len()
        )
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `<stem>.run_report.json` next to the output workbook.
#[must_use]
pub fn report_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output.with_file_name(format!("{stem}.run_report.json"))
}

pub fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, text).with_context(|| format!("write run report: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn summary_counts_merged_jobs() {
        let mut r = RunReport {
            total_batches: 3,
            completed_batches: 3,
            fallbacks: 1,
            ..RunReport::default()
        };
        r.jobs.push(JobReport {
            merged: true,
            ..JobReport::default()
        });
        r.jobs.push(JobReport::default());
        r.warn("w");
        assert_eq!(
            r.summary(),
            "2 jobs (1 merged), 3/3 batches, 1 fallbacks, 1 warnings, 0 errors"
        );
        assert!(!r.has_errors());
    }

    #[test]
    fn report_sits_next_to_the_output() {
        assert_eq!(
            report_path(Path::new("/out/feb_corrected.xlsx")),
            PathBuf::from("/out/feb_corrected.run_report.json")
        );
    }

    #[test]
    fn report_serializes_kind_lowercase() {
        let r = JobReport {
            kind: Some(ColumnKind::Description),
            ..JobReport::default()
        };
        let v = serde_json::to_value(&r).expect("json");
        assert_eq!(v["kind"], "description");
    }
}
