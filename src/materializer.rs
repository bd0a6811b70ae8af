//! Output tree materialization
//!
//! Places every routed image at `OUTPUT_DIR/<split><domain>/<filename>`.
//! Per-file failures are logged, tallied and reported at the end; they never
//! abort the run.

use crate::config::TransferMode;
use crate::error::Result;
use crate::router::{Bucket, SplitPlan};
use crate::services::{BucketProgress, FileTransferService, ProgressReporter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An image that could not be placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    /// Error kind label, see [`crate::error::ConvertError::kind`]
    pub kind: &'static str,
    pub error: String,
}

/// Outcome of a materialize pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    /// Images placed per subdirectory
    pub transferred: BTreeMap<String, usize>,
    pub bytes: u64,
    pub failures: Vec<FileFailure>,
}

impl MaterializeReport {
    #[must_use]
    pub fn transferred_total(&self) -> usize {
        self.transferred.values().sum()
    }
}

/// Create the output root and every subdirectory of the layout.
///
/// Idempotent: existing directories are left as they are. Empty
/// subdirectories are created too, so the layout is always complete.
pub fn prepare_output_dir(output_dir: &Path, buckets: &[Bucket]) -> Result<()> {
    FileTransferService::ensure_dir(output_dir)?;
    for bucket in buckets {
        let path = output_dir.join(bucket.dir_name());
        FileTransferService::ensure_dir(&path)?;
        debug!(path = %path.display(), "Output subdirectory ready");
    }
    Ok(())
}

/// Places images of a [`SplitPlan`] into an output directory
#[derive(Debug, Clone)]
pub struct Materializer {
    output_dir: PathBuf,
    mode: TransferMode,
}

impl Materializer {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(output_dir: P, mode: TransferMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            mode,
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Materialize every assignment, one subdirectory at a time.
    ///
    /// The subdirectories must exist, see [`prepare_output_dir`].
    pub fn run(&self, plan: &SplitPlan, reporter: &dyn ProgressReporter) -> MaterializeReport {
        let mut report = MaterializeReport::default();

        for bucket in plan.buckets() {
            let name = bucket.dir_name();
            let assignments = plan.assignments(*bucket);
            reporter.begin_bucket(&name, assignments.len());

            let mut completed = 0;
            let mut failed = 0;
            for assignment in assignments {
                let dest = assignment.dest_path(&self.output_dir);
                match FileTransferService::transfer(&assignment.source_path, &dest, self.mode) {
                    Ok(bytes) => {
                        completed += 1;
                        report.bytes += bytes;
                    },
                    Err(e) => {
                        failed += 1;
                        warn!(file = %assignment.filename, bucket = %name, "{e}");
                        reporter.report_error(&assignment.filename, &e.to_string());
                        report.failures.push(FileFailure {
                            filename: assignment.filename.clone(),
                            source_path: assignment.source_path.clone(),
                            dest_path: dest,
                            kind: e.kind(),
                            error: e.to_string(),
                        });
                    },
                }
                reporter.advance(&assignment.filename);
            }

            reporter.finish_bucket(&BucketProgress {
                name: name.clone(),
                completed,
                failed,
                total: assignments.len(),
            });
            info!(bucket = %name, completed, failed, "Subdirectory materialized");
            report.transferred.insert(name, completed);
        }

        if !report.failures.is_empty() {
            warn!(
                "Some images could not be materialized. Transferred: {}, Failed: {}",
                report.transferred_total(),
                report.failures.len()
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConversionConfig, ValPolicy};
    use crate::metadata::{AttributeValue, JoinedRecord, Split};
    use crate::services::progress::tests::RecordingProgressReporter;
    use std::fs;
    use tempfile::tempdir;

    fn record(filename: &str, value: AttributeValue, split: Split) -> JoinedRecord {
        JoinedRecord {
            filename: filename.to_string(),
            value,
            split,
        }
    }

    #[test]
    fn test_prepare_output_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let buckets = Bucket::all(ValPolicy::MergeIntoTest);

        prepare_output_dir(&out, &buckets).unwrap();
        prepare_output_dir(&out, &buckets).unwrap();

        for name in ["trainA", "trainB", "testA", "testB"] {
            assert!(out.join(name).is_dir());
        }
        assert!(!out.join("valA").exists());
    }

    #[test]
    fn test_run_tolerates_missing_sources() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("000001.png"), b"one").unwrap();
        fs::write(src.join("000003.png"), b"three").unwrap();

        let config = ConversionConfig {
            source_dir: src,
            output_dir: out.clone(),
            ..ConversionConfig::default()
        };
        let records = [
            record("000001.jpg", AttributeValue::Present, Split::Train),
            record("000002.jpg", AttributeValue::Absent, Split::Test),
            record("000003.jpg", AttributeValue::Absent, Split::Val),
        ];
        let plan = SplitPlan::build(&records, &config);
        prepare_output_dir(&out, plan.buckets()).unwrap();

        let reporter = RecordingProgressReporter::default();
        let report = Materializer::new(&out, TransferMode::Copy).run(&plan, &reporter);

        assert_eq!(report.transferred_total(), 2);
        assert_eq!(report.bytes, 8);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "000002.png");
        assert_eq!(report.failures[0].kind, "io");
        assert_eq!(report.transferred["testB"], 1);

        assert_eq!(fs::read(out.join("trainA/000001.png")).unwrap(), b"one");
        assert_eq!(fs::read(out.join("testB/000003.png")).unwrap(), b"three");
        assert!(!out.join("testB/000002.png").exists());

        assert_eq!(*reporter.advanced.borrow(), 3);
        assert_eq!(*reporter.errors.borrow(), ["000002.png"]);
        let names: Vec<_> = reporter.buckets.borrow().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, ["trainA", "trainB", "testA", "testB"]);
    }
}
