//! Conversion pipeline: metadata loader, router and materializer run once,
//! in sequence

use crate::{
    config::{ConversionConfig, MismatchPolicy, TransferMode, ValPolicy},
    error::{ConvertError, Result},
    manifest,
    materializer::{prepare_output_dir, FileFailure, MaterializeReport, Materializer},
    metadata::{self, AttributeTable, DataIssue, JoinedTable, PartitionTable},
    router::SplitPlan,
    services::{scan_source_images, ConversionStage, ProgressReporter},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Everything a run did, serializable for `--summary`
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub attribute: String,
    pub val_policy: ValPolicy,
    pub invert: bool,
    pub transfer_mode: TransferMode,
    pub dry_run: bool,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Filenames present in both metadata tables
    pub joined: usize,
    /// Images routed to each subdirectory
    pub planned: BTreeMap<String, usize>,
    /// Images actually placed in each subdirectory (empty on a dry run)
    pub transferred: BTreeMap<String, usize>,
    pub bytes: u64,
    /// Metadata rows skipped as data errors
    pub skipped_rows: Vec<DataIssue>,
    /// Images in the source directory with no metadata row
    pub unlisted_images: usize,
    /// Images that could not be placed
    pub failures: Vec<FileFailure>,
    pub manifest: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ConversionSummary {
    #[must_use]
    pub fn planned_total(&self) -> usize {
        self.planned.values().sum()
    }

    #[must_use]
    pub fn transferred_total(&self) -> usize {
        self.transferred.values().sum()
    }

    /// No skipped rows and no failed files
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped_rows.is_empty() && self.failures.is_empty()
    }

    /// Write the summary as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ConvertError::file_io_error("write summary", path, e))
    }
}

/// Runs one CelebA conversion
#[derive(Debug, Clone)]
pub struct CelebaConverter {
    config: ConversionConfig,
    manifest_path: Option<PathBuf>,
}

impl CelebaConverter {
    /// Create a converter, validating `config`
    pub fn new(config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            manifest_path: None,
        })
    }

    /// Write a SHA-256 manifest of the output tree to `path` after the run
    #[must_use]
    pub fn with_manifest<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Load both tables and join them on the configured attribute.
    ///
    /// Fails with a configuration error for an unknown attribute, and with
    /// an I/O error when a table cannot be read.
    pub fn load(&self) -> Result<JoinedTable> {
        let attrs = AttributeTable::load(&self.config.attr_table)?;
        attrs.column(&self.config.attribute)?;
        let parts = PartitionTable::load(&self.config.partition_table)?;
        metadata::join(
            &attrs,
            &parts,
            &self.config.attribute,
            self.config.mismatch_policy,
        )
    }

    /// Run the whole pipeline.
    ///
    /// Fatal errors (configuration, unreadable metadata, unwritable output
    /// root, strict-mode mismatches) are returned before any image is
    /// written. Per-file failures are collected in the summary.
    #[instrument(skip_all, fields(attribute = %self.config.attribute))]
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<ConversionSummary> {
        let started_at = Utc::now();
        let config = &self.config;
        config.check_inputs()?;

        reporter.report_stage(ConversionStage::MetadataLoading);
        let joined = self.load()?;

        reporter.report_stage(ConversionStage::Routing);
        let plan = SplitPlan::build(&joined.records, config);
        if config.mismatch_policy == MismatchPolicy::Fail {
            if let Some(issue) = plan.issues().first() {
                return Err(issue.to_error());
            }
        }
        for (name, count) in plan.counts() {
            info!(bucket = %name, images = count, "Planned");
        }

        reporter.report_stage(ConversionStage::SourceValidation);
        let unlisted_images = self.validate_sources(&plan)?;

        let mut report = MaterializeReport::default();
        let mut manifest_written = None;

        if config.dry_run {
            info!("Dry run: no files written");
        } else {
            reporter.report_stage(ConversionStage::OutputPreparation);
            prepare_output_dir(&config.output_dir, plan.buckets())?;

            reporter.report_stage(ConversionStage::Materializing);
            report = Materializer::new(&config.output_dir, config.transfer_mode).run(&plan, reporter);

            if let Some(path) = &self.manifest_path {
                reporter.report_stage(ConversionStage::ManifestWriting);
                manifest::write_manifest(&config.output_dir, path)?;
                manifest_written = Some(path.clone());
            }
        }

        reporter.report_stage(ConversionStage::Completed);

        let summary = ConversionSummary {
            attribute: config.attribute.clone(),
            val_policy: config.val_policy,
            invert: config.invert,
            transfer_mode: config.transfer_mode,
            dry_run: config.dry_run,
            source_dir: config.source_dir.clone(),
            output_dir: config.output_dir.clone(),
            joined: joined.records.len(),
            planned: plan.counts(),
            transferred: report.transferred,
            bytes: report.bytes,
            skipped_rows: joined
                .issues
                .into_iter()
                .chain(plan.issues().iter().cloned())
                .collect(),
            unlisted_images,
            failures: report.failures,
            manifest: manifest_written,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            joined = summary.joined,
            transferred = summary.transferred_total(),
            skipped_rows = summary.skipped_rows.len(),
            failed = summary.failures.len(),
            "Conversion finished"
        );

        Ok(summary)
    }

    /// Compare the source directory against the plan.
    ///
    /// Returns the number of images on disk that no metadata row names.
    /// Under [`MismatchPolicy::Fail`] any disagreement is an error.
    fn validate_sources(&self, plan: &SplitPlan) -> Result<usize> {
        let config = &self.config;
        let on_disk = scan_source_images(&config.source_dir, &config.image_extension)?;
        let planned: BTreeSet<&str> = plan.iter().map(|a| a.filename.as_str()).collect();

        let unlisted: Vec<&String> = on_disk
            .iter()
            .filter(|name| !planned.contains(name.as_str()))
            .collect();
        let missing = planned
            .iter()
            .filter(|name| !on_disk.contains(**name))
            .count();

        for name in &unlisted {
            debug!(file = %name, "Image has no metadata row");
        }
        if !unlisted.is_empty() {
            warn!(
                count = unlisted.len(),
                "Images in the source directory have no metadata row and are ignored"
            );
        }
        if missing > 0 {
            warn!(count = missing, "Images named by the metadata are missing from the source directory");
        }

        if config.mismatch_policy == MismatchPolicy::Fail && (!unlisted.is_empty() || missing > 0) {
            return Err(ConvertError::data(
                &config.source_dir,
                None,
                format!(
                    "{} images have no metadata row and {} metadata rows have no image",
                    unlisted.len(),
                    missing
                ),
            ));
        }

        Ok(unlisted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::progress::tests::RecordingProgressReporter;
    use crate::services::NoOpProgressReporter;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn fixture() -> (TempDir, ConversionConfig) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("img");
        fs::create_dir(&src).unwrap();
        for name in ["000001", "000002", "000003", "000004"] {
            fs::write(src.join(format!("{name}.png")), name.as_bytes()).unwrap();
        }
        fs::write(
            dir.path().join("attr.txt"),
            "4\nMale Smiling\n000001.jpg 1 -1\n000002.jpg -1 1\n000003.jpg 1 1\n000004.jpg -1 -1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("part.txt"),
            "000001.jpg 0\n000002.jpg 2\n000003.jpg 1\n000004.jpg 0\n",
        )
        .unwrap();

        let config = ConversionConfig::builder()
            .attr_table(dir.path().join("attr.txt"))
            .partition_table(dir.path().join("part.txt"))
            .attribute("Male")
            .source_dir(&src)
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        (dir, config)
    }

    #[test]
    fn test_run_end_to_end() {
        let (dir, config) = fixture();
        let reporter = RecordingProgressReporter::default();
        let summary = CelebaConverter::new(config).unwrap().run(&reporter).unwrap();

        assert_eq!(summary.joined, 4);
        assert_eq!(summary.transferred_total(), 4);
        assert!(summary.is_clean());
        assert_eq!(summary.planned["trainA"], 1);
        assert_eq!(summary.planned["trainB"], 1);
        assert_eq!(summary.planned["testA"], 1);
        assert_eq!(summary.planned["testB"], 1);

        let out = dir.path().join("out");
        assert_eq!(fs::read(out.join("trainA/000001.png")).unwrap(), b"000001");
        assert_eq!(fs::read(out.join("testB/000002.png")).unwrap(), b"000002");
        assert_eq!(fs::read(out.join("testA/000003.png")).unwrap(), b"000003");
        assert_eq!(fs::read(out.join("trainB/000004.png")).unwrap(), b"000004");

        let stages = reporter.stages.borrow();
        assert_eq!(stages.first(), Some(&ConversionStage::MetadataLoading));
        assert_eq!(stages.last(), Some(&ConversionStage::Completed));
    }

    #[test]
    fn test_unknown_attribute_writes_nothing() {
        let (dir, mut config) = fixture();
        config.attribute = "Foo".to_string();
        let err = CelebaConverter::new(config)
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (dir, mut config) = fixture();
        config.dry_run = true;
        let summary = CelebaConverter::new(config)
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap();
        assert_eq!(summary.planned_total(), 4);
        assert_eq!(summary.transferred_total(), 0);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_missing_image_is_counted_not_fatal() {
        let (dir, config) = fixture();
        fs::remove_file(dir.path().join("img/000003.png")).unwrap();
        fs::write(dir.path().join("img/999999.png"), b"stray").unwrap();

        let summary = CelebaConverter::new(config)
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap();
        assert_eq!(summary.transferred_total(), 3);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].filename, "000003.png");
        assert_eq!(summary.unlisted_images, 1);
    }

    #[test]
    fn test_strict_mode_fails_before_writing() {
        let (dir, mut config) = fixture();
        config.mismatch_policy = MismatchPolicy::Fail;
        fs::remove_file(dir.path().join("img/000003.png")).unwrap();

        let err = CelebaConverter::new(config)
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Data { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_names_sharing_one_image_are_placed_once() {
        let (dir, config) = fixture();
        fs::write(
            dir.path().join("attr.txt"),
            "Male\n000001.jpg 1\n000001.png -1\n000002.jpg -1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("part.txt"),
            "000001.jpg 0\n000001.png 0\n000002.jpg 2\n",
        )
        .unwrap();

        let summary = CelebaConverter::new(config.clone())
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap();
        assert_eq!(summary.joined, 3);
        assert_eq!(summary.transferred_total(), 2);
        assert_eq!(summary.skipped_rows.len(), 1);
        assert_eq!(summary.skipped_rows[0].filename.as_deref(), Some("000001.png"));
        assert!(dir.path().join("out/trainA/000001.png").is_file());
        assert!(!dir.path().join("out/trainB/000001.png").exists());

        fs::remove_dir_all(dir.path().join("out")).unwrap();
        let strict = ConversionConfig {
            mismatch_policy: MismatchPolicy::Fail,
            ..config
        };
        let err = CelebaConverter::new(strict)
            .unwrap()
            .run(&NoOpProgressReporter)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Data { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_summary_json_and_manifest() {
        let (dir, config) = fixture();
        let manifest_path = dir.path().join("out.sha256");
        let summary = CelebaConverter::new(config)
            .unwrap()
            .with_manifest(&manifest_path)
            .run(&NoOpProgressReporter)
            .unwrap();
        assert_eq!(summary.manifest.as_deref(), Some(manifest_path.as_path()));
        assert_eq!(fs::read_to_string(&manifest_path).unwrap().lines().count(), 4);

        let summary_path = dir.path().join("summary.json");
        summary.write_json(&summary_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(value["attribute"], "Male");
        assert_eq!(value["val_policy"], "merge-into-test");
        assert_eq!(value["transferred"]["trainA"], 1);
    }
}
