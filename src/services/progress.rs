//! Progress reporting service
//!
//! This module separates progress reporting concerns from the conversion
//! pipeline, allowing different frontends to implement their own progress
//! handling.

use std::time::Instant;
use tracing::{error, info};

/// Stages of a conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    /// Reading both metadata tables
    MetadataLoading,
    /// Joining tables and routing rows to subdirectories
    Routing,
    /// Comparing the source directory with the metadata
    SourceValidation,
    /// Creating the output subdirectories
    OutputPreparation,
    /// Copying or linking images into one subdirectory
    Materializing,
    /// Hashing the output tree
    ManifestWriting,
    /// Run finished
    Completed,
}

impl ConversionStage {
    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ConversionStage::MetadataLoading => "Loading metadata tables",
            ConversionStage::Routing => "Routing images to domains and splits",
            ConversionStage::SourceValidation => "Validating source images",
            ConversionStage::OutputPreparation => "Preparing output directory",
            ConversionStage::Materializing => "Materializing images",
            ConversionStage::ManifestWriting => "Writing checksum manifest",
            ConversionStage::Completed => "Conversion completed",
        }
    }
}

/// Counts reported when a subdirectory is finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketProgress {
    /// Subdirectory name, e.g. `trainA`
    pub name: String,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Trait for reporting progress during a conversion run
pub trait ProgressReporter {
    /// A pipeline stage started
    fn report_stage(&self, stage: ConversionStage);

    /// Materializing of subdirectory `name` starts with `total` images
    fn begin_bucket(&self, name: &str, total: usize);

    /// One image of the current subdirectory was handled
    fn advance(&self, filename: &str);

    /// One image failed; the run continues
    fn report_error(&self, filename: &str, error: &str);

    /// The current subdirectory is done
    fn finish_bucket(&self, progress: &BucketProgress);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_stage(&self, _stage: ConversionStage) {}

    fn begin_bucket(&self, _name: &str, _total: usize) {}

    fn advance(&self, _filename: &str) {}

    fn report_error(&self, _filename: &str, _error: &str) {}

    fn finish_bucket(&self, _progress: &BucketProgress) {}
}

/// Progress reporter that writes one log line per stage and subdirectory
pub struct ConsoleProgressReporter {
    started: Instant,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_stage(&self, stage: ConversionStage) {
        info!(
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "{}",
            stage.description()
        );
    }

    fn begin_bucket(&self, name: &str, total: usize) {
        info!("Creating {name} ({total} images)");
    }

    fn advance(&self, _filename: &str) {}

    fn report_error(&self, filename: &str, err: &str) {
        error!("Failed to materialize {filename}: {err}");
    }

    fn finish_bucket(&self, progress: &BucketProgress) {
        info!(
            "Finished {}: {}/{} images, {} failed",
            progress.name, progress.completed, progress.total, progress.failed
        );
    }
}
