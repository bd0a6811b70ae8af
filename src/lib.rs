#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # CelebA to CycleGAN dataset converter
//!
//! Turns the CelebA face-attribute dataset into the directory layout used for
//! unpaired image-to-image translation training:
//!
//! ```text
//! OUTPUT_DIR/
//!   trainA/  images with the attribute, train split
//!   trainB/  images without the attribute, train split
//!   testA/   images with the attribute, val + test splits
//!   testB/   images without the attribute, val + test splits
//! ```
//!
//! The conversion is one linear pass:
//!
//! 1. [`metadata`] parses `list_attr_celeba.txt` and `list_eval_partition.txt`
//!    and joins them on the image filename.
//! 2. [`router`] maps each joined row to a domain (A = attribute present) and
//!    an output split (val folds into test unless configured otherwise).
//! 3. [`materializer`] copies or links each image into its subdirectory,
//!    tolerating per-file failures.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use celeba_cyclegan::{convert, ConversionConfig, ValPolicy};
//!
//! # fn example() -> celeba_cyclegan::Result<()> {
//! let config = ConversionConfig::builder()
//!     .attr_table("list_attr_celeba.txt")
//!     .partition_table("list_eval_partition.txt")
//!     .attribute("Male")
//!     .source_dir("img_align_celeba_png")
//!     .output_dir("celeba_male")
//!     .val_policy(ValPolicy::MergeIntoTest)
//!     .build()?;
//!
//! let summary = convert(config)?;
//! println!("{} images placed, {} failed", summary.transferred_total(), summary.failures.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): the `convert_celeba` binary, progress bars and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod converter;
pub mod error;
pub mod manifest;
pub mod materializer;
pub mod metadata;
pub mod router;
pub mod services;
pub mod tracing_config;

pub use config::{
    ConversionConfig, ConversionConfigBuilder, ExistingOutput, MismatchPolicy, TransferMode,
    ValPolicy, DEFAULT_IMAGE_EXTENSION,
};
pub use converter::{CelebaConverter, ConversionSummary};
pub use error::{ConvertError, Result};
pub use materializer::{FileFailure, MaterializeReport};
pub use metadata::{AttributeValue, DataIssue, JoinedRecord, Split};
pub use router::{Bucket, Domain, OutputAssignment, OutputSplit, SplitPlan};
pub use services::{ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter};

/// Run a conversion without progress reporting
///
/// # Errors
/// - [`ConvertError::Config`] for invalid settings, missing inputs or an unknown attribute
/// - [`ConvertError::Io`] when a metadata table or the output root cannot be accessed
/// - [`ConvertError::Data`] for table mismatches under [`MismatchPolicy::Fail`]
pub fn convert(config: ConversionConfig) -> Result<ConversionSummary> {
    CelebaConverter::new(config)?.run(&NoOpProgressReporter)
}
