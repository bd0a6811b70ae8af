//! CelebA conversion CLI tool
//!
//! Command-line interface turning CelebA into a CycleGAN-style dataset.

use super::config::CliConfigBuilder;
use crate::{
    converter::{CelebaConverter, ConversionSummary},
    metadata::AttributeTable,
    services::{BucketProgress, ConsoleProgressReporter, ConversionStage, ProgressReporter},
    tracing_config::{init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Prepare CelebA dataset for CycleGAN training
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "convert_celeba")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Path to `list_attr_celeba.txt`
    #[arg(long = "list-attr", value_name = "PATH")]
    pub list_attr: PathBuf,

    /// Path to `list_eval_partition.txt`
    #[arg(long = "list-part", value_name = "PATH", required_unless_present = "show_attributes")]
    pub list_part: Option<PathBuf>,

    /// Attribute to perform a split on (e.g. `Male` or `Eyeglasses`). A list of
    /// all attributes can be found in the header of `list_attr_celeba.txt`
    #[arg(long, value_name = "ATTRIBUTE_NAME", required_unless_present = "show_attributes")]
    pub attr: Option<String>,

    /// Path to the extracted CelebA images (`img_align_celeba_png`)
    #[arg(value_name = "SOURCE_IMAGE_DIR", required_unless_present = "show_attributes")]
    pub source_dir: Option<PathBuf>,

    /// Output directory
    #[arg(value_name = "OUTPUT_DIR", required_unless_present = "show_attributes")]
    pub output_dir: Option<PathBuf>,

    /// Where validation-split images go
    #[arg(long, value_enum, default_value_t = CliValPolicy::Test)]
    pub val_policy: CliValPolicy,

    /// Keep the validation split in valA/valB (same as --val-policy separate)
    #[arg(long, conflicts_with = "val_policy")]
    pub separate_val: bool,

    /// Put images WITHOUT the attribute into domain A
    #[arg(long)]
    pub invert: bool,

    /// How images are placed into the output tree
    #[arg(short, long, value_enum, default_value_t = CliTransferMode::Copy)]
    pub mode: CliTransferMode,

    /// Extension of the images on disk; metadata filenames are mapped to it
    #[arg(long, value_name = "EXT", default_value = crate::DEFAULT_IMAGE_EXTENSION)]
    pub image_ext: String,

    /// Abort on any metadata or source-directory mismatch instead of skipping
    #[arg(long)]
    pub strict: bool,

    /// Refuse to run if the output directory already exists
    #[arg(long)]
    pub no_overwrite: bool,

    /// Plan the split and print counts without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the attributes named in the `--list-attr` header and exit
    #[arg(long)]
    pub show_attributes: bool,

    /// Write a sha256sum manifest of the output tree; without a value it goes
    /// to `<OUTPUT_DIR>.checksums.sha256` next to the output directory
    #[arg(long, value_name = "PATH", num_args = 0..=1, require_equals = true)]
    pub manifest: Option<Option<PathBuf>>,

    /// Write a JSON run summary to PATH
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Disable progress bars (log one line per subdirectory instead)
    #[arg(long)]
    pub no_progress: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliValPolicy {
    /// Merge val into testA/testB
    Test,
    /// Merge val into trainA/trainB
    Train,
    /// Keep val in valA/valB
    Separate,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliTransferMode {
    Copy,
    Symlink,
    Hardlink,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_attributes {
        return show_attributes(&cli.list_attr);
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid command-line arguments")?;
    let manifest_path = CliConfigBuilder::manifest_path(&cli, &config);

    info!("Starting CelebA conversion");
    info!("Attribute: {}, {}", config.attribute, config.val_policy);
    info!(
        "Source: {}, Output: {}",
        config.source_dir.display(),
        config.output_dir.display()
    );

    let mut converter =
        CelebaConverter::new(config).context("Failed to create CelebA converter")?;
    if let Some(path) = manifest_path {
        converter = converter.with_manifest(path);
    }

    let reporter: Box<dyn ProgressReporter> = if cli.no_progress || cli.dry_run {
        Box::new(ConsoleProgressReporter::new())
    } else {
        Box::new(IndicatifProgressReporter::new())
    };

    let start_time = Instant::now();
    let summary = match converter.run(reporter.as_ref()) {
        Ok(summary) => summary,
        Err(e) => {
            error!(kind = e.kind(), "Conversion aborted before completion");
            return Err(e).context("Conversion failed");
        },
    };

    print_summary(&summary, start_time.elapsed().as_secs_f64());

    if let Some(path) = &cli.summary {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(())
}

/// Initialize tracing based on verbosity level and format
fn init_tracing(cli: &Cli) -> Result<()> {
    let format = match cli.log_format {
        CliLogFormat::Console => TracingFormat::Console,
        CliLogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => TracingFormat::Json,
    };
    init_cli_tracing(cli.verbose, format)?;
    debug!(verbosity = cli.verbose, "Tracing initialized");
    Ok(())
}

/// Print attribute names available for `--attr`
fn show_attributes(path: &Path) -> Result<()> {
    let table = AttributeTable::load(path)
        .with_context(|| format!("Failed to load attribute table {}", path.display()))?;

    println!("Attributes in {} ({} images):", path.display(), table.len());
    for name in table.attributes() {
        println!("  • {name}");
    }
    Ok(())
}

fn print_summary(summary: &ConversionSummary, elapsed_secs: f64) {
    let title = if summary.dry_run {
        "Dry run plan"
    } else {
        "Conversion summary"
    };
    println!(
        "📊 {title} (attribute: {}, {}{})",
        summary.attribute,
        summary.val_policy,
        if summary.invert { ", inverted" } else { "" }
    );

    for (name, planned) in &summary.planned {
        if summary.dry_run {
            println!("  ├─ {name}: {planned}");
        } else {
            let placed = summary.transferred.get(name).copied().unwrap_or(0);
            println!("  ├─ {name}: {placed}/{planned}");
        }
    }
    println!("  ├─ Joined metadata rows: {}", summary.joined);
    println!("  ├─ Skipped metadata rows: {}", summary.skipped_rows.len());
    if summary.unlisted_images > 0 {
        println!("  ├─ Images without metadata: {}", summary.unlisted_images);
    }
    println!("  ├─ Failed files: {}", summary.failures.len());
    for failure in summary.failures.iter().take(10) {
        println!("  │    {}: {}", failure.filename, failure.error);
    }
    if summary.failures.len() > 10 {
        println!("  │    ... and {} more", summary.failures.len() - 10);
    }
    if let Some(manifest) = &summary.manifest {
        println!("  ├─ Manifest: {}", manifest.display());
    }
    println!("  └─ Total time: {elapsed_secs:.2}s");
}

/// One indicatif bar per output subdirectory
struct IndicatifProgressReporter {
    style: ProgressStyle,
    current: RefCell<Option<ProgressBar>>,
}

impl IndicatifProgressReporter {
    fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        Self {
            style,
            current: RefCell::new(None),
        }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_stage(&self, stage: ConversionStage) {
        debug!("{}", stage.description());
    }

    fn begin_bucket(&self, name: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(self.style.clone());
        pb.set_message(format!("Creating {name}"));
        *self.current.borrow_mut() = Some(pb);
    }

    fn advance(&self, _filename: &str) {
        if let Some(pb) = self.current.borrow().as_ref() {
            pb.inc(1);
        }
    }

    fn report_error(&self, _filename: &str, _error: &str) {
        // Already logged by the materializer; keep the bar intact
    }

    fn finish_bucket(&self, progress: &BucketProgress) {
        if let Some(pb) = self.current.borrow_mut().take() {
            pb.finish_with_message(format!(
                "{}: {} placed, {} failed",
                progress.name, progress.completed, progress.failed
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_required_surface() {
        let cli = Cli::try_parse_from([
            "convert_celeba",
            "--list-attr",
            "list_attr_celeba.txt",
            "--list-part",
            "list_eval_partition.txt",
            "--attr",
            "Male",
            "img_align_celeba_png",
            "celeba_male",
        ])
        .unwrap();

        assert_eq!(cli.list_attr, PathBuf::from("list_attr_celeba.txt"));
        assert_eq!(cli.attr.as_deref(), Some("Male"));
        assert_eq!(cli.source_dir, Some(PathBuf::from("img_align_celeba_png")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("celeba_male")));
        assert_eq!(cli.val_policy, CliValPolicy::Test);
        assert_eq!(cli.mode, CliTransferMode::Copy);
        assert_eq!(cli.image_ext, "png");
        assert!(!cli.separate_val);
    }

    #[test]
    fn test_cli_missing_attr_is_usage_error() {
        let err = Cli::try_parse_from([
            "convert_celeba",
            "--list-attr",
            "a.txt",
            "--list-part",
            "p.txt",
            "src",
            "out",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_show_attributes_needs_only_list_attr() {
        let cli =
            Cli::try_parse_from(["convert_celeba", "--list-attr", "a.txt", "--show-attributes"])
                .unwrap();
        assert!(cli.show_attributes);
        assert!(cli.attr.is_none());
    }

    #[test]
    fn test_cli_separate_val_conflicts_with_val_policy() {
        let result = Cli::try_parse_from([
            "convert_celeba",
            "--list-attr",
            "a.txt",
            "--list-part",
            "p.txt",
            "--attr",
            "Male",
            "--separate-val",
            "--val-policy",
            "train",
            "src",
            "out",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_manifest_value_is_optional() {
        let base = [
            "convert_celeba",
            "--list-attr",
            "a.txt",
            "--list-part",
            "p.txt",
            "--attr",
            "Male",
        ];

        let cli = Cli::try_parse_from(base.iter().copied().chain(["src", "out"])).unwrap();
        assert_eq!(cli.manifest, None);

        let cli = Cli::try_parse_from(base.iter().copied().chain(["--manifest", "src", "out"]))
            .unwrap();
        assert_eq!(cli.manifest, Some(None));
        assert_eq!(cli.source_dir, Some(PathBuf::from("src")));

        let cli = Cli::try_parse_from(
            base.iter()
                .copied()
                .chain(["--manifest=sums.sha256", "src", "out"]),
        )
        .unwrap();
        assert_eq!(cli.manifest, Some(Some(PathBuf::from("sums.sha256"))));
    }

    #[test]
    fn test_cli_verbose_count() {
        let cli = Cli::try_parse_from([
            "convert_celeba",
            "--list-attr",
            "a.txt",
            "--show-attributes",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
