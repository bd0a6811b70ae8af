//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliTransferMode, CliValPolicy};
use crate::config::{
    ConversionConfig, ExistingOutput, MismatchPolicy, TransferMode, ValPolicy,
};
use crate::manifest::default_manifest_path;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Convert CLI arguments to a [`ConversionConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ConversionConfig> {
        let list_part = cli
            .list_part
            .as_ref()
            .context("--list-part is required")?;
        let attr = cli.attr.as_ref().context("--attr is required")?;
        let source_dir = cli
            .source_dir
            .as_ref()
            .context("SOURCE_IMAGE_DIR is required")?;
        let output_dir = cli.output_dir.as_ref().context("OUTPUT_DIR is required")?;

        let val_policy = if cli.separate_val {
            ValPolicy::Separate
        } else {
            match cli.val_policy {
                CliValPolicy::Test => ValPolicy::MergeIntoTest,
                CliValPolicy::Train => ValPolicy::MergeIntoTrain,
                CliValPolicy::Separate => ValPolicy::Separate,
            }
        };

        let transfer_mode = match cli.mode {
            CliTransferMode::Copy => TransferMode::Copy,
            CliTransferMode::Symlink => TransferMode::Symlink,
            CliTransferMode::Hardlink => TransferMode::Hardlink,
        };

        let config = ConversionConfig::builder()
            .attr_table(&cli.list_attr)
            .partition_table(list_part)
            .attribute(attr)
            .source_dir(source_dir)
            .output_dir(output_dir)
            .val_policy(val_policy)
            .invert(cli.invert)
            .transfer_mode(transfer_mode)
            .existing_output(if cli.no_overwrite {
                ExistingOutput::Refuse
            } else {
                ExistingOutput::Overwrite
            })
            .mismatch_policy(if cli.strict {
                MismatchPolicy::Fail
            } else {
                MismatchPolicy::Skip
            })
            .image_extension(&cli.image_ext)
            .dry_run(cli.dry_run)
            .build()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Manifest destination requested by `--manifest`, if any
    pub(crate) fn manifest_path(cli: &Cli, config: &ConversionConfig) -> Option<PathBuf> {
        cli.manifest.as_ref().map(|path| {
            path.clone()
                .unwrap_or_else(|| default_manifest_path(&config.output_dir))
        })
    }
}
