//! Configuration types for dataset conversion

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension of the aligned CelebA images on disk
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";

/// Where images of the curators' validation split end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValPolicy {
    /// Fold val into test (`testA`/`testB`)
    #[default]
    MergeIntoTest,
    /// Fold val into train (`trainA`/`trainB`)
    MergeIntoTrain,
    /// Keep val apart in `valA`/`valB`
    Separate,
}

impl std::fmt::Display for ValPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MergeIntoTest => write!(f, "val merged into test"),
            Self::MergeIntoTrain => write!(f, "val merged into train"),
            Self::Separate => write!(f, "val kept separate"),
        }
    }
}

/// How an image is placed into the output tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Copy the bytes unchanged
    #[default]
    Copy,
    /// Symbolic link pointing at the absolute source path
    Symlink,
    /// Hard link (source and output must share a filesystem)
    Hardlink,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Symlink => write!(f, "symlink"),
            Self::Hardlink => write!(f, "hardlink"),
        }
    }
}

/// Behaviour when the output directory already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingOutput {
    /// Reuse the directory, replacing files with the same name
    #[default]
    Overwrite,
    /// Abort before writing anything
    Refuse,
}

/// Behaviour when the metadata tables or the source directory disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Log and skip the inconsistent entry
    #[default]
    Skip,
    /// Abort before writing anything
    Fail,
}

/// Full description of one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Attribute annotation table (`list_attr_celeba.txt`)
    pub attr_table: PathBuf,
    /// Partition table (`list_eval_partition.txt`)
    pub partition_table: PathBuf,
    /// Attribute column that splits domain A from domain B
    pub attribute: String,
    /// Directory holding the extracted images
    pub source_dir: PathBuf,
    /// Directory receiving `trainA`, `trainB`, `testA`, `testB`
    pub output_dir: PathBuf,
    pub val_policy: ValPolicy,
    /// Map attribute-absent images to A instead of B
    pub invert: bool,
    pub transfer_mode: TransferMode,
    pub existing_output: ExistingOutput,
    pub mismatch_policy: MismatchPolicy,
    /// Extension of images on disk, without the leading dot
    pub image_extension: String,
    /// Plan only, write nothing
    pub dry_run: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            attr_table: PathBuf::new(),
            partition_table: PathBuf::new(),
            attribute: String::new(),
            source_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            val_policy: ValPolicy::default(),
            invert: false,
            transfer_mode: TransferMode::default(),
            existing_output: ExistingOutput::default(),
            mismatch_policy: MismatchPolicy::default(),
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            dry_run: false,
        }
    }
}

impl ConversionConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder::new()
    }

    /// Validate the configuration without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        require_path(&self.attr_table, "attribute table path")?;
        require_path(&self.partition_table, "partition table path")?;
        require_path(&self.source_dir, "source image directory")?;
        require_path(&self.output_dir, "output directory")?;

        if self.attribute.trim().is_empty() {
            return Err(ConvertError::config("Attribute name must not be empty"));
        }
        if self.attribute.chars().any(|c| c.is_whitespace() || c == ',') {
            return Err(ConvertError::config(format!(
                "Attribute name '{}' must not contain whitespace or commas",
                self.attribute
            )));
        }

        if self.image_extension.is_empty()
            || !self
                .image_extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConvertError::config(format!(
                "Invalid image extension '{}'",
                self.image_extension
            )));
        }

        if self.source_dir == self.output_dir {
            return Err(ConvertError::config(
                "Output directory must differ from the source image directory",
            ));
        }

        Ok(())
    }

    /// Check that every input named by the configuration exists.
    ///
    /// Runs before any output is written; every failure is a configuration
    /// error.
    pub fn check_inputs(&self) -> Result<()> {
        if !self.attr_table.is_file() {
            return Err(ConvertError::config(format!(
                "Attribute table not found: {}",
                self.attr_table.display()
            )));
        }
        if !self.partition_table.is_file() {
            return Err(ConvertError::config(format!(
                "Partition table not found: {}",
                self.partition_table.display()
            )));
        }
        if !self.source_dir.is_dir() {
            return Err(ConvertError::config(format!(
                "Source image directory not found: {}",
                self.source_dir.display()
            )));
        }
        if self.output_dir.is_file() {
            return Err(ConvertError::config(format!(
                "Output path exists and is a file, not a directory: {}",
                self.output_dir.display()
            )));
        }
        if self.existing_output == ExistingOutput::Refuse && self.output_dir.exists() {
            return Err(ConvertError::config(format!(
                "Output directory '{}' exists. Refusing to overwrite",
                self.output_dir.display()
            )));
        }
        Ok(())
    }
}

fn require_path(path: &Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ConvertError::config(format!("Missing {what}")));
    }
    Ok(())
}

/// Builder for [`ConversionConfig`]
#[derive(Debug, Default)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attr_table<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.attr_table = path.into();
        self
    }

    #[must_use]
    pub fn partition_table<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.partition_table = path.into();
        self
    }

    #[must_use]
    pub fn attribute<S: Into<String>>(mut self, attribute: S) -> Self {
        self.config.attribute = attribute.into();
        self
    }

    #[must_use]
    pub fn source_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.source_dir = path.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.output_dir = path.into();
        self
    }

    #[must_use]
    pub fn val_policy(mut self, policy: ValPolicy) -> Self {
        self.config.val_policy = policy;
        self
    }

    #[must_use]
    pub fn invert(mut self, invert: bool) -> Self {
        self.config.invert = invert;
        self
    }

    #[must_use]
    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.config.transfer_mode = mode;
        self
    }

    #[must_use]
    pub fn existing_output(mut self, policy: ExistingOutput) -> Self {
        self.config.existing_output = policy;
        self
    }

    #[must_use]
    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.config.mismatch_policy = policy;
        self
    }

    /// Extension of images on disk; a leading dot is accepted and stripped
    #[must_use]
    pub fn image_extension<S: AsRef<str>>(mut self, ext: S) -> Self {
        self.config.image_extension = ext.as_ref().trim_start_matches('.').to_ascii_lowercase();
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<ConversionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_builder() -> ConversionConfigBuilder {
        ConversionConfig::builder()
            .attr_table("list_attr_celeba.txt")
            .partition_table("list_eval_partition.txt")
            .attribute("Male")
            .source_dir("img_align_celeba_png")
            .output_dir("celeba_male")
    }

    #[test]
    fn test_default_config() {
        let config = ConversionConfig::default();
        assert_eq!(config.val_policy, ValPolicy::MergeIntoTest);
        assert_eq!(config.transfer_mode, TransferMode::Copy);
        assert_eq!(config.existing_output, ExistingOutput::Overwrite);
        assert_eq!(config.mismatch_policy, MismatchPolicy::Skip);
        assert_eq!(config.image_extension, "png");
        assert!(!config.invert);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_builder() {
        let config = valid_builder()
            .val_policy(ValPolicy::Separate)
            .transfer_mode(TransferMode::Symlink)
            .image_extension(".JPG")
            .invert(true)
            .build()
            .unwrap();

        assert_eq!(config.attribute, "Male");
        assert_eq!(config.val_policy, ValPolicy::Separate);
        assert_eq!(config.transfer_mode, TransferMode::Symlink);
        assert_eq!(config.image_extension, "jpg");
        assert!(config.invert);
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_builder().attribute("").build().is_err());
        assert!(valid_builder().attribute("Big Nose").build().is_err());
        assert!(valid_builder().image_extension("").build().is_err());
        assert!(valid_builder().image_extension("p/ng").build().is_err());
        assert!(valid_builder().output_dir("img_align_celeba_png").build().is_err());

        let err = ConversionConfig::builder().attribute("Male").build().unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
        assert!(err.to_string().contains("attribute table"));
    }

    #[test]
    fn test_check_inputs() {
        let dir = tempdir().unwrap();
        let attr = dir.path().join("attr.txt");
        let part = dir.path().join("part.txt");
        let src = dir.path().join("images");
        std::fs::write(&attr, "").unwrap();
        std::fs::write(&part, "").unwrap();
        std::fs::create_dir(&src).unwrap();

        let config = ConversionConfig::builder()
            .attr_table(&attr)
            .partition_table(&part)
            .attribute("Male")
            .source_dir(&src)
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        assert!(config.check_inputs().is_ok());

        let missing = ConversionConfig {
            partition_table: dir.path().join("nope.txt"),
            ..config.clone()
        };
        let err = missing.check_inputs().unwrap_err();
        assert!(err.to_string().contains("Partition table not found"));

        let refuse = ConversionConfig {
            output_dir: src.clone(),
            existing_output: ExistingOutput::Refuse,
            ..config
        };
        let err = refuse.check_inputs().unwrap_err();
        assert!(err.to_string().contains("Refusing to overwrite"));
    }

    #[test]
    fn test_val_policy_serde_names() {
        let json = serde_json::to_string(&ValPolicy::MergeIntoTest).unwrap();
        assert_eq!(json, "\"merge-into-test\"");
        let mode: TransferMode = serde_json::from_str("\"hardlink\"").unwrap();
        assert_eq!(mode, TransferMode::Hardlink);
    }
}
