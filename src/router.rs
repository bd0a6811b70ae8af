//! Domain and split routing
//!
//! Maps every joined metadata row to exactly one output subdirectory. The
//! mapping is a pure function of the row, the val policy and the inversion
//! flag, so a plan is reproducible given identical inputs.

use crate::config::{ConversionConfig, ValPolicy};
use crate::metadata::{AttributeValue, DataIssue, JoinedRecord, Split};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Image collection of the unpaired dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Domain {
    A,
    B,
}

impl Domain {
    /// Present maps to A and absent to B, unless inverted
    #[must_use]
    pub fn for_value(value: AttributeValue, invert: bool) -> Self {
        let value = if invert { value.inverted() } else { value };
        match value {
            AttributeValue::Present => Self::A,
            AttributeValue::Absent => Self::B,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Split of the output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSplit {
    Train,
    Val,
    Test,
}

impl OutputSplit {
    /// Fold the curators' split according to `policy`
    #[must_use]
    pub fn for_split(split: Split, policy: ValPolicy) -> Self {
        match (split, policy) {
            (Split::Train, _) | (Split::Val, ValPolicy::MergeIntoTrain) => Self::Train,
            (Split::Val, ValPolicy::Separate) => Self::Val,
            (Split::Test, _) | (Split::Val, ValPolicy::MergeIntoTest) => Self::Test,
        }
    }

    /// Splits present in the output layout for `policy`
    #[must_use]
    pub fn all(policy: ValPolicy) -> &'static [Self] {
        match policy {
            ValPolicy::Separate => &[Self::Train, Self::Val, Self::Test],
            ValPolicy::MergeIntoTest | ValPolicy::MergeIntoTrain => &[Self::Train, Self::Test],
        }
    }
}

impl std::fmt::Display for OutputSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// One output subdirectory, e.g. `trainA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Bucket {
    pub split: OutputSplit,
    pub domain: Domain,
}

impl Bucket {
    #[must_use]
    pub fn new(split: OutputSplit, domain: Domain) -> Self {
        Self { split, domain }
    }

    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}{}", self.split, self.domain)
    }

    /// Every bucket of the layout, in `trainA, trainB, [valA, valB,] testA, testB` order
    #[must_use]
    pub fn all(policy: ValPolicy) -> Vec<Self> {
        OutputSplit::all(policy)
            .iter()
            .flat_map(|&split| [Self::new(split, Domain::A), Self::new(split, Domain::B)])
            .collect()
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.split, self.domain)
    }
}

/// Where one image goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAssignment {
    /// Filename on disk, shared by source and destination
    pub filename: String,
    pub source_path: PathBuf,
    pub bucket: Bucket,
}

impl OutputAssignment {
    #[must_use]
    pub fn dest_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.bucket.dir_name()).join(&self.filename)
    }
}

/// Swap the extension of a metadata filename for the on-disk one.
///
/// CelebA metadata lists `000001.jpg` while the aligned PNG release stores
/// `000001.png`.
#[must_use]
pub fn image_filename(index_name: &str, extension: &str) -> String {
    let stem = Path::new(index_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(index_name);
    format!("{stem}.{extension}")
}

/// Route a single joined record
#[must_use]
pub fn route(
    record: &JoinedRecord,
    source_dir: &Path,
    extension: &str,
    val_policy: ValPolicy,
    invert: bool,
) -> OutputAssignment {
    let filename = image_filename(&record.filename, extension);
    OutputAssignment {
        source_path: source_dir.join(&filename),
        bucket: Bucket::new(
            OutputSplit::for_split(record.split, val_policy),
            Domain::for_value(record.value, invert),
        ),
        filename,
    }
}

/// Every assignment of a run, grouped by bucket
#[derive(Debug, Clone)]
pub struct SplitPlan {
    buckets: Vec<Bucket>,
    assignments: BTreeMap<Bucket, Vec<OutputAssignment>>,
    issues: Vec<DataIssue>,
}

impl SplitPlan {
    /// Route every record; input order is kept within each bucket.
    ///
    /// Two metadata names that map to the same image on disk (`000001.jpg`
    /// and `000001.png`) would place one file twice. The first record wins;
    /// later ones are recorded in [`Self::issues`].
    #[must_use]
    pub fn build(records: &[JoinedRecord], config: &ConversionConfig) -> Self {
        let buckets = Bucket::all(config.val_policy);
        let mut assignments: BTreeMap<Bucket, Vec<OutputAssignment>> =
            buckets.iter().map(|b| (*b, Vec::new())).collect();
        let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
        let mut issues = Vec::new();

        for record in records {
            let assignment = route(
                record,
                &config.source_dir,
                &config.image_extension,
                config.val_policy,
                config.invert,
            );
            if let Some(first) = claimed.get(&assignment.filename) {
                issues.push(DataIssue::new(
                    &config.attr_table,
                    None,
                    Some(record.filename.as_str()),
                    format!(
                        "'{}' maps to image '{}' already taken by '{}'",
                        record.filename, assignment.filename, first
                    ),
                ));
                continue;
            }
            claimed.insert(assignment.filename.clone(), record.filename.as_str());
            assignments
                .entry(assignment.bucket)
                .or_default()
                .push(assignment);
        }

        Self {
            buckets,
            assignments,
            issues,
        }
    }

    /// Records dropped because their image was already assigned
    #[must_use]
    pub fn issues(&self) -> &[DataIssue] {
        &self.issues
    }

    /// Buckets in layout order
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[must_use]
    pub fn assignments(&self, bucket: Bucket) -> &[OutputAssignment] {
        self.assignments.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Assignments in layout order
    pub fn iter(&self) -> impl Iterator<Item = &OutputAssignment> {
        self.buckets.iter().flat_map(|b| self.assignments(*b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image count per subdirectory name
    #[must_use]
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.buckets
            .iter()
            .map(|b| (b.dir_name(), self.assignments(*b).len()))
            .collect()
    }
}
