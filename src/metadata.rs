//! CelebA metadata loading
//!
//! Parses the attribute annotation table (`list_attr_celeba.txt`) and the
//! evaluation partition table (`list_eval_partition.txt`) and joins them on
//! the image filename.
//!
//! Both files are whitespace separated in the official release; comma
//! separated exports are accepted as well. The attribute table layout is:
//!
//! ```text
//! 202599
//! 5_o_Clock_Shadow Arched_Eyebrows ... Young
//! 000001.jpg -1  1  1 ... 1
//! ```
//!
//! The leading count line is optional, and the header may also name the
//! index column (`image_id,5_o_Clock_Shadow,...`).

use crate::config::MismatchPolicy;
use crate::error::{ConvertError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Value of a binary attribute for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    /// Annotated `+1`
    Present,
    /// Annotated `-1` (or `0`)
    Absent,
}

impl AttributeValue {
    /// Positive values mean present, everything else absent
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        if raw > 0 {
            Self::Present
        } else {
            Self::Absent
        }
    }

    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::Present => Self::Absent,
            Self::Absent => Self::Present,
        }
    }
}

/// Partition assigned by the dataset curators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// Decode the integer code used by `list_eval_partition.txt`
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Train),
            1 => Some(Self::Val),
            2 => Some(Self::Test),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Train => 0,
            Self::Val => 1,
            Self::Test => 2,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub filename: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRecord {
    pub filename: String,
    pub split: Split,
}

/// Inner join of one attribute row and one partition row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRecord {
    pub filename: String,
    pub value: AttributeValue,
    pub split: Split,
}

/// A metadata row that was rejected and skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataIssue {
    /// Metadata file the row came from
    pub path: PathBuf,
    /// 1-based line number, when the issue concerns a single line
    pub line: Option<usize>,
    pub filename: Option<String>,
    pub message: String,
}

impl DataIssue {
    pub(crate) fn new<P: AsRef<Path>, S: Into<String>>(
        path: P,
        line: Option<usize>,
        filename: Option<&str>,
        message: S,
    ) -> Self {
        let issue = Self {
            path: path.as_ref().to_path_buf(),
            line,
            filename: filename.map(str::to_string),
            message: message.into(),
        };
        warn!(
            path = %issue.path.display(),
            line = ?issue.line,
            "Skipping metadata row: {}",
            issue.message
        );
        issue
    }

    /// Convert into the error raised when mismatches are fatal
    #[must_use]
    pub fn to_error(&self) -> ConvertError {
        ConvertError::data(&self.path, self.line, self.message.clone())
    }
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .collect()
}

fn read_table(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ConvertError::file_io_error("read metadata table", path, e))
}

/// Non-empty lines with their 1-based line numbers
fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, tokenize(line)))
        .filter(|(_, tokens)| !tokens.is_empty())
}

/// Whether a header of `header_width` tokens also names the index column.
///
/// Decided by majority over all data rows: a row is either as wide as the
/// header (index column named) or one wider (it is not). A minority of
/// malformed rows cannot flip the layout.
fn header_names_index_column(header_width: usize, rows: &[(usize, Vec<&str>)]) -> bool {
    let mut widths: BTreeMap<usize, usize> = BTreeMap::new();
    for (_, tokens) in rows {
        *widths.entry(tokens.len()).or_default() += 1;
    }
    let named = widths.get(&header_width).copied().unwrap_or(0);
    let unnamed = widths.get(&(header_width + 1)).copied().unwrap_or(0);
    named > unnamed
}

/// Parsed attribute annotation table
#[derive(Debug, Clone)]
pub struct AttributeTable {
    path: PathBuf,
    attributes: Vec<String>,
    /// Rows in file order, one sign per attribute column
    rows: Vec<(String, Vec<i8>)>,
    declared_count: Option<usize>,
    issues: Vec<DataIssue>,
}

impl AttributeTable {
    /// Load an attribute table from disk.
    ///
    /// Structural problems (unreadable file, missing header) are returned as
    /// errors; individual malformed rows are recorded in [`Self::issues`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = read_table(path)?;
        let table = Self::parse(path, &text)?;
        info!(
            path = %path.display(),
            rows = table.rows.len(),
            attributes = table.attributes.len(),
            "Loaded attribute table"
        );
        Ok(table)
    }

    /// Parse attribute table text; `path` is only used for diagnostics
    pub fn parse<P: AsRef<Path>>(path: P, text: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut lines = numbered_lines(text).peekable();

        let mut declared_count = None;
        if let Some((_, tokens)) = lines.peek() {
            if let [count] = tokens.as_slice() {
                if let Ok(count) = count.parse::<usize>() {
                    declared_count = Some(count);
                    lines.next();
                }
            }
        }

        let Some((header_line, header)) = lines.next() else {
            return Err(ConvertError::data(path, None, "missing attribute header line"));
        };
        let mut attributes: Vec<String> = header.iter().map(|s| (*s).to_string()).collect();
        let data: Vec<(usize, Vec<&str>)> = lines.collect();

        if attributes.len() > 1 && header_names_index_column(attributes.len(), &data) {
            debug!(line = header_line, "Header names the index column");
            attributes.remove(0);
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut issues = Vec::new();

        for (line_no, tokens) in data {
            let Some((filename, values)) = tokens.split_first() else {
                continue;
            };

            if values.len() != attributes.len() {
                issues.push(DataIssue::new(
                    path,
                    Some(line_no),
                    Some(*filename),
                    format!(
                        "expected {} attribute values for '{}', found {}",
                        attributes.len(),
                        filename,
                        values.len()
                    ),
                ));
                continue;
            }

            let parsed: std::result::Result<Vec<i8>, &str> = values
                .iter()
                .map(|v| v.parse::<i64>().map(|n| n.signum() as i8).map_err(|_| *v))
                .collect();
            let signs = match parsed {
                Ok(signs) => signs,
                Err(bad) => {
                    issues.push(DataIssue::new(
                        path,
                        Some(line_no),
                        Some(*filename),
                        format!("invalid attribute value '{bad}' for '{filename}'"),
                    ));
                    continue;
                },
            };

            if !seen.insert((*filename).to_string()) {
                issues.push(DataIssue::new(
                    path,
                    Some(line_no),
                    Some(*filename),
                    format!("duplicate entry for '{filename}'"),
                ));
                continue;
            }

            rows.push(((*filename).to_string(), signs));
        }

        if attributes.is_empty() {
            return Err(ConvertError::data(
                path,
                Some(header_line),
                "attribute header names no columns",
            ));
        }

        if let Some(count) = declared_count {
            if count != rows.len() {
                warn!(
                    path = %path.display(),
                    declared = count,
                    loaded = rows.len(),
                    "Attribute table row count differs from its declared count"
                );
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            attributes,
            rows,
            declared_count,
            issues,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attribute names in header order
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    #[must_use]
    pub fn declared_count(&self) -> Option<usize> {
        self.declared_count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> &[DataIssue] {
        &self.issues
    }

    /// Column index of `name`, or a configuration error listing every
    /// supported attribute
    pub fn column(&self, name: &str) -> Result<usize> {
        self.attributes
            .iter()
            .position(|a| a == name)
            .ok_or_else(|| {
                ConvertError::config(format!(
                    "Unknown attribute '{}'. Supported: {}",
                    name,
                    self.attributes.join(", ")
                ))
            })
    }

    /// Records of a single attribute column, in file order
    pub fn records(&self, column: usize) -> impl Iterator<Item = AttributeRecord> + '_ {
        self.rows.iter().filter_map(move |(filename, signs)| {
            signs.get(column).map(|sign| AttributeRecord {
                filename: filename.clone(),
                value: AttributeValue::from_raw(i64::from(*sign)),
            })
        })
    }
}

/// Column names used for the split code in known partition table exports
fn is_partition_header(token: &str) -> bool {
    matches!(
        token.to_ascii_lowercase().as_str(),
        "partition" | "split" | "eval_status" | "evaluation_status"
    )
}

/// Parsed evaluation partition table
#[derive(Debug, Clone)]
pub struct PartitionTable {
    path: PathBuf,
    records: Vec<PartitionRecord>,
    issues: Vec<DataIssue>,
}

impl PartitionTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = read_table(path)?;
        let table = Self::parse(path, &text);
        info!(
            path = %path.display(),
            rows = table.records.len(),
            "Loaded partition table"
        );
        Ok(table)
    }

    /// Parse partition table text; `path` is only used for diagnostics
    pub fn parse<P: AsRef<Path>>(path: P, text: &str) -> Self {
        let path = path.as_ref();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut issues = Vec::new();
        let mut first = true;

        for (line_no, tokens) in numbered_lines(text) {
            let is_first = std::mem::take(&mut first);

            let [filename, code] = tokens.as_slice() else {
                issues.push(DataIssue::new(
                    path,
                    Some(line_no),
                    tokens.first().copied(),
                    format!("expected 'filename split', found {} fields", tokens.len()),
                ));
                continue;
            };

            let split = match code.parse::<u8>().ok().and_then(Split::from_code) {
                Some(split) => split,
                None if is_first && code.parse::<i64>().is_err() => {
                    if is_partition_header(code) {
                        debug!(line = line_no, "Skipping partition table header");
                    } else {
                        warn!(
                            path = %path.display(),
                            line = line_no,
                            token = %code,
                            "First partition row has a non-numeric split code; treating it as a header"
                        );
                    }
                    continue;
                },
                None => {
                    issues.push(DataIssue::new(
                        path,
                        Some(line_no),
                        Some(*filename),
                        format!("invalid split code '{code}' for '{filename}' (expected 0, 1 or 2)"),
                    ));
                    continue;
                },
            };

            if !seen.insert((*filename).to_string()) {
                issues.push(DataIssue::new(
                    path,
                    Some(line_no),
                    Some(*filename),
                    format!("duplicate entry for '{filename}'"),
                ));
                continue;
            }

            records.push(PartitionRecord {
                filename: (*filename).to_string(),
                split,
            });
        }

        Self {
            path: path.to_path_buf(),
            records,
            issues,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn records(&self) -> &[PartitionRecord] {
        &self.records
    }

    #[must_use]
    pub fn issues(&self) -> &[DataIssue] {
        &self.issues
    }
}

/// Result of joining both tables for one attribute
#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub attribute: String,
    /// Sorted by filename
    pub records: Vec<JoinedRecord>,
    /// Every skipped row of either table, including join mismatches
    pub issues: Vec<DataIssue>,
}

/// Join the attribute column `attribute` with the partition table.
///
/// Fails with a configuration error when `attribute` is not a column. A
/// filename present in only one table is skipped with a warning, or aborts
/// the join under [`MismatchPolicy::Fail`]; the same holds for rows rejected
/// while parsing either table.
pub fn join(
    attrs: &AttributeTable,
    parts: &PartitionTable,
    attribute: &str,
    policy: MismatchPolicy,
) -> Result<JoinedTable> {
    let column = attrs.column(attribute)?;

    let mut issues: Vec<DataIssue> = attrs
        .issues()
        .iter()
        .chain(parts.issues())
        .cloned()
        .collect();

    let mut splits: BTreeMap<&str, Split> = parts
        .records()
        .iter()
        .map(|r| (r.filename.as_str(), r.split))
        .collect();

    let mut records = Vec::with_capacity(attrs.len());
    for record in attrs.records(column) {
        match splits.remove(record.filename.as_str()) {
            Some(split) => records.push(JoinedRecord {
                filename: record.filename,
                value: record.value,
                split,
            }),
            None => issues.push(DataIssue::new(
                attrs.path(),
                None,
                Some(record.filename.as_str()),
                format!(
                    "'{}' is missing from partition table '{}'",
                    record.filename,
                    parts.path().display()
                ),
            )),
        }
    }

    for filename in splits.keys() {
        issues.push(DataIssue::new(
            parts.path(),
            None,
            Some(*filename),
            format!(
                "'{}' is missing from attribute table '{}'",
                filename,
                attrs.path().display()
            ),
        ));
    }

    if policy == MismatchPolicy::Fail {
        if let Some(issue) = issues.first() {
            return Err(issue.to_error());
        }
    }

    records.sort_by(|a, b| a.filename.cmp(&b.filename));

    info!(
        attribute = %attribute,
        joined = records.len(),
        skipped = issues.len(),
        "Joined metadata tables"
    );

    Ok(JoinedTable {
        attribute: attribute.to_string(),
        records,
        issues,
    })
}
