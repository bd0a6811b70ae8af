//! Error types for dataset conversion operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Error kinds raised while converting a CelebA dataset
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Missing or invalid arguments, unknown attribute name. Always fatal.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed or inconsistent metadata row
    #[error("Data error in '{}'{}: {message}", .path.display(), line_suffix(.line))]
    Data {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    /// Unreadable source or unwritable destination
    #[error("Failed to {operation} '{}': {source}", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Summary serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|n| format!(" (line {n})")).unwrap_or_default()
}

impl ConvertError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a data error pointing at a line of a metadata file
    pub fn data<P: AsRef<Path>, S: Into<String>>(path: P, line: Option<usize>, msg: S) -> Self {
        Self::Data {
            path: path.as_ref().to_path_buf(),
            line,
            message: msg.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: std::io::Error) -> Self {
        Self::Io {
            operation: operation.to_string(),
            path: path.as_ref().to_path_buf(),
            source: error,
        }
    }

    /// Short label of the error kind.
    ///
    /// Recorded with every per-file failure in the run summary and attached
    /// to the log line of an aborted run.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Data { .. } => "data",
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_display_includes_line() {
        let err = ConvertError::data("list_attr.txt", Some(7), "bad value 'x'");
        assert_eq!(
            err.to_string(),
            "Data error in 'list_attr.txt' (line 7): bad value 'x'"
        );

        let err = ConvertError::data("list_part.txt", None, "missing rows");
        assert_eq!(err.to_string(), "Data error in 'list_part.txt': missing rows");
    }

    #[test]
    fn test_io_error_display() {
        let err = ConvertError::file_io_error(
            "copy image",
            "/src/000001.png",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to copy image '/src/000001.png': no such file"
        );
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ConvertError::config("unknown attribute").kind(), "config");
        assert_eq!(ConvertError::data("a", None, "b").kind(), "data");
        let err: ConvertError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
