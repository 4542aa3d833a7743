//! Error types for bincask operations
//!
//! All bincask errors are represented by the CaskError enum, which carries
//! enough context (paths, counts, reasons) to diagnose a failure without
//! re-running the operation.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Bincask error types with detailed context
#[derive(Debug, Clone)]
pub enum CaskError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// The manifest file exists but cannot be parsed
    ManifestCorrupted {
        /// Path to the manifest file
        path: PathBuf,
        /// Description of what was wrong
        reason: String,
    },

    /// Store was opened with a bin count different from the one it was created with
    BinCountMismatch {
        /// Store directory
        path: PathBuf,
        /// Bin count recorded in the manifest
        expected: usize,
        /// Bin count supplied by the caller
        found: usize,
    },

    /// Key or value exceeds the maximum encodable length
    OversizedRecord {
        /// Whether it's the key or the value that's oversized
        component: String,
        /// Size of the oversized component
        len: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Invalid engine configuration
    Config {
        /// Description of the invalid parameter
        reason: String,
    },
}

impl fmt::Display for CaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaskError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            CaskError::ManifestCorrupted { path, reason } => {
                write!(f, "Corrupted manifest {}: {}", path.display(), reason)
            }

            CaskError::BinCountMismatch { path, expected, found } => {
                write!(
                    f,
                    "Bin count mismatch for {}: store was created with {} bins, opened with {}",
                    path.display(),
                    expected,
                    found
                )
            }

            CaskError::OversizedRecord { component, len, max } => {
                write!(f, "Record {} too large: {} bytes exceeds limit of {} bytes", component, len, max)
            }

            CaskError::Config { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
        }
    }
}

impl Error for CaskError {}

/// Convert std::io::Error to CaskError::Io
impl From<std::io::Error> for CaskError {
    fn from(err: std::io::Error) -> Self {
        CaskError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for bincask operations
pub type CaskResult<T> = Result<T, CaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaskError::BinCountMismatch {
            path: PathBuf::from("/tmp/store"),
            expected: 512,
            found: 256,
        };

        let display = format!("{}", err);
        assert!(display.contains("512"));
        assert!(display.contains("256"));
        assert!(display.contains("/tmp/store"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cask_err: CaskError = io_err.into();

        match cask_err {
            CaskError::Io { kind, .. } => assert_eq!(kind, std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }
}
