//! Error types for the segmeta library.
//!
//! All errors are represented by the [`SegmentError`] enum. Two classes of
//! failure matter to callers of this crate:
//!
//! - Absence (a missing manifest, index or patch directory) is never an
//!   error. It surfaces as `Ok(None)`, `Ok(false)` or a zero size.
//! - Corruption (a sub-segment missing under a resolved parent, an invalid
//!   patch file name, duplicate patches) is reported as
//!   [`SegmentError::IndexCollapsed`] and must abort the enclosing operation.
//!
//! # Examples
//!
//! ```
//! use segmeta::error::{SegmentError, Result};
//!
//! fn check_patch(src: i32, dst: i32) -> Result<()> {
//!     if src <= dst {
//!         return Err(SegmentError::index_collapsed(format!(
//!             "patch source segment {src} must be newer than {dst}"
//!         )));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_patch(3, 5).unwrap_err().is_index_collapsed());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for segmeta operations.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// I/O errors raised by a directory backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A file or directory that the caller required is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted metadata exists but cannot be parsed.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Structural invariant of an index is violated.
    #[error("Index collapsed: {0}")]
    IndexCollapsed(String),

    /// Schema-related errors
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for operations that may fail with SegmentError.
pub type Result<T> = std::result::Result<T, SegmentError>;

impl SegmentError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        SegmentError::Storage(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SegmentError::NotFound(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        SegmentError::Corruption(msg.into())
    }

    /// Create a new index collapsed error.
    pub fn index_collapsed<S: Into<String>>(msg: S) -> Self {
        SegmentError::IndexCollapsed(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        SegmentError::Schema(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SegmentError::InvalidArgument(msg.into())
    }

    /// Whether this error reports malformed persisted content.
    pub fn is_corruption(&self) -> bool {
        matches!(self, SegmentError::Corruption(_) | SegmentError::Json(_))
    }

    /// Whether this error reports a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            SegmentError::NotFound(_) => true,
            SegmentError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error is a fatal index invariant violation.
    pub fn is_index_collapsed(&self) -> bool {
        matches!(self, SegmentError::IndexCollapsed(_))
    }
}
