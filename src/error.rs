//! Error taxonomy shared across the library.
//!
//! Expected, user-facing conditions (`NotFound`, `Conflict`,
//! `InvalidOperation`) are distinct variants so the CLI and HTTP layers can
//! map them to exit codes and status codes without string matching.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShelfError>;

#[derive(Debug, Error)]
pub enum ShelfError {
    /// Document, shelf, task, text, or archived file absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate shelf slug.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Mutating the reserved Unsorted shelf, or similar invalid request.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Source file missing, wrong extension, or unreadable content.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A PDF with no extractable text is reported distinctly; it usually
    /// means the source is image-only and needs OCR.
    #[error("no text could be extracted; the PDF may be image-only and require OCR")]
    NoExtractableText,

    /// External reader unavailable, timed out, or returned unparseable output.
    #[error("reader failed: {0}")]
    Reader(String),

    /// Filesystem read/write errors on index or record files.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ShelfError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ShelfError::NotFound(what.to_string())
    }

    pub fn storage(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        ShelfError::Storage(format!("{}: {}", context, err))
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(err: std::io::Error) -> Self {
        ShelfError::Storage(err.to_string())
    }
}
