//! Error types for the pdfxref object store.
//!
//! Only two kinds of failure are meant to reach callers of the public
//! document API: an unreadable byte source and an edit that has no safe
//! incremental representation. Everything else (dangling references,
//! reference cycles, truncated streams, broken index tables) is absorbed
//! into null values, truncation flags or an automatic repair.

use thiserror::Error;

/// Primary error type for object store operations.
#[derive(Error, Debug)]
pub enum PdfError {
    /// The byte source is empty or holds nothing that looks like a PDF.
    #[error("unreadable byte source: {0}")]
    Structural(String),

    /// The stored cross-reference index is missing or fails a sanity check.
    ///
    /// Raised internally to trigger repair; surfaced only when repair is
    /// disabled in [`DocumentOptions`](crate::document::DocumentOptions).
    #[error("cross-reference index is inconsistent: {0}")]
    IndexInconsistent(String),

    #[error("object {objid} cannot be solidified: its object stream does not parse")]
    Unsolidifiable { objid: u32 },

    #[error("object number {0} is outside the cross-reference table")]
    InvalidObjectNumber(u32),

    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PdfError {
    /// True when the error means "more bytes are needed", which matters
    /// for partially delivered sources.
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
