//! Per-document configuration.
//!
//! ```ignore
//! use pdfxref_core::document::{DocumentOptions, PDFDocument};
//!
//! let options = DocumentOptions::new()
//!     .max_chain_depth(4)
//!     .allow_repair(false);
//! let doc = PDFDocument::open_with_options(source, options)?;
//! ```

use crate::codec::{Decryptor, FilterPipeline, StandardFilters};
use std::fmt;
use std::sync::Arc;

/// Default bound on `n 0 R` indirections followed by `resolve_chain`.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// Options for opening a [`PDFDocument`](super::PDFDocument).
#[derive(Clone)]
pub struct DocumentOptions {
    pub(crate) max_chain_depth: usize,
    pub(crate) allow_repair: bool,
    pub(crate) filters: Arc<dyn FilterPipeline>,
    pub(crate) decryptor: Option<Arc<dyn Decryptor>>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            allow_repair: true,
            filters: Arc::new(StandardFilters),
            decryptor: None,
        }
    }
}

impl fmt::Debug for DocumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOptions")
            .field("max_chain_depth", &self.max_chain_depth)
            .field("allow_repair", &self.allow_repair)
            .field("decryptor", &self.decryptor.is_some())
            .finish_non_exhaustive()
    }
}

impl DocumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many reference hops `resolve_chain` follows before giving
    /// up with null.
    ///
    /// # Arguments
    /// * `depth` - Maximum number of hops; 0 means references are never followed.
    pub const fn max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Enables or disables rebuilding the index by scanning the file when
    /// the stored index is broken. When disabled, opening such a file fails
    /// with `IndexInconsistent`.
    pub const fn allow_repair(mut self, allow: bool) -> Self {
        self.allow_repair = allow;
        self
    }

    /// Replaces the stream filter implementation.
    pub fn filters(mut self, filters: Arc<dyn FilterPipeline>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the decryptor used when the trailer declares `/Encrypt`.
    pub fn decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub const fn chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    pub const fn repair_allowed(&self) -> bool {
        self.allow_repair
    }
}
