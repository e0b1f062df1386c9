//! PDF document object store.
//!
//! This module contains:
//! - `store` - object resolution and caching
//! - `objstm` - object stream (container) parsing
//! - `repair` - index reconstruction by scanning the file
//! - `stream` - raw and decoded stream access
//! - `edit` - object edits, incremental layers and mark/rollback
//! - `progressive` - resolving objects from a partially delivered file
//! - `options` - per-document configuration

pub mod edit;
pub mod objstm;
pub mod options;
pub mod progressive;
pub mod repair;
pub mod store;
pub mod stream;

pub use options::{DEFAULT_MAX_CHAIN_DEPTH, DocumentOptions};
pub use progressive::Progress;
pub use repair::ScannedObject;
pub use stream::CompressedStream;

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject};
use crate::source::ByteSource;
use crate::xref::loader::load_revisions;
use crate::xref::{Entry, Revision, XrefTable};
use progressive::ProgressiveState;
use rustc_hash::FxHashSet;

/// A PDF file's object store: the layered cross-reference index, the
/// object cache, and the edit state.
///
/// One document is meant to be used from one thread at a time; every
/// operation that can fill the cache takes `&mut self`.
pub struct PDFDocument {
    source: Box<dyn ByteSource>,
    xref: XrefTable,
    options: DocumentOptions,
    /// Set once the index has been rebuilt by a scan. Repair runs at most once.
    repaired: bool,
    /// Number of the `/Encrypt` dictionary, which is never decrypted.
    encrypt_objid: Option<u32>,
    encrypted: bool,
    /// Revision counts saved by `mark()`.
    marks: Vec<usize>,
    /// Objects currently being loaded; re-entering one yields null.
    resolving: FxHashSet<u32>,
    progress: Option<ProgressiveState>,
}

impl std::fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFDocument")
            .field("len", &self.source.len())
            .field("revisions", &self.xref.revisions().len())
            .field("capacity", &self.xref.capacity())
            .field("repaired", &self.repaired)
            .field("encrypted", &self.encrypted)
            .finish_non_exhaustive()
    }
}

impl PDFDocument {
    fn with_source(source: Box<dyn ByteSource>, options: DocumentOptions) -> Self {
        Self {
            source,
            xref: XrefTable::new(),
            options,
            repaired: false,
            encrypt_objid: None,
            encrypted: false,
            marks: Vec::new(),
            resolving: FxHashSet::default(),
            progress: None,
        }
    }

    /// Open a fully available source with default options.
    pub fn open(source: impl ByteSource + 'static) -> Result<Self> {
        Self::open_with_options(source, DocumentOptions::default())
    }

    /// Open a fully available source.
    ///
    /// The stored index is loaded first; if it is missing, unreadable, or
    /// its `/Root` does not resolve, the index is rebuilt by scanning the
    /// file (unless repair is disabled in `options`).
    pub fn open_with_options(
        source: impl ByteSource + 'static,
        options: DocumentOptions,
    ) -> Result<Self> {
        if source.is_empty() || source.available().is_empty() {
            return Err(PdfError::Structural("empty source".into()));
        }
        if !source.is_complete() {
            return Err(PdfError::Structural(
                "source is still being delivered; use open_progressive".into(),
            ));
        }
        let mut doc = Self::with_source(Box::new(source), options);

        let err = match doc.load_stored_index() {
            Ok(()) => return Ok(doc),
            Err(err) => err,
        };
        if !doc.options.allow_repair {
            return Err(err);
        }
        if !doc.repaired {
            tracing::warn!(%err, "stored xref unusable, repairing");
            doc.repair()?;
        }
        Ok(doc)
    }

    fn load_stored_index(&mut self) -> Result<()> {
        let revisions = load_revisions(self.source.available(), self.options.filters.as_ref())?;
        self.xref = XrefTable::from_revisions(revisions);
        self.detect_encryption();
        if self.root_resolves() {
            return Ok(());
        }
        if self.repaired {
            // Resolving /Root already triggered a repair.
            return Err(PdfError::IndexInconsistent(
                "/Root does not resolve after repair".into(),
            ));
        }
        Err(PdfError::IndexInconsistent("/Root does not resolve".into()))
    }

    pub(crate) fn detect_encryption(&mut self) {
        let encrypt = self.xref.trailer().and_then(|t| t.get("Encrypt")).cloned();
        self.encrypted = encrypt.as_ref().is_some_and(|e| !e.is_null());
        self.encrypt_objid = match encrypt {
            Some(PDFObject::Ref(r)) => Some(r.objid),
            _ => None,
        };
    }

    pub(crate) fn root_resolves(&mut self) -> bool {
        let Some(root) = self.xref.trailer().and_then(|t| t.get("Root")).cloned() else {
            return false;
        };
        matches!(&*self.resolve_chain(&root), PDFObject::Dict(_))
    }

    /// The readable bytes of the source.
    pub fn data(&self) -> &[u8] {
        self.source.available()
    }

    pub const fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// True once the index has been rebuilt by scanning.
    pub const fn is_repaired(&self) -> bool {
        self.repaired
    }

    /// True when the trailer declares `/Encrypt`.
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The document trailer: the newest revision's trailer dictionary.
    pub fn trailer(&self) -> Option<&Dict> {
        self.xref.trailer()
    }

    /// Object-number ceiling: every valid number is below this.
    pub fn capacity(&self) -> u32 {
        self.xref.capacity()
    }

    /// Number of object slots, the same as [`capacity`](Self::capacity).
    pub fn count_objects(&self) -> u32 {
        self.xref.capacity()
    }

    /// Effective index entry for `objid`, for read-only introspection.
    pub fn entry(&self, objid: u32) -> &Entry {
        self.xref.lookup(objid)
    }

    /// The layered index, oldest revision first.
    pub fn revisions(&self) -> &[Revision] {
        self.xref.revisions()
    }

    pub const fn xref(&self) -> &XrefTable {
        &self.xref
    }

    /// Human-readable listing of every revision.
    pub fn print_xref(&self) -> String {
        self.xref.print_xref()
    }

    /// Reference to `objid` with the generation recorded in the index.
    pub fn reference(&self, objid: u32) -> PDFObjRef {
        PDFObjRef::new(objid, self.xref.lookup(objid).genno())
    }
}
