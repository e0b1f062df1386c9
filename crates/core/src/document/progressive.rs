//! Resolving objects from a file that is still arriving.
//!
//! While the source is incomplete the stored index (which sits at the end
//! of the file) is usually unreachable, so objects are indexed by scanning
//! the delivered prefix as it grows. Asking for an object that has not
//! arrived yet returns [`Progress::Pending`]; nothing blocks. Once the last
//! byte arrives the document settles on its stored index, or on a repaired
//! one when that does not hold up.

use super::PDFDocument;
use super::options::DocumentOptions;
use super::repair::scan_objects;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};
use crate::source::ByteSource;
use crate::xref::loader::load_revisions;
use crate::xref::{Entry, EntryKind, Revision, RevisionOrigin, XrefTable};
use std::sync::Arc;

/// Outcome of polling for an object.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The object is available. Null for free or unknown numbers once the
    /// whole file is present.
    Ready(Arc<PDFObject>),
    /// The object's bytes have not arrived yet. Poll again after feeding.
    Pending,
}

impl Progress {
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ProgressiveState {
    /// Where the next scan of the delivered prefix starts.
    pub scan_pos: usize,
    /// Set once the whole file is present and the final index chosen.
    pub settled: bool,
}

impl PDFDocument {
    /// Open a source that may still be receiving data.
    pub fn open_progressive(source: impl ByteSource + 'static) -> Result<Self> {
        Self::open_progressive_with_options(source, DocumentOptions::default())
    }

    pub fn open_progressive_with_options(
        source: impl ByteSource + 'static,
        options: DocumentOptions,
    ) -> Result<Self> {
        if source.is_empty() {
            return Err(PdfError::Structural("empty source".into()));
        }
        if source.is_complete() {
            return Self::open_with_options(source, options);
        }
        let mut doc = Self::with_source(Box::new(source), options);
        doc.xref
            .push_revision(Revision::new(RevisionOrigin::Scanned));
        doc.progress = Some(ProgressiveState::default());
        doc.scan_delivered();
        Ok(doc)
    }

    /// True while the document is indexed from a partial scan.
    pub fn is_progressive(&self) -> bool {
        self.progress.is_some_and(|state| !state.settled)
    }

    /// Bytes delivered so far.
    pub fn available_len(&self) -> usize {
        self.source.available().len()
    }

    /// Hand the next chunk of the file to the document.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.source.append(chunk)?;
        if self.is_progressive() {
            self.scan_delivered();
            if self.source.is_complete() {
                self.settle()?;
            }
        }
        Ok(())
    }

    /// Poll for object `objid`.
    pub fn progressive_advance(&mut self, objid: u32) -> Result<Progress> {
        if !self.is_progressive() {
            return Ok(Progress::Ready(self.cache_object(objid)));
        }
        let entry = self.xref.lookup(objid);
        if entry.is_free() {
            return Ok(Progress::Pending);
        }
        let value = self.cache_object(objid);
        if self.xref.lookup(objid).obj.is_some() {
            Ok(Progress::Ready(value))
        } else {
            Ok(Progress::Pending)
        }
    }

    /// Poll for the object `r` refers to.
    pub fn progressive_advance_ref(&mut self, r: PDFObjRef) -> Result<Progress> {
        self.progressive_advance(r.objid)
    }

    /// Index the objects that became complete since the last scan.
    fn scan_delivered(&mut self) {
        let Some(mut state) = self.progress else {
            return;
        };
        let scan = scan_objects(self.source.available(), state.scan_pos, false);
        state.scan_pos = scan.end.max(state.scan_pos);
        self.progress = Some(state);
        if scan.objects.is_empty() && scan.trailers.is_empty() {
            return;
        }

        let scanned = &mut self.xref.revisions_mut()[0];
        for obj in &scan.objects {
            let entry = scanned.entry_mut_or_insert(obj.objid);
            *entry = Entry::new(
                EntryKind::InUse {
                    offset: Some(obj.offset as u64),
                    genno: obj.genno,
                    stm_ofs: obj.stm_ofs.map(|s| s as u64),
                },
                obj.objid,
            );
        }

        let trailer = scanned.trailer.get_or_insert_with(Default::default);
        for (_, found) in scan.trailers {
            for (key, value) in found {
                trailer.insert(key, value);
            }
        }
        for obj in &scan.objects {
            if let Some(found) = &obj.trailer {
                for (key, value) in found {
                    trailer.insert(key.clone(), value.clone());
                }
            }
        }
        if !trailer.contains_key("Root")
            && let Some(cat) = scan.objects.iter().rev().find(|o| o.is_catalog)
        {
            trailer.insert("Root".into(), PDFObject::reference(cat.objid, cat.genno));
        }
        let size = scanned.num_objects;
        if let Some(trailer) = scanned.trailer.as_mut() {
            trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
        }

        if scan.objects.iter().any(|o| o.is_objstm) {
            self.repair_scanned_object_streams(&scan.objects);
        }
        self.detect_encryption();
        tracing::trace!(
            objects = scan.objects.len(),
            scan_pos = state.scan_pos,
            "indexed delivered objects"
        );
    }

    /// Choose the final index once every byte is present.
    fn settle(&mut self) -> Result<()> {
        if let Some(state) = self.progress.as_mut() {
            state.settled = true;
        }
        let edits: Vec<Revision> = self
            .xref
            .revisions()
            .iter()
            .filter(|rev| rev.origin == RevisionOrigin::Incremental)
            .cloned()
            .collect();
        let base_len = self.xref.revisions().len() - edits.len();

        match load_revisions(self.source.available(), self.options.filters.as_ref()) {
            Ok(mut revisions) => {
                let stored_len = revisions.len();
                revisions.extend(edits);
                let scanned = std::mem::replace(&mut self.xref, XrefTable::from_revisions(revisions));
                let old_marks = self.marks.clone();
                for cp in &mut self.marks {
                    *cp = cp.saturating_sub(base_len) + stored_len;
                }
                self.resolving.clear();
                self.detect_encryption();
                if self.root_resolves() || self.repaired {
                    tracing::debug!(revisions = stored_len, "settled on stored index");
                    return Ok(());
                }
                tracing::debug!("stored index unusable after delivery");
                self.xref = scanned;
                self.marks = old_marks;
                self.detect_encryption();
            }
            Err(err) => tracing::debug!(%err, "no stored index after delivery"),
        }

        if self.options.allow_repair && !self.repaired {
            self.repair()?;
        }
        Ok(())
    }
}
