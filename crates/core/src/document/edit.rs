//! Object edits and incremental revisions.
//!
//! Edits never touch a revision read from the file. The first edit pushes
//! an incremental revision on top of the stack, and every edited number
//! gets its entry copied there before it changes. Dropping the top
//! revisions therefore undoes the edits, which is how `clear_to_mark`
//! works.

use super::PDFDocument;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject};
use crate::xref::{
    Entry, EntryKind, MAX_OBJECT_NUMBER, Revision, RevisionOrigin, Signer, UnsavedSignature,
};
use bytes::Bytes;
use std::sync::Arc;

impl PDFDocument {
    /// Index of the incremental revision edits go into, pushing one when
    /// the top revision is stored or predates the last mark.
    fn ensure_incremental_layer(&mut self) -> usize {
        let len = self.xref.revisions().len();
        let floor = self.marks.last().copied().unwrap_or(0);
        let reusable = self
            .xref
            .top()
            .is_some_and(|top| top.origin == RevisionOrigin::Incremental)
            && len > floor;
        if !reusable {
            self.xref
                .push_revision(Revision::new(RevisionOrigin::Incremental));
            tracing::trace!(revision = len, "opened incremental revision");
            return len;
        }
        len - 1
    }

    fn check_objid(&self, objid: u32) -> Result<()> {
        if objid == 0 || objid >= self.xref.capacity() {
            return Err(PdfError::InvalidObjectNumber(objid));
        }
        Ok(())
    }

    /// True when `objid` already has its own entry in the top incremental
    /// revision.
    pub fn is_incremental(&self, objid: u32) -> bool {
        let Some(top) = self.xref.top() else {
            return false;
        };
        top.origin == RevisionOrigin::Incremental
            && self.xref.find(objid) == Some(self.xref.revisions().len() - 1)
    }

    /// Copy the entry for `objid` into the top incremental revision so it
    /// can be changed without touching older revisions.
    pub fn ensure_incremental_object(&mut self, objid: u32) -> Result<&mut Entry> {
        self.check_objid(objid)?;
        let layer = self.ensure_incremental_layer();
        if self.xref.find(objid) != Some(layer) {
            let current = self.xref.lookup(objid).clone();
            let entry = self.xref.revisions_mut()[layer].entry_mut_or_insert(objid);
            *entry = current;
            entry.mark_depth = 0;
            if entry.original_objid == 0 {
                entry.original_objid = objid;
            }
        }
        Ok(self.xref.revisions_mut()[layer].entry_mut_or_insert(objid))
    }

    /// Allocate a new object number past the current capacity.
    ///
    /// The slot is in use but holds no value; resolving it yields null
    /// until [`update_object`](Self::update_object) assigns one.
    pub fn create_object(&mut self) -> Result<u32> {
        let objid = self.xref.capacity().max(1);
        if objid > MAX_OBJECT_NUMBER {
            return Err(PdfError::InvalidObjectNumber(objid));
        }
        let layer = self.ensure_incremental_layer();
        let entry = self.xref.revisions_mut()[layer].entry_mut_or_insert(objid);
        *entry = Entry::new(
            EntryKind::InUse {
                offset: None,
                genno: 0,
                stm_ofs: None,
            },
            objid,
        );
        tracing::trace!(objid, "created object");
        Ok(objid)
    }

    /// Replace the value of `objid`.
    ///
    /// An object inside an object stream is solidified first. A stream keeps
    /// its data; only the dictionary changes.
    ///
    /// # Errors
    ///
    /// `InvalidObjectNumber` for numbers outside the table, `Unsolidifiable`
    /// when the object's container does not parse.
    pub fn update_object(&mut self, objid: u32, value: PDFObject) -> Result<()> {
        self.check_objid(objid)?;
        let current = self.xref.lookup(objid);
        if current.is_compressed() {
            self.ensure_solid_object(objid)?;
        } else if current.offset().is_some() && current.obj.is_none() {
            // Learn where the stream data starts before the offset is dropped.
            let _ = self.cache_object(objid);
        }

        let entry = self.ensure_incremental_object(objid)?;
        let (genno, stm_ofs) = match entry.kind {
            EntryKind::InUse { genno, stm_ofs, .. } => (genno, stm_ofs),
            EntryKind::Free { genno } => (genno, None),
            EntryKind::Unset | EntryKind::Compressed { .. } => (0, None),
        };
        entry.kind = EntryKind::InUse {
            offset: None,
            genno,
            stm_ofs,
        };
        entry.obj = Some(Arc::new(value));
        Ok(())
    }

    /// Copy an object out of its object stream into a standalone slot.
    ///
    /// Other members of the container are left where they are. Does nothing
    /// for objects that are not compressed.
    pub fn ensure_solid_object(&mut self, objid: u32) -> Result<()> {
        self.check_objid(objid)?;
        let entry = self.xref.lookup(objid);
        let EntryKind::Compressed { container, .. } = entry.kind else {
            return Ok(());
        };
        let value = match entry.obj.clone() {
            Some(value) => value,
            None => {
                if let Err(err) = self.load_object_stream(container) {
                    tracing::warn!(objid, container, %err, "cannot solidify object");
                    return Err(PdfError::Unsolidifiable { objid });
                }
                self.xref
                    .lookup(objid)
                    .obj
                    .clone()
                    .ok_or(PdfError::Unsolidifiable { objid })?
            }
        };

        let entry = self.ensure_incremental_object(objid)?;
        entry.kind = EntryKind::InUse {
            offset: None,
            genno: 0,
            stm_ofs: None,
        };
        entry.obj = Some(value);
        tracing::debug!(objid, container, "solidified object");
        Ok(())
    }

    /// Mark `objid` free. Its value and stream data are dropped and the
    /// generation a reuse would get is bumped.
    pub fn delete_object(&mut self, objid: u32) -> Result<()> {
        let entry = self.ensure_incremental_object(objid)?;
        let genno = entry.genno().saturating_add(1);
        entry.kind = EntryKind::Free { genno };
        entry.obj = None;
        entry.stm_buf = None;
        tracing::trace!(objid, "deleted object");
        Ok(())
    }

    /// Replace the data of stream `objid`.
    ///
    /// With `compressed` set the bytes are taken to be encoded with the
    /// filters the dictionary already names. Otherwise `/Filter` and
    /// `/DecodeParms` are removed. `/Length` is set to the buffer size in
    /// both cases.
    pub fn update_stream(&mut self, objid: u32, buf: impl Into<Bytes>, compressed: bool) -> Result<()> {
        let buf = buf.into();
        self.check_objid(objid)?;
        let mut dict = match &*self.cache_object(objid) {
            PDFObject::Dict(dict) => dict.clone(),
            _ => Dict::new(),
        };
        if !compressed {
            for key in ["Filter", "DecodeParms", "F", "DP"] {
                dict.shift_remove(key);
            }
        }
        dict.insert("Length".into(), PDFObject::Int(buf.len() as i64));
        self.update_object(objid, PDFObject::Dict(dict))?;
        self.ensure_incremental_object(objid)?.stm_buf = Some(buf);
        Ok(())
    }

    /// Create an object holding `value`.
    pub fn add_object(&mut self, value: PDFObject) -> Result<PDFObjRef> {
        let objid = self.create_object()?;
        self.update_object(objid, value)?;
        Ok(PDFObjRef::new(objid, 0))
    }

    /// Create a stream object from `dict` (or an empty dictionary) and `buf`.
    pub fn add_stream(
        &mut self,
        buf: impl Into<Bytes>,
        dict: Option<Dict>,
        compressed: bool,
    ) -> Result<PDFObjRef> {
        let objid = self.create_object()?;
        self.update_object(objid, PDFObject::Dict(dict.unwrap_or_default()))?;
        self.update_stream(objid, buf, compressed)?;
        Ok(PDFObjRef::new(objid, 0))
    }

    /// Set a checkpoint.
    ///
    /// Every entry holding a value now and not yet stamped is stamped with
    /// the new checkpoint's depth, and later edits go into a fresh
    /// incremental revision.
    pub fn mark(&mut self) {
        let depth = self.marks.len() as u32 + 1;
        for rev in self.xref.revisions_mut() {
            for entry in rev.iter_mut() {
                if entry.obj.is_some() && entry.mark_depth == 0 {
                    entry.mark_depth = depth;
                }
            }
        }
        self.marks.push(self.xref.revisions().len());
    }

    /// Roll back to the last checkpoint.
    ///
    /// Revisions pushed since [`mark`](Self::mark) are dropped, and values
    /// cached since then are evicted. Stamps of the popped checkpoint are
    /// cleared. Does nothing without a checkpoint.
    pub fn clear_to_mark(&mut self) {
        let depth = self.marks.len() as u32;
        let Some(count) = self.marks.pop() else {
            return;
        };
        self.xref.truncate(count);
        for rev in self.xref.revisions_mut() {
            for entry in rev.iter_mut() {
                if entry.mark_depth == 0 || entry.mark_depth > depth {
                    entry.evict();
                }
                if entry.mark_depth >= depth {
                    entry.mark_depth = 0;
                }
            }
        }
        self.resolving.clear();
        self.detect_encryption();
    }

    /// Drop every cached value that can be read again from the source.
    pub fn clear(&mut self) {
        for rev in self.xref.revisions_mut() {
            for entry in rev.iter_mut() {
                entry.evict();
            }
        }
        self.resolving.clear();
    }

    /// Mutable document trailer. The first call after an edit boundary
    /// copies the current trailer into the incremental revision.
    pub fn trailer_mut(&mut self) -> &mut Dict {
        let layer = self.ensure_incremental_layer();
        let current = self.xref.trailer().cloned();
        self.xref.revisions_mut()[layer]
            .trailer
            .get_or_insert_with(|| current.unwrap_or_default())
    }

    /// Set the trailer of the revision being built (the top one).
    pub fn set_populating_trailer(&mut self, trailer: Dict) {
        self.populating_revision().trailer = Some(trailer);
    }

    /// Entry for `objid` in the revision being built, growing it as needed.
    pub fn populating_entry_mut(&mut self, objid: u32) -> Result<&mut Entry> {
        if objid > MAX_OBJECT_NUMBER {
            return Err(PdfError::InvalidObjectNumber(objid));
        }
        Ok(self.populating_revision().entry_mut_or_insert(objid))
    }

    fn populating_revision(&mut self) -> &mut Revision {
        if self.xref.top().is_none() {
            self.xref.push_revision(Revision::new(RevisionOrigin::Scanned));
        }
        let last = self.xref.revisions().len() - 1;
        &mut self.xref.revisions_mut()[last]
    }

    /// Record a signature field whose contents the save routine must fill.
    pub fn store_unsaved_signature(&mut self, field: PDFObjRef, signer: Arc<dyn Signer>) {
        let layer = self.ensure_incremental_layer();
        self.xref.revisions_mut()[layer]
            .unsaved_sigs
            .push(UnsavedSignature { field, signer });
    }

    pub fn is_unsaved_signature(&self, field: PDFObjRef) -> bool {
        self.unsaved_signatures().any(|sig| sig.field == field)
    }

    pub fn unsaved_signatures(&self) -> impl Iterator<Item = &UnsavedSignature> + '_ {
        self.xref
            .revisions()
            .iter()
            .flat_map(|rev| rev.unsaved_sigs.iter())
    }

    /// Remove and return every pending signature, oldest first.
    pub fn take_unsaved_signatures(&mut self) -> Vec<UnsavedSignature> {
        self.xref
            .revisions_mut()
            .iter_mut()
            .flat_map(|rev| std::mem::take(&mut rev.unsaved_sigs))
            .collect()
    }
}
