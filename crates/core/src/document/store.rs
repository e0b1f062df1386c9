//! Object resolution and caching.
//!
//! Every value handed out comes from [`PDFDocument::cache_object`], which
//! parses on demand and stores the result in the object's index entry.
//! Dangling references, free slots and reference cycles all come back as
//! `Null`; a parse failure at a recorded offset triggers one repair.

use super::PDFDocument;
use crate::codec::Decryptor;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFObjRef, PDFObject};
use crate::parser::{IndirectObject, parse_indirect_at};
use crate::xref::{EntryKind, MAX_OBJECT_NUMBER};
use std::sync::Arc;

fn null() -> Arc<PDFObject> {
    Arc::new(PDFObject::Null)
}

/// Decrypt every string inside `obj`.
pub(crate) fn decrypt_value(
    obj: PDFObject,
    decryptor: &dyn Decryptor,
    objid: u32,
    genno: u16,
) -> Result<PDFObject> {
    Ok(match obj {
        PDFObject::String(data) => PDFObject::String(decryptor.decrypt_string(objid, genno, &data)?),
        PDFObject::Array(arr) => PDFObject::Array(
            arr.into_iter()
                .map(|item| decrypt_value(item, decryptor, objid, genno))
                .collect::<Result<_>>()?,
        ),
        PDFObject::Dict(dict) => PDFObject::Dict(
            dict.into_iter()
                .map(|(k, v)| decrypt_value(v, decryptor, objid, genno).map(|v| (k, v)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

impl PDFDocument {
    /// Resolve one level of indirection.
    ///
    /// Direct values are returned as they are; a reference is looked up and
    /// its value (possibly itself a reference) returned.
    pub fn resolve(&mut self, obj: &PDFObject) -> Arc<PDFObject> {
        match obj {
            PDFObject::Ref(r) => self.cache_object(r.objid),
            other => Arc::new(other.clone()),
        }
    }

    /// Follow references until a direct value is reached.
    ///
    /// Gives up with null after `max_chain_depth` hops, which also ends any
    /// reference cycle.
    pub fn resolve_chain(&mut self, obj: &PDFObject) -> Arc<PDFObject> {
        let PDFObject::Ref(start) = obj else {
            return Arc::new(obj.clone());
        };
        let mut next = *start;
        for _ in 0..self.options.max_chain_depth {
            let value = self.cache_object(next.objid);
            match &*value {
                PDFObject::Ref(r) => next = *r,
                _ => return value,
            }
        }
        tracing::warn!(
            start = %start,
            depth = self.options.max_chain_depth,
            "reference chain too long or cyclic"
        );
        null()
    }

    /// Resolve a reference given by number.
    pub fn load_object(&mut self, objid: u32) -> Arc<PDFObject> {
        self.cache_object(objid)
    }

    /// Resolve `r` through the full chain.
    pub fn resolve_ref(&mut self, r: PDFObjRef) -> Arc<PDFObject> {
        self.resolve_chain(&PDFObject::Ref(r))
    }

    pub(crate) fn can_repair(&self) -> bool {
        self.options.allow_repair && !self.repaired && self.source.is_complete()
    }

    /// Value of object `objid`, loading and caching it when needed.
    pub fn cache_object(&mut self, objid: u32) -> Arc<PDFObject> {
        if objid == 0 || objid > MAX_OBJECT_NUMBER {
            return null();
        }
        if self.resolving.contains(&objid) {
            tracing::debug!(objid, "reference cycle while loading object");
            return null();
        }

        let entry = self.xref.lookup(objid);
        if let Some(obj) = &entry.obj {
            return Arc::clone(obj);
        }
        let kind = entry.kind;
        match kind {
            EntryKind::Unset | EntryKind::Free { .. } => null(),
            // Created but never assigned.
            EntryKind::InUse { offset: None, .. } => null(),
            EntryKind::InUse {
                offset: Some(offset),
                ..
            } => self.cache_stored(objid, offset),
            EntryKind::Compressed { container, index } => {
                self.cache_compressed(objid, container, index)
            }
        }
    }

    fn cache_stored(&mut self, objid: u32, offset: u64) -> Arc<PDFObject> {
        self.resolving.insert(objid);
        let loaded = self.load_stored(objid, offset);
        self.resolving.remove(&objid);

        match loaded {
            Ok(ind) => {
                let value = Arc::new(ind.value);
                if let Some(entry) = self.xref.lookup_mut(objid) {
                    if let EntryKind::InUse { stm_ofs, .. } = &mut entry.kind {
                        *stm_ofs = ind.stm_ofs.map(|s| s as u64);
                    }
                    entry.obj = Some(Arc::clone(&value));
                }
                value
            }
            Err(err) if err.is_eof() && !self.source.is_complete() => {
                tracing::trace!(objid, "object not delivered yet");
                null()
            }
            Err(err) => self.repair_and_retry(objid, &err),
        }
    }

    fn cache_compressed(&mut self, objid: u32, container: u32, index: u32) -> Arc<PDFObject> {
        self.resolving.insert(objid);
        let loaded = self.load_object_stream(container);
        self.resolving.remove(&objid);

        if let Err(err) = loaded {
            if err.is_eof() && !self.source.is_complete() {
                return null();
            }
            return self.repair_and_retry(objid, &err);
        }
        if let Some(obj) = self.xref.lookup(objid).obj.clone() {
            return obj;
        }
        let err = PdfError::IndexInconsistent(format!(
            "object {objid} is not member {index} of object stream {container}"
        ));
        self.repair_and_retry(objid, &err)
    }

    fn repair_and_retry(&mut self, objid: u32, err: &PdfError) -> Arc<PDFObject> {
        if !self.can_repair() {
            tracing::debug!(objid, %err, "cannot load object");
            return null();
        }
        tracing::warn!(objid, %err, "broken object reference, repairing");
        if let Err(repair_err) = self.repair() {
            tracing::warn!(%repair_err, "repair failed");
            return null();
        }
        self.cache_object(objid)
    }

    /// Parse the object stored at `offset` and check it is `objid`.
    fn load_stored(&self, objid: u32, offset: u64) -> Result<IndirectObject> {
        let data = self.source.available();
        let ofs = usize::try_from(offset).map_err(|_| PdfError::UnexpectedEof)?;
        if ofs >= data.len() {
            if !self.source.is_complete() {
                return Err(PdfError::UnexpectedEof);
            }
            return Err(PdfError::IndexInconsistent(format!(
                "object {objid} offset {offset} beyond end of file"
            )));
        }
        let mut ind = parse_indirect_at(data, ofs)?;
        if ind.objid != objid {
            return Err(PdfError::IndexInconsistent(format!(
                "expected object {objid} at offset {offset}, found {}",
                ind.objid
            )));
        }
        if !ind.terminated && !self.source.is_complete() && ind.end >= data.len() {
            return Err(PdfError::UnexpectedEof);
        }
        ind.value = self.decrypt_loaded(objid, ind.genno, ind.value)?;
        Ok(ind)
    }

    /// Decryptor to use for object `objid`, if its data is encrypted.
    pub(crate) fn decryptor_for(&self, objid: u32, value: &PDFObject) -> Option<&dyn Decryptor> {
        if !self.encrypted || self.encrypt_objid == Some(objid) || value.is_type("XRef") {
            return None;
        }
        self.options.decryptor.as_deref()
    }

    fn decrypt_loaded(&self, objid: u32, genno: u16, value: PDFObject) -> Result<PDFObject> {
        let Some(decryptor) = self.decryptor_for(objid, &value) else {
            return Ok(value);
        };
        let original = match self.xref.lookup(objid).original_objid {
            0 => objid,
            n => n,
        };
        decrypt_value(value, decryptor, original, genno)
    }
}
