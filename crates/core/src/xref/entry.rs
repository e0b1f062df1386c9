//! One object number's storage descriptor.

use crate::model::objects::PDFObject;
use bytes::Bytes;
use std::sync::Arc;

/// Where an object's bytes live.
///
/// Each kind carries only the fields that are meaningful for it, so an
/// object-stream member can never also claim a file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// No information in this revision; older revisions are consulted.
    #[default]
    Unset,
    /// Deleted or never used. `genno` is the generation a reuse would get.
    Free { genno: u16 },
    /// A standalone object.
    ///
    /// `offset` is `None` for objects that only exist in memory (created or
    /// replaced by an edit). `stm_ofs` is the first stream byte, once known.
    InUse {
        offset: Option<u64>,
        genno: u16,
        stm_ofs: Option<u64>,
    },
    /// Member `index` of the object stream `container`. Generation is 0.
    Compressed { container: u32, index: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub kind: EntryKind,
    /// Depth of the outermost checkpoint taken while the cached value was
    /// present, 0 when none was. `clear_to_mark()` keeps values stamped at
    /// or below the depth it pops.
    pub mark_depth: u32,
    /// Number the object had in the file it was read from. Decryption keys
    /// are derived from this, not from the current number.
    pub original_objid: u32,
    /// Replacement stream data set by an edit.
    pub stm_buf: Option<Bytes>,
    /// Cached parsed value.
    pub obj: Option<Arc<PDFObject>>,
}

/// Descriptor returned for numbers no revision knows about.
pub(crate) static UNSET: Entry = Entry {
    kind: EntryKind::Unset,
    mark_depth: 0,
    original_objid: 0,
    stm_buf: None,
    obj: None,
};

impl Entry {
    pub const fn new(kind: EntryKind, objid: u32) -> Self {
        Self {
            kind,
            mark_depth: 0,
            original_objid: objid,
            stm_buf: None,
            obj: None,
        }
    }

    pub const fn free(objid: u32, genno: u16) -> Self {
        Self::new(EntryKind::Free { genno }, objid)
    }

    pub const fn in_use(objid: u32, offset: u64, genno: u16) -> Self {
        Self::new(
            EntryKind::InUse {
                offset: Some(offset),
                genno,
                stm_ofs: None,
            },
            objid,
        )
    }

    pub const fn compressed(objid: u32, container: u32, index: u32) -> Self {
        Self::new(EntryKind::Compressed { container, index }, objid)
    }

    pub const fn is_unset(&self) -> bool {
        matches!(self.kind, EntryKind::Unset)
    }

    /// Free and unset entries both resolve to null.
    pub const fn is_free(&self) -> bool {
        matches!(self.kind, EntryKind::Free { .. } | EntryKind::Unset)
    }

    pub const fn is_compressed(&self) -> bool {
        matches!(self.kind, EntryKind::Compressed { .. })
    }

    pub const fn genno(&self) -> u16 {
        match self.kind {
            EntryKind::Free { genno } | EntryKind::InUse { genno, .. } => genno,
            EntryKind::Unset | EntryKind::Compressed { .. } => 0,
        }
    }

    /// File offset of a standalone object read from the source.
    pub const fn offset(&self) -> Option<u64> {
        match self.kind {
            EntryKind::InUse { offset, .. } => offset,
            _ => None,
        }
    }

    /// True when the entry's value exists only in memory: it was created or
    /// replaced by an edit and cannot be reloaded from the source.
    pub const fn is_edit(&self) -> bool {
        if self.stm_buf.is_some() {
            return true;
        }
        matches!(self.kind, EntryKind::InUse { offset: None, .. })
    }

    /// Drop the cached value unless it is the only copy of an edit.
    pub fn evict(&mut self) {
        if !self.is_edit() {
            self.obj = None;
            self.mark_depth = 0;
        }
    }

    /// Single-letter kind used by dumps: f, n, o, or `-` for unset.
    pub const fn type_char(&self) -> char {
        match self.kind {
            EntryKind::Unset => '-',
            EntryKind::Free { .. } => 'f',
            EntryKind::InUse { .. } => 'n',
            EntryKind::Compressed { .. } => 'o',
        }
    }
}
