//! Layered cross-reference revisions.
//!
//! A document's index is a stack of revisions, oldest first. Each stored
//! `xref` section of the file becomes one revision, and edits go into an
//! incremental revision on top. Looking up a number walks the stack from
//! the newest revision down and takes the first entry that is set.

use super::entry::{Entry, EntryKind, UNSET};
use crate::model::objects::{Dict, PDFObjRef};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Largest object number accepted anywhere in the index.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Gaps up to this size are filled with unset entries instead of starting a
/// new subsection.
const MAX_GAP_FILL: u32 = 1024;

/// A contiguous run of entries starting at object number `start`.
#[derive(Debug, Clone, Default)]
pub struct Subsection {
    pub start: u32,
    pub entries: Vec<Entry>,
}

impl Subsection {
    pub const fn new(start: u32, entries: Vec<Entry>) -> Self {
        Self { start, entries }
    }

    /// One past the last object number covered.
    pub const fn end(&self) -> u32 {
        self.start + self.entries.len() as u32
    }

    pub const fn contains(&self, objid: u32) -> bool {
        objid >= self.start && objid < self.end()
    }
}

/// How a revision came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionOrigin {
    /// Read from an `xref` table or stream in the file.
    Stored,
    /// Rebuilt by scanning the whole file.
    Repaired,
    /// Built from a partially delivered file.
    Scanned,
    /// Holds in-memory edits.
    Incremental,
}

/// Context a save routine needs to fill in a signature placeholder.
pub trait Signer: fmt::Debug + Send + Sync {
    /// Upper bound on the signature size, used to size the placeholder.
    fn max_digest_size(&self) -> usize;
}

/// A signature field whose contents must be patched at save time.
#[derive(Debug, Clone)]
pub struct UnsavedSignature {
    pub field: PDFObjRef,
    pub signer: Arc<dyn Signer>,
}

/// The index in effect for one section of the file, or for one layer of edits.
#[derive(Debug, Clone)]
pub struct Revision {
    pub num_objects: u32,
    pub subsections: Vec<Subsection>,
    pub trailer: Option<Dict>,
    /// Trailer as it was before a repair replaced it.
    pub pre_repair_trailer: Option<Dict>,
    pub unsaved_sigs: Vec<UnsavedSignature>,
    /// Offset just past this revision's index in the source, 0 for
    /// revisions that are not in the file.
    pub end_ofs: u64,
    pub origin: RevisionOrigin,
}

impl Revision {
    pub const fn new(origin: RevisionOrigin) -> Self {
        Self {
            num_objects: 0,
            subsections: Vec::new(),
            trailer: None,
            pre_repair_trailer: None,
            unsaved_sigs: Vec::new(),
            end_ofs: 0,
            origin,
        }
    }

    /// Entry for `objid` in this revision alone.
    ///
    /// Subsections are scanned newest first, so a later subsection wins over
    /// an earlier one covering the same number.
    pub fn entry(&self, objid: u32) -> Option<&Entry> {
        self.subsections
            .iter()
            .rev()
            .find(|sub| sub.contains(objid))
            .map(|sub| &sub.entries[(objid - sub.start) as usize])
    }

    pub fn entry_mut(&mut self, objid: u32) -> Option<&mut Entry> {
        self.subsections
            .iter_mut()
            .rev()
            .find(|sub| sub.contains(objid))
            .map(|sub| &mut sub.entries[(objid - sub.start) as usize])
    }

    /// Entry for `objid`, growing the revision when it is not covered yet.
    pub fn entry_mut_or_insert(&mut self, objid: u32) -> &mut Entry {
        let found = self
            .subsections
            .iter()
            .rposition(|sub| sub.contains(objid));
        let idx = match found {
            Some(idx) => idx,
            None => self.grow_to(objid),
        };
        self.num_objects = self.num_objects.max(objid + 1);
        let sub = &mut self.subsections[idx];
        &mut sub.entries[(objid - sub.start) as usize]
    }

    fn grow_to(&mut self, objid: u32) -> usize {
        if let Some(last) = self.subsections.last_mut()
            && objid >= last.end()
            && objid - last.end() <= MAX_GAP_FILL
        {
            let start = last.start;
            last.entries
                .resize_with((objid - start + 1) as usize, Entry::default);
            return self.subsections.len() - 1;
        }
        self.subsections
            .push(Subsection::new(objid, vec![Entry::default()]));
        self.subsections.len() - 1
    }

    /// Every covered number with its entry, skipping unset slots. Numbers
    /// hidden by a later subsection are reported once.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Entry)> + '_ {
        let mut seen = Vec::<(u32, u32)>::new();
        let mut out = Vec::new();
        for sub in self.subsections.iter().rev() {
            for (i, entry) in sub.entries.iter().enumerate() {
                let objid = sub.start + i as u32;
                if entry.is_unset() || seen.iter().any(|&(s, e)| objid >= s && objid < e) {
                    continue;
                }
                out.push((objid, entry));
            }
            seen.push((sub.start, sub.end()));
        }
        out.sort_by_key(|(objid, _)| *objid);
        out.into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> + '_ {
        self.subsections
            .iter_mut()
            .flat_map(|sub| sub.entries.iter_mut())
    }
}

/// The full layered index of a document.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    revisions: Vec<Revision>,
}

impl XrefTable {
    pub const fn new() -> Self {
        Self {
            revisions: Vec::new(),
        }
    }

    /// Build from revisions ordered oldest first.
    pub const fn from_revisions(revisions: Vec<Revision>) -> Self {
        Self { revisions }
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn push_revision(&mut self, revision: Revision) {
        self.revisions.push(revision);
    }

    pub fn truncate(&mut self, len: usize) {
        self.revisions.truncate(len);
    }

    pub fn top(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Revision> {
        self.revisions.last_mut()
    }

    pub fn revisions_mut(&mut self) -> &mut [Revision] {
        &mut self.revisions
    }

    /// Object-number ceiling across all revisions.
    pub fn capacity(&self) -> u32 {
        self.revisions
            .iter()
            .map(|rev| rev.num_objects)
            .max()
            .unwrap_or(0)
    }

    /// Index of the newest revision with a set entry for `objid`.
    pub fn find(&self, objid: u32) -> Option<usize> {
        self.revisions
            .iter()
            .rposition(|rev| rev.entry(objid).is_some_and(|e| !e.is_unset()))
    }

    /// Effective entry for `objid`. Unknown numbers, including anything at or
    /// beyond capacity, yield an unset entry, which reads as free.
    pub fn lookup(&self, objid: u32) -> &Entry {
        self.find(objid)
            .and_then(|idx| self.revisions[idx].entry(objid))
            .unwrap_or(&UNSET)
    }

    pub fn lookup_mut(&mut self, objid: u32) -> Option<&mut Entry> {
        let idx = self.find(objid)?;
        self.revisions[idx].entry_mut(objid)
    }

    /// Trailer of the newest revision that has one.
    pub fn trailer(&self) -> Option<&Dict> {
        self.revisions.iter().rev().find_map(|rev| rev.trailer.as_ref())
    }

    /// Swap every non-incremental revision for one revision built from
    /// `entries` (indexed by object number). Incremental revisions stay on
    /// top. Returns how many revisions were replaced.
    pub fn replace_entire_table(&mut self, entries: Vec<Entry>) -> usize {
        let base_len = self
            .revisions
            .iter()
            .position(|rev| rev.origin == RevisionOrigin::Incremental)
            .unwrap_or(self.revisions.len());
        let old_trailer = self.revisions[..base_len]
            .iter()
            .rev()
            .find_map(|rev| rev.trailer.clone());

        let mut repaired = Revision::new(RevisionOrigin::Repaired);
        repaired.num_objects = entries.len() as u32;
        repaired.subsections.push(Subsection::new(0, entries));
        repaired.trailer.clone_from(&old_trailer);
        repaired.pre_repair_trailer = old_trailer;

        let _ = self.revisions.splice(..base_len, [repaired]);
        base_len
    }

    /// Human-readable listing of every revision, newest first.
    pub fn print_xref(&self) -> String {
        let mut out = String::new();
        for (i, rev) in self.revisions.iter().enumerate().rev() {
            let _ = writeln!(
                out,
                "revision {i} ({:?}, {} objects, {} subsections)",
                rev.origin,
                rev.num_objects,
                rev.subsections.len()
            );
            for (objid, entry) in rev.iter() {
                let _ = write!(out, "  {objid:>6} {}", entry.type_char());
                match entry.kind {
                    EntryKind::Free { genno } => {
                        let _ = write!(out, " gen={genno}");
                    }
                    EntryKind::InUse { offset, genno, .. } => match offset {
                        Some(ofs) => {
                            let _ = write!(out, " gen={genno} ofs={ofs}");
                        }
                        None => {
                            let _ = write!(out, " gen={genno} in-memory");
                        }
                    },
                    EntryKind::Compressed { container, index } => {
                        let _ = write!(out, " stm={container} idx={index}");
                    }
                    EntryKind::Unset => {}
                }
                if entry.stm_buf.is_some() {
                    out.push_str(" +stream");
                }
                if entry.obj.is_some() {
                    out.push_str(" cached");
                }
                out.push('\n');
            }
            if let Some(trailer) = &rev.trailer {
                let _ = writeln!(out, "  trailer {}", crate::model::PDFObject::Dict(trailer.clone()));
            }
        }
        out
    }
}
