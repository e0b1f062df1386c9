//! Index reconstruction by scanning the file.
//!
//! When the stored cross-reference index is missing or wrong, every
//! `n g obj` definition in the file is located and a fresh index built
//! from what was found. Later definitions of the same number win, which is
//! how incremental updates are laid out. Object-stream membership is then
//! recovered from the containers that parse.

use super::PDFDocument;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject};
use crate::parser::lexer::{is_delimiter, is_whitespace};
use crate::parser::{PDFParser, find_endstream, parse_indirect_at, skip_endobj, stream_extent};
use crate::xref::{Entry, EntryKind, MAX_OBJECT_NUMBER, RevisionOrigin};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::sync::Arc;

static OBJ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").expect("valid object header pattern"));
static TRAILER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"trailer\s*<<").expect("valid trailer pattern"));

/// Position of the repaired revision; the stored revisions it replaces
/// always sit at the bottom of the stack.
const REPAIRED: usize = 0;

/// Keys of an xref-stream dictionary that describe the stream rather than
/// the document.
const XREF_STREAM_KEYS: [&str; 8] = [
    "Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev", "XRefStm",
];

/// What a scan learned about one object definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedObject {
    pub objid: u32,
    pub genno: u16,
    /// Offset of the object header.
    pub offset: usize,
    /// Offset just past `endobj`, or past the value when it is missing.
    pub end: usize,
    pub stm_ofs: Option<usize>,
    /// Stream data length, measured up to `endstream` when `/Length` is wrong.
    pub stm_len: Option<usize>,
    /// `endobj` (or a complete stream) was seen.
    pub terminated: bool,
    /// Stream data runs past the available bytes.
    pub truncated: bool,
    pub is_catalog: bool,
    /// A `/Type /Pages` node without `/Parent`.
    pub is_pages_root: bool,
    pub is_objstm: bool,
    pub is_xref_stream: bool,
    pub has_encrypt: bool,
    pub has_id: bool,
    /// Document keys of an xref-stream dictionary, usable as a trailer.
    pub trailer: Option<Dict>,
}

/// Scan the object definition whose header starts at `offset`.
pub fn repair_object_at(data: &[u8], offset: usize) -> Result<ScannedObject> {
    let ind = parse_indirect_at(data, offset)?;
    let value = &ind.value;

    let mut scanned = ScannedObject {
        objid: ind.objid,
        genno: ind.genno,
        offset,
        end: ind.end,
        stm_ofs: ind.stm_ofs,
        stm_len: None,
        terminated: ind.terminated,
        truncated: false,
        is_catalog: value.is_type("Catalog"),
        is_pages_root: value.is_type("Pages") && value.get("Parent").is_none(),
        is_objstm: value.is_type("ObjStm"),
        is_xref_stream: value.is_type("XRef"),
        has_encrypt: value.get("Encrypt").is_some(),
        has_id: value.get("ID").is_some(),
        trailer: None,
    };

    if let Some(stm_ofs) = ind.stm_ofs {
        // An indirect /Length cannot be trusted during a scan.
        let length = match value.get("Length") {
            Some(PDFObject::Int(n)) => usize::try_from(*n).ok(),
            _ => None,
        };
        let extent = stream_extent(data, stm_ofs, length);
        scanned.stm_len = Some(extent.end - extent.start);
        match find_endstream(data, extent.end) {
            Some((_, kw_end)) => {
                scanned.end = skip_endobj(data, kw_end).unwrap_or(kw_end);
            }
            None => {
                scanned.end = data.len();
                scanned.terminated = false;
                scanned.truncated = true;
            }
        }
    }

    if scanned.is_xref_stream
        && let PDFObject::Dict(dict) = value
    {
        let mut trailer = dict.clone();
        for key in XREF_STREAM_KEYS {
            trailer.shift_remove(key);
        }
        scanned.trailer = Some(trailer);
    }
    Ok(scanned)
}

/// Objects and trailer dictionaries found by a scan.
#[derive(Debug, Default)]
pub(crate) struct ScanResult {
    pub objects: Vec<ScannedObject>,
    /// Trailer dictionaries with the offset they were found at.
    pub trailers: Vec<(usize, Dict)>,
    /// Where the scan stopped. Equal to the data length for a full scan.
    pub end: usize,
}

fn at_token_boundary(data: &[u8], pos: usize) -> bool {
    pos == 0 || is_whitespace(data[pos - 1]) || is_delimiter(data[pos - 1])
}

/// Scan `data` from `from` for object definitions and trailers.
///
/// With `complete` unset the data is a prefix of the file: the scan stops
/// before the first object that is not fully present, so a later scan can
/// pick it up again from `end`.
pub(crate) fn scan_objects(data: &[u8], from: usize, complete: bool) -> ScanResult {
    let mut result = ScanResult::default();
    let mut pos = from;
    while let Some(m) = OBJ_HEADER.find_at(data, pos) {
        if !at_token_boundary(data, m.start()) {
            pos = m.end();
            continue;
        }
        match repair_object_at(data, m.start()) {
            Ok(obj) => {
                if !complete && (!obj.terminated || obj.truncated) {
                    result.end = m.start();
                    scan_trailers(data, from, m.start(), &mut result.trailers);
                    return result;
                }
                pos = obj.end.max(m.end());
                if obj.objid == 0 || obj.objid > MAX_OBJECT_NUMBER {
                    tracing::debug!(objid = obj.objid, offset = obj.offset, "object number out of range");
                    continue;
                }
                result.objects.push(obj);
            }
            Err(err) if err.is_eof() && !complete => {
                result.end = m.start();
                scan_trailers(data, from, m.start(), &mut result.trailers);
                return result;
            }
            Err(err) => {
                tracing::debug!(offset = m.start(), %err, "skipping unparsable object");
                pos = m.end();
            }
        }
    }
    result.end = if complete { data.len() } else { last_line_start(data, pos) };
    scan_trailers(data, from, result.end, &mut result.trailers);
    result
}

/// Start of the last (possibly partial) line at or after `from`.
fn last_line_start(data: &[u8], from: usize) -> usize {
    data[from.min(data.len())..]
        .iter()
        .rposition(|&b| b == b'\n' || b == b'\r')
        .map_or(from, |i| from + i + 1)
}

fn scan_trailers(data: &[u8], from: usize, to: usize, out: &mut Vec<(usize, Dict)>) {
    let window = &data[..to.min(data.len())];
    let mut pos = from.min(window.len());
    while let Some(m) = TRAILER.find_at(window, pos) {
        pos = m.end();
        let dict_start = m.end() - 2;
        let mut parser = PDFParser::at(window, dict_start);
        if let Ok(PDFObject::Dict(dict)) = parser.parse_object() {
            out.push((m.start(), dict));
        }
    }
}

/// Pick the trailer to keep: the last one naming a `/Root`, else the last.
fn choose_trailer(mut candidates: Vec<(usize, Dict)>) -> Option<Dict> {
    let with_root = candidates.iter().rposition(|(_, t)| t.contains_key("Root"));
    let chosen = match with_root {
        Some(idx) => candidates.swap_remove(idx),
        None => candidates.pop()?,
    };
    Some(chosen.1)
}

/// Build the entry vector for a set of scanned objects. Slot 0 is the head
/// of the free list; numbers nobody defined are free.
pub(crate) fn entries_from_scan(objects: &[ScannedObject]) -> Vec<Entry> {
    let count = objects.iter().map(|o| o.objid + 1).max().unwrap_or(1);
    let mut entries: Vec<Entry> = (0..count).map(|objid| Entry::free(objid, 0)).collect();
    entries[0] = Entry::free(0, 65535);
    for obj in objects {
        let mut entry = Entry::in_use(obj.objid, obj.offset as u64, obj.genno);
        if let EntryKind::InUse { stm_ofs, .. } = &mut entry.kind {
            *stm_ofs = obj.stm_ofs.map(|s| s as u64);
        }
        entries[obj.objid as usize] = entry;
    }
    entries
}

impl PDFDocument {
    /// Rebuild the index by scanning the whole file.
    ///
    /// Stored revisions are replaced by one repaired revision; incremental
    /// revisions holding edits stay on top of it. Fails only when the file
    /// holds no object definitions at all.
    pub fn repair(&mut self) -> Result<()> {
        if !self.source.is_complete() {
            return Err(PdfError::Structural(
                "cannot repair a partially delivered source".into(),
            ));
        }
        tracing::debug!(len = self.source.len(), "scanning file for objects");
        let scan = scan_objects(self.source.available(), 0, true);
        if scan.objects.is_empty() {
            return Err(PdfError::Structural("no objects found in file".into()));
        }

        let mut trailers = scan.trailers;
        trailers.extend(
            scan.objects
                .iter()
                .filter_map(|o| o.trailer.clone().map(|t| (o.offset, t))),
        );
        trailers.sort_by_key(|(ofs, _)| *ofs);
        let entries = entries_from_scan(&scan.objects);
        let recovered = scan.objects.len();

        let removed = self.xref.replace_entire_table(entries);
        for cp in &mut self.marks {
            *cp = cp.saturating_sub(removed) + 1;
        }
        self.repaired = true;
        self.resolving.clear();

        self.install_repaired_trailer(choose_trailer(trailers));
        self.detect_encryption();
        self.repair_scanned_object_streams(&scan.objects);
        self.settle_repaired_root(&scan.objects);

        tracing::warn!(
            recovered,
            capacity = self.xref.capacity(),
            "rebuilt cross-reference index"
        );
        Ok(())
    }

    /// Recover object-stream membership from the containers the current
    /// index knows about.
    ///
    /// Every standalone in-use object is loaded, and each `/Type /ObjStm`
    /// among them has its members pointed back at it, in file order. A
    /// member keeps its own entry when it is defined standalone later in the
    /// file than the container, or when an edit replaced it. Entries are
    /// written into the revision that indexes the container. Returns how
    /// many members were reassigned.
    pub fn repair_object_streams(&mut self) -> usize {
        let mut containers = Vec::new();
        for objid in 1..self.xref.capacity() {
            let Some(offset) = self.xref.lookup(objid).offset() else {
                continue;
            };
            if self.cache_object(objid).is_type("ObjStm") {
                containers.push((offset, objid));
            }
        }
        containers.sort_unstable();

        let mut assigned = 0usize;
        for (container_ofs, container) in containers {
            let Some(layer) = self.xref.find(container) else {
                continue;
            };
            let header = match self.read_object_stream(container) {
                Ok((header, _)) => header,
                Err(err) => {
                    tracing::warn!(container, %err, "object stream does not parse, members left alone");
                    continue;
                }
            };
            for (index, &(objid, _)) in header.members.iter().enumerate() {
                if objid == 0 || objid > MAX_OBJECT_NUMBER || objid == container {
                    continue;
                }
                let keep = self.xref.find(objid).is_some_and(|idx| {
                    idx > layer && self.xref.revisions()[idx].origin == RevisionOrigin::Incremental
                });
                let current = self.xref.lookup(objid);
                let keep = keep
                    || current.is_edit()
                    || matches!(current.offset(), Some(ofs) if ofs > container_ofs)
                    || current.kind
                        == (EntryKind::Compressed {
                            container,
                            index: index as u32,
                        });
                if keep {
                    continue;
                }
                *self.xref.revisions_mut()[layer].entry_mut_or_insert(objid) =
                    Entry::compressed(objid, container, index as u32);
                assigned += 1;
            }
        }
        if assigned > 0 {
            self.resolving.clear();
            tracing::warn!(assigned, "reassigned object stream members");
        }
        assigned
    }

    /// Recover object-stream membership for the containers found by a scan,
    /// writing into the bottom revision the scan rebuilt.
    ///
    /// Containers are visited in file order. A member is assigned to its
    /// container unless a standalone definition of the same number appears
    /// later in the file. Containers that do not parse are skipped and leave
    /// their members as they were.
    pub(crate) fn repair_scanned_object_streams(&mut self, objects: &[ScannedObject]) {
        let containers: Vec<(u32, usize)> = objects
            .iter()
            .filter(|o| o.is_objstm)
            .map(|o| (o.objid, o.offset))
            .collect();

        for (container, container_ofs) in containers {
            // Only the definition that won the scan is a container.
            let current = self.xref.revisions()[REPAIRED]
                .entry(container)
                .and_then(Entry::offset);
            if current != Some(container_ofs as u64) {
                continue;
            }
            let header = match self.read_object_stream(container) {
                Ok((header, _)) => header,
                Err(err) => {
                    tracing::warn!(container, %err, "object stream does not parse, members left free");
                    continue;
                }
            };
            let mut assigned = 0usize;
            for (index, &(objid, _)) in header.members.iter().enumerate() {
                if objid == 0 || objid > MAX_OBJECT_NUMBER || objid == container {
                    continue;
                }
                let entry = self.xref.revisions_mut()[REPAIRED].entry_mut_or_insert(objid);
                let standalone_later = matches!(
                    entry.kind,
                    EntryKind::InUse { offset: Some(ofs), .. } if ofs > container_ofs as u64
                );
                if standalone_later {
                    continue;
                }
                *entry = Entry::compressed(objid, container, index as u32);
                assigned += 1;
            }
            tracing::debug!(container, assigned, "recovered object stream members");
        }
    }

    /// Give the repaired revision a trailer: the scanned one when there is
    /// one, else the old one. Document keys the scanned trailer lacks are
    /// taken from the old trailer.
    fn install_repaired_trailer(&mut self, scanned: Option<Dict>) {
        let rev = &mut self.xref.revisions_mut()[REPAIRED];
        let pre_repair = rev.pre_repair_trailer.clone();
        let mut trailer = scanned.or_else(|| pre_repair.clone()).unwrap_or_default();
        for key in ["Prev", "XRefStm"] {
            trailer.shift_remove(key);
        }
        if let Some(old) = &pre_repair {
            for key in ["Root", "Info", "ID", "Encrypt"] {
                if !trailer.contains_key(key)
                    && let Some(value) = old.get(key)
                {
                    trailer.insert(key.to_string(), value.clone());
                }
            }
        }
        rev.trailer = Some(trailer);
    }

    /// Point `/Root` at a catalog that resolves, and set `/Size`.
    fn settle_repaired_root(&mut self, objects: &[ScannedObject]) {
        if !self.root_resolves() {
            let root = self.recovered_root(objects);
            if let Some(trailer) = self.xref.revisions_mut()[REPAIRED].trailer.as_mut() {
                match root {
                    Some(root) => {
                        trailer.insert("Root".into(), PDFObject::Ref(root));
                    }
                    None => {
                        tracing::warn!("no document catalog could be recovered");
                        trailer.shift_remove("Root");
                    }
                }
            }
        }
        let rev = &mut self.xref.revisions_mut()[REPAIRED];
        let size = rev.num_objects;
        if let Some(trailer) = rev.trailer.as_mut() {
            trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
        }
    }

    /// The last catalog the scan found, or a new catalog over the last
    /// page-tree root.
    fn recovered_root(&mut self, objects: &[ScannedObject]) -> Option<PDFObjRef> {
        if let Some(cat) = objects.iter().rev().find(|o| o.is_catalog) {
            return Some(PDFObjRef::new(cat.objid, cat.genno));
        }
        let pages = objects.iter().rev().find(|o| o.is_pages_root)?;
        let mut catalog = Dict::new();
        catalog.insert("Type".into(), PDFObject::name("Catalog"));
        catalog.insert(
            "Pages".into(),
            PDFObject::reference(pages.objid, pages.genno),
        );

        let revision = &mut self.xref.revisions_mut()[REPAIRED];
        let objid = revision.num_objects;
        let entry = revision.entry_mut_or_insert(objid);
        *entry = Entry::new(
            EntryKind::InUse {
                offset: None,
                genno: 0,
                stm_ofs: None,
            },
            objid,
        );
        entry.obj = Some(Arc::new(PDFObject::Dict(catalog)));
        tracing::warn!(objid, pages = pages.objid, "no catalog found, synthesized one");
        Some(PDFObjRef::new(objid, 0))
    }
}
