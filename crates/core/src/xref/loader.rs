//! Reader for the cross-reference sections stored in a file.
//!
//! Handles classic `xref` tables, cross-reference streams, hybrid files
//! (`/XRefStm` in a classic trailer) and `/Prev` chains. Every section
//! becomes one [`Revision`]; the result is ordered oldest first.

use super::entry::Entry;
use super::table::{MAX_OBJECT_NUMBER, Revision, RevisionOrigin, Subsection};
use crate::codec::{FilterPipeline, filter_chain};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use crate::parser::{PDFParser, parse_indirect_at, stream_extent};
use rustc_hash::FxHashSet;
use smallvec::{SmallVec, smallvec};

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 1024;

/// Keys of an xref stream dictionary that describe the stream itself rather
/// than the document.
const XREF_STREAM_KEYS: [&str; 5] = ["Length", "Filter", "DecodeParms", "W", "Index"];

fn inconsistent(msg: impl Into<String>) -> PdfError {
    PdfError::IndexInconsistent(msg.into())
}

/// Offset named by the last `startxref` in the tail of the file.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let search_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let hay = &data[search_start..];
    let found = hay
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| inconsistent("no startxref near end of file"))?;

    let rest = &hay[found + needle.len()..];
    let (num, _) = read_number(skip_ws(rest, 0), 0)
        .map_err(|_| inconsistent("startxref without offset"))?;
    let pos = usize::try_from(num).map_err(|_| inconsistent("negative startxref"))?;
    if pos >= data.len() {
        return Err(inconsistent(format!("startxref {pos} beyond end of file")));
    }
    Ok(pos)
}

fn skip_ws(data: &[u8], mut pos: usize) -> &[u8] {
    while pos < data.len() && crate::parser::lexer::is_whitespace(data[pos]) {
        pos += 1;
    }
    &data[pos..]
}

fn skip_ws_pos(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && crate::parser::lexer::is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}

/// Read a decimal number at `pos`, return (value, position after it).
fn read_number(data: &[u8], pos: usize) -> Result<(i64, usize)> {
    let mut end = pos;
    while end < data.len() && data[end].is_ascii_digit() {
        end += 1;
    }
    if end == pos {
        return Err(PdfError::SyntaxError(format!("expected number at {pos}")));
    }
    let text = std::str::from_utf8(&data[pos..end])
        .map_err(|_| PdfError::SyntaxError("invalid number".into()))?;
    let value = text
        .parse()
        .map_err(|_| PdfError::SyntaxError(format!("number out of range at {pos}")))?;
    Ok((value, end))
}

fn int_entry(dict: &Dict, key: &str) -> Option<i64> {
    dict.get(key).and_then(|v| v.as_int().ok())
}

fn offset_entry(dict: &Dict, key: &str) -> Option<usize> {
    int_entry(dict, key).and_then(|n| usize::try_from(n).ok())
}

/// Load every stored section reachable from `startxref`.
pub fn load_revisions(data: &[u8], filters: &dyn FilterPipeline) -> Result<Vec<Revision>> {
    let start = find_startxref(data)?;
    let mut visited = FxHashSet::default();
    let mut newest_first = Vec::new();
    let mut next = Some(start);

    while let Some(pos) = next {
        if !visited.insert(pos) {
            tracing::warn!(pos, "xref /Prev chain loops back on itself");
            break;
        }
        let mut revision = load_section(data, pos, filters)?;
        let trailer = revision
            .trailer
            .as_ref()
            .ok_or_else(|| inconsistent(format!("xref section at {pos} has no trailer")))?;
        let prev = offset_entry(trailer, "Prev");
        let xref_stm = offset_entry(trailer, "XRefStm");

        // Hybrid file: the stream holds the objects the classic table hides,
        // so it is layered above the table of the same section.
        let hidden = match xref_stm {
            Some(stm_pos) if visited.insert(stm_pos) => {
                match load_xref_stream(data, stm_pos, filters) {
                    Ok(mut stm) => {
                        stm.trailer = None;
                        revision.num_objects = revision.num_objects.max(stm.num_objects);
                        Some(stm)
                    }
                    Err(err) => {
                        tracing::warn!(stm_pos, %err, "ignoring unreadable /XRefStm");
                        None
                    }
                }
            }
            _ => None,
        };
        if let Some(stm) = hidden {
            newest_first.push(stm);
        }
        newest_first.push(revision);
        next = prev;
    }

    newest_first.reverse();
    tracing::debug!(sections = newest_first.len(), "loaded stored xref");
    Ok(newest_first)
}

/// Load one section, classic or stream, at `pos`.
pub fn load_section(data: &[u8], pos: usize, filters: &dyn FilterPipeline) -> Result<Revision> {
    let at = data
        .get(pos..)
        .ok_or_else(|| inconsistent(format!("xref offset {pos} beyond end of file")))?;
    if at.starts_with(b"xref") {
        load_classic_xref(data, pos)
    } else {
        load_xref_stream(data, pos, filters)
    }
}

/// Parse a classic `xref` table and the trailer dictionary that follows it.
pub fn load_classic_xref(data: &[u8], pos: usize) -> Result<Revision> {
    let mut revision = Revision::new(RevisionOrigin::Stored);
    let mut cursor = skip_ws_pos(data, pos + 4);

    loop {
        cursor = skip_ws_pos(data, cursor);
        if cursor >= data.len() {
            return Err(inconsistent("xref table runs off the end of the file"));
        }
        if data[cursor..].starts_with(b"trailer") {
            cursor += b"trailer".len();
            break;
        }

        let (start, after) = read_number(data, cursor)?;
        cursor = skip_ws_pos(data, after);
        let (count, after) = read_number(data, cursor)?;
        cursor = after;
        let start = u32::try_from(start).map_err(|_| inconsistent("bad subsection start"))?;
        let count = u32::try_from(count).map_err(|_| inconsistent("bad subsection count"))?;
        if start.saturating_add(count) > MAX_OBJECT_NUMBER + 1 {
            return Err(inconsistent(format!(
                "subsection {start}+{count} exceeds the object number limit"
            )));
        }

        let mut base = start;
        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count {
            cursor = skip_ws_pos(data, cursor);
            let (offset, after) = read_number(data, cursor)?;
            cursor = skip_ws_pos(data, after);
            let (genno, after) = read_number(data, cursor)?;
            cursor = skip_ws_pos(data, after);
            let marker = data.get(cursor).copied().unwrap_or(b'f');
            cursor += 1;

            // Some writers start the first subsection at 1 yet still include
            // the free head of the list for object 0.
            if i == 0 && base == 1 && marker == b'f' && offset == 0 && genno == 65535 {
                base = 0;
            }
            let objid = base + i;
            let genno = u16::try_from(genno).unwrap_or(u16::MAX);
            let entry = match marker {
                b'n' => {
                    let offset = u64::try_from(offset)
                        .map_err(|_| inconsistent("negative xref offset"))?;
                    Entry::in_use(objid, offset, genno)
                }
                b'f' => Entry::free(objid, genno),
                other => {
                    return Err(inconsistent(format!(
                        "bad xref entry type {:?} for object {objid}",
                        other as char
                    )));
                }
            };
            entries.push(entry);
        }
        revision.subsections.push(Subsection::new(base, entries));
    }

    let trailer_pos = skip_ws_pos(data, cursor);
    let mut parser = PDFParser::at(data, trailer_pos);
    let trailer = match parser.parse_object() {
        Ok(PDFObject::Dict(dict)) => dict,
        _ => return Err(inconsistent(format!("unreadable trailer at {trailer_pos}"))),
    };
    revision.end_ofs = parser.tell() as u64;
    finish_revision(&mut revision, trailer);
    Ok(revision)
}

fn finish_revision(revision: &mut Revision, trailer: Dict) {
    let covered = revision
        .subsections
        .iter()
        .map(Subsection::end)
        .max()
        .unwrap_or(0);
    let size = int_entry(&trailer, "Size")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
        .min(MAX_OBJECT_NUMBER + 1);
    revision.num_objects = covered.max(size);
    revision.trailer = Some(trailer);
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Parse a cross-reference stream object at `pos`.
pub fn load_xref_stream(data: &[u8], pos: usize, filters: &dyn FilterPipeline) -> Result<Revision> {
    let ind = parse_indirect_at(data, pos)
        .map_err(|err| inconsistent(format!("no xref stream at {pos}: {err}")))?;
    let PDFObject::Dict(dict) = ind.value else {
        return Err(inconsistent(format!("xref stream at {pos} is not a dictionary")));
    };
    let stm_ofs = ind
        .stm_ofs
        .ok_or_else(|| inconsistent(format!("xref object at {pos} has no stream")))?;

    let widths = match dict.get("W") {
        Some(PDFObject::Array(arr)) if arr.len() == 3 => arr
            .iter()
            .map(|w| w.as_int().ok().and_then(|n| usize::try_from(n).ok()))
            .collect::<Option<SmallVec<[usize; 3]>>>()
            .filter(|w| w.iter().all(|&n| n <= 8))
            .ok_or_else(|| inconsistent("bad /W in xref stream"))?,
        _ => return Err(inconsistent("missing /W in xref stream")),
    };
    let (w0, w1, w2) = (widths[0], widths[1], widths[2]);
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(inconsistent("zero-width xref stream entries"));
    }

    let size = int_entry(&dict, "Size").ok_or_else(|| inconsistent("missing /Size in xref stream"))?;
    let index = match dict.get("Index") {
        Some(PDFObject::Array(arr)) => arr
            .chunks_exact(2)
            .map(|pair| Some((pair[0].as_int().ok()?, pair[1].as_int().ok()?)))
            .collect::<Option<SmallVec<[(i64, i64); 4]>>>()
            .ok_or_else(|| inconsistent("bad /Index in xref stream"))?,
        _ => smallvec![(0, size)],
    };

    let length = offset_entry(&dict, "Length");
    let extent = stream_extent(data, stm_ofs, length);
    let mut decoded = data[extent.start..extent.end].to_vec();
    for spec in filter_chain(&dict) {
        decoded = filters.decode(&decoded, &spec.name, spec.params.as_ref())?;
    }

    let mut revision = Revision::new(RevisionOrigin::Stored);
    let mut rows = decoded.chunks_exact(entry_size);
    for (start, count) in index {
        let (Ok(start), Ok(count)) = (u32::try_from(start), u32::try_from(count)) else {
            return Err(inconsistent("negative /Index range in xref stream"));
        };
        if start.saturating_add(count) > MAX_OBJECT_NUMBER + 1 {
            return Err(inconsistent("xref stream /Index exceeds the object number limit"));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count {
            let Some(row) = rows.next() else {
                break;
            };
            let objid = start + i;
            // A zero-width type field means every entry is type 1.
            let kind = if w0 > 0 { read_field(&row[..w0]) } else { 1 };
            let field1 = read_field(&row[w0..w0 + w1]);
            let field2 = read_field(&row[w0 + w1..]);
            let entry = match kind {
                0 => Entry::free(objid, u16::try_from(field2).unwrap_or(u16::MAX)),
                1 => Entry::in_use(objid, field1, u16::try_from(field2).unwrap_or(u16::MAX)),
                2 => {
                    let container = u32::try_from(field1)
                        .map_err(|_| inconsistent("object stream number out of range"))?;
                    let member = u32::try_from(field2)
                        .map_err(|_| inconsistent("object stream index out of range"))?;
                    Entry::compressed(objid, container, member)
                }
                // Unknown types are reserved and read as null references.
                _ => Entry::free(objid, 0),
            };
            entries.push(entry);
        }
        revision.subsections.push(Subsection::new(start, entries));
    }

    let trailer: Dict = dict
        .into_iter()
        .filter(|(key, _)| !XREF_STREAM_KEYS.contains(&key.as_str()))
        .collect();
    revision.end_ofs = ind.end as u64;
    finish_revision(&mut revision, trailer);
    Ok(revision)
}
