//! Object streams: containers holding several objects in one compressed blob.
//!
//! The decoded data starts with `N` pairs of integers (member number,
//! offset relative to `/First`) followed by the member values.

use super::PDFDocument;
use crate::error::{PdfError, Result};
use crate::model::objects::PDFObject;
use crate::parser::{PDFParser, parse_value_at};
use crate::xref::{EntryKind, MAX_OBJECT_NUMBER};
use std::sync::Arc;

/// Member table of a decoded object stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStreamHeader {
    /// (object number, offset relative to `first`) for each member.
    pub members: Vec<(u32, usize)>,
    pub first: usize,
}

/// Read the member table of an object stream.
pub fn parse_header(data: &[u8], n: usize, first: usize) -> Result<ObjectStreamHeader> {
    if first > data.len() {
        return Err(PdfError::SyntaxError(format!(
            "object stream /First {first} beyond decoded length {}",
            data.len()
        )));
    }
    let mut parser = PDFParser::new(&data[..first]);
    let mut members = Vec::with_capacity(n.min(first / 2 + 1));
    for _ in 0..n {
        let objid = parser.parse_object()?.as_int()?;
        let offset = parser.parse_object()?.as_int()?;
        let (Ok(objid), Ok(offset)) = (u32::try_from(objid), usize::try_from(offset)) else {
            return Err(PdfError::SyntaxError("negative object stream header entry".into()));
        };
        members.push((objid, offset));
    }
    Ok(ObjectStreamHeader { members, first })
}

/// Parse every member of a decoded object stream.
///
/// Members that fail to parse are skipped; the rest are still returned.
pub fn parse_members(data: &[u8], header: &ObjectStreamHeader) -> Vec<(u32, usize, PDFObject)> {
    let mut out = Vec::with_capacity(header.members.len());
    for (index, &(objid, offset)) in header.members.iter().enumerate() {
        match parse_value_at(data, header.first + offset) {
            Ok((value, _)) => out.push((objid, index, value)),
            Err(err) => tracing::debug!(objid, index, %err, "skipping unparsable member"),
        }
    }
    out
}

fn header_int(dict: &PDFObject, key: &str) -> Result<usize> {
    let value = dict
        .get(key)
        .ok_or_else(|| PdfError::SyntaxError(format!("object stream without /{key}")))?
        .as_int()?;
    usize::try_from(value).map_err(|_| PdfError::SyntaxError(format!("negative /{key}")))
}

impl PDFDocument {
    /// Decode object stream `container` and return its header and data.
    pub fn read_object_stream(&mut self, container: u32) -> Result<(ObjectStreamHeader, Vec<u8>)> {
        if self.xref.lookup(container).is_compressed() {
            return Err(PdfError::SyntaxError(format!(
                "object stream {container} is itself inside an object stream"
            )));
        }
        let dict = self.cache_object(container);
        if !dict.is_type("ObjStm") && dict.get("N").is_none() {
            return Err(PdfError::SyntaxError(format!(
                "object {container} is not an object stream"
            )));
        }
        let n = header_int(&dict, "N")?;
        let first = header_int(&dict, "First")?;
        let data = self.load_stream_number(container)?;
        let header = parse_header(&data, n, first)?;
        Ok((header, data))
    }

    /// Parse object stream `container` and cache every member whose index
    /// entry points at it.
    pub fn load_object_stream(&mut self, container: u32) -> Result<()> {
        let (header, data) = self.read_object_stream(container)?;

        let members = parse_members(&data, &header);
        let mut filled = 0usize;
        for (objid, _, value) in members {
            if objid == 0 || objid > MAX_OBJECT_NUMBER {
                continue;
            }
            let Some(entry) = self.xref.lookup_mut(objid) else {
                continue;
            };
            let belongs = matches!(entry.kind, EntryKind::Compressed { container: c, .. } if c == container);
            if belongs && entry.obj.is_none() {
                entry.obj = Some(Arc::new(value));
                filled += 1;
            }
        }
        tracing::trace!(container, filled, "loaded object stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_members() {
        let data = b"10 0 11 4 12 8 (a) [1] << /K 2 >>";
        let header = parse_header(data, 3, 15).unwrap();
        assert_eq!(header.members, vec![(10, 0), (11, 4), (12, 8)]);
        let members = parse_members(data, &header);
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].2, PDFObject::String(b"a".to_vec()));
        assert_eq!(members[1].2, PDFObject::Array(vec![PDFObject::Int(1)]));
        assert_eq!(members[2].2.get("K"), Some(&PDFObject::Int(2)));
    }

    #[test]
    fn first_beyond_data_is_rejected() {
        assert!(parse_header(b"1 0", 1, 50).is_err());
    }
}
