//! Builds small PDF files byte by byte so tests control every offset,
//! index section and defect.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use pdfxref_core::{MemorySource, PDFDocument};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    InUse { offset: usize, genno: u16 },
    Compressed { container: u32, index: u32 },
    Free { genno: u16 },
}

#[derive(Debug, Default)]
pub struct FixtureBuilder {
    buf: Vec<u8>,
    /// Slots written since the last index section.
    pending: BTreeMap<u32, Slot>,
    all: BTreeMap<u32, Slot>,
    last_xref: Option<usize>,
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

impl FixtureBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.buf.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");
        builder
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    fn record(&mut self, objid: u32, slot: Slot) {
        self.pending.insert(objid, slot);
        self.all.insert(objid, slot);
    }

    pub fn offset_of(&self, objid: u32) -> usize {
        match self.all.get(&objid) {
            Some(Slot::InUse { offset, .. }) => *offset,
            other => panic!("object {objid} has no offset: {other:?}"),
        }
    }

    /// Append bytes that are not indexed.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, objid: u32, body: &str) -> &mut Self {
        self.object_gen(objid, 0, body)
    }

    pub fn object_gen(&mut self, objid: u32, genno: u16, body: &str) -> &mut Self {
        let offset = self.buf.len();
        self.record(objid, Slot::InUse { offset, genno });
        self.buf
            .extend_from_slice(format!("{objid} {genno} obj\n{body}\nendobj\n").as_bytes());
        self
    }

    /// A stream whose dictionary holds `dict` plus a correct `/Length`.
    pub fn stream(&mut self, objid: u32, dict: &str, data: &[u8]) -> &mut Self {
        let length = data.len().to_string();
        self.stream_with_length(objid, dict, data, &length)
    }

    /// A stream with `/Length` written as given, right or wrong.
    pub fn stream_with_length(&mut self, objid: u32, dict: &str, data: &[u8], length: &str) -> &mut Self {
        let offset = self.buf.len();
        self.record(objid, Slot::InUse { offset, genno: 0 });
        self.buf.extend_from_slice(
            format!("{objid} 0 obj\n<< {dict} /Length {length} >>\nstream\n").as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    pub fn flate_stream(&mut self, objid: u32, dict: &str, data: &[u8]) -> &mut Self {
        let packed = deflate(data);
        self.stream(objid, &format!("{dict} /Filter /FlateDecode"), &packed)
    }

    /// An object stream holding `members` (number, value text), in order.
    pub fn object_stream(&mut self, objid: u32, members: &[(u32, &str)], compress: bool) -> &mut Self {
        let mut header = String::new();
        let mut body = String::new();
        for (member, value) in members {
            header.push_str(&format!("{member} {} ", body.len()));
            body.push_str(value);
            body.push('\n');
        }
        let first = header.len();
        let data = format!("{header}{body}");
        let dict = format!("/Type /ObjStm /N {} /First {first}", members.len());
        if compress {
            self.flate_stream(objid, &dict, data.as_bytes());
        } else {
            self.stream(objid, &dict, data.as_bytes());
        }
        for (index, (member, _)) in members.iter().enumerate() {
            self.record(
                *member,
                Slot::Compressed {
                    container: objid,
                    index: index as u32,
                },
            );
        }
        self
    }

    /// Index `objid` as member `index` of `container` without writing the
    /// container.
    pub fn compressed(&mut self, objid: u32, container: u32, index: u32) -> &mut Self {
        self.record(objid, Slot::Compressed { container, index });
        self
    }

    /// Index `objid` as free in the next section.
    pub fn free(&mut self, objid: u32, genno: u16) -> &mut Self {
        self.record(objid, Slot::Free { genno });
        self
    }

    fn size(&self) -> u32 {
        self.all.keys().next_back().map_or(1, |max| max + 1)
    }

    /// Pending slots grouped into contiguous runs, with the free-list head
    /// for object 0 in the first section.
    fn runs(&mut self, include: impl Fn(&Slot) -> bool) -> Vec<(u32, Vec<Slot>)> {
        let mut slots: Vec<(u32, Slot)> = self
            .pending
            .iter()
            .filter(|(_, slot)| include(slot))
            .map(|(k, v)| (*k, *v))
            .collect();
        if self.last_xref.is_none() {
            slots.insert(0, (0, Slot::Free { genno: 65535 }));
        }
        let mut runs: Vec<(u32, Vec<Slot>)> = Vec::new();
        for (objid, slot) in slots {
            match runs.last_mut() {
                Some((start, run)) if *start + run.len() as u32 == objid => run.push(slot),
                _ => runs.push((objid, vec![slot])),
            }
        }
        runs
    }

    fn write_startxref(&mut self, pos: usize) {
        self.buf
            .extend_from_slice(format!("startxref\n{pos}\n%%EOF\n").as_bytes());
        self.last_xref = Some(pos);
        self.pending.clear();
    }

    fn trailer_keys(&self, extra: &str) -> String {
        let mut keys = format!("/Size {}", self.size());
        if let Some(prev) = self.last_xref {
            keys.push_str(&format!(" /Prev {prev}"));
        }
        if !extra.is_empty() {
            keys.push(' ');
            keys.push_str(extra);
        }
        keys
    }

    /// Write a classic `xref` table for the pending slots, its trailer and
    /// `startxref`. Compressed slots are left out. Returns the table offset.
    pub fn xref_table(&mut self, trailer: &str) -> usize {
        self.xref_table_with(trailer, |_, offset| offset)
    }

    /// Like [`xref_table`](Self::xref_table) with every in-use offset passed
    /// through `adjust`, for writing a lying index.
    pub fn xref_table_with(&mut self, trailer: &str, adjust: impl Fn(u32, usize) -> usize) -> usize {
        let pos = self.buf.len();
        let runs = self.runs(|slot| !matches!(slot, Slot::Compressed { .. }));
        let mut out = String::from("xref\n");
        for (start, run) in &runs {
            out.push_str(&format!("{start} {}\n", run.len()));
            for (i, slot) in run.iter().enumerate() {
                let objid = start + i as u32;
                match *slot {
                    Slot::InUse { offset, genno } => {
                        out.push_str(&format!("{:010} {genno:05} n \n", adjust(objid, offset)));
                    }
                    Slot::Free { genno } => out.push_str(&format!("{:010} {genno:05} f \n", 0)),
                    Slot::Compressed { .. } => unreachable!(),
                }
            }
        }
        out.push_str(&format!("trailer\n<< {} >>\n", self.trailer_keys(trailer)));
        self.buf.extend_from_slice(out.as_bytes());
        self.write_startxref(pos);
        pos
    }

    /// Write a cross-reference stream object `objid` covering the pending
    /// slots, then `startxref`. Returns the stream object's offset.
    pub fn xref_stream(&mut self, objid: u32, trailer: &str) -> usize {
        let pos = self.buf.len();
        self.record(objid, Slot::InUse { offset: pos, genno: 0 });
        let runs = self.runs(|_| true);
        let keys = self.trailer_keys(trailer);
        self.write_xref_stream_object(objid, &runs, &keys);
        self.write_startxref(pos);
        pos
    }

    /// Hybrid file section: an xref stream `stm_objid` for the compressed
    /// slots, then a classic table for the rest whose trailer points at the
    /// stream with `/XRefStm`. Returns the classic table's offset.
    pub fn hybrid_xref(&mut self, stm_objid: u32, trailer: &str) -> usize {
        let stm_pos = self.buf.len();
        let runs: Vec<(u32, Vec<Slot>)> = {
            let mut runs: Vec<(u32, Vec<Slot>)> = Vec::new();
            for (objid, slot) in &self.pending {
                if !matches!(slot, Slot::Compressed { .. }) {
                    continue;
                }
                match runs.last_mut() {
                    Some((start, run)) if *start + run.len() as u32 == *objid => run.push(*slot),
                    _ => runs.push((*objid, vec![*slot])),
                }
            }
            runs
        };
        let keys = format!("/Size {}", self.size().max(stm_objid + 1));
        self.write_xref_stream_object(stm_objid, &runs, &keys);
        self.record(stm_objid, Slot::InUse { offset: stm_pos, genno: 0 });
        self.xref_table(&format!("{trailer} /XRefStm {stm_pos}"))
    }

    fn write_xref_stream_object(&mut self, objid: u32, runs: &[(u32, Vec<Slot>)], keys: &str) {
        let mut data = Vec::new();
        let mut index = String::new();
        for (start, run) in runs {
            index.push_str(&format!("{start} {} ", run.len()));
            for slot in run {
                let (kind, field1, field2) = match *slot {
                    Slot::Free { genno } => (0u8, 0u32, genno),
                    Slot::InUse { offset, genno } => (1, offset as u32, genno),
                    Slot::Compressed { container, index } => (2, container, index as u16),
                };
                data.push(kind);
                data.extend_from_slice(&field1.to_be_bytes());
                data.extend_from_slice(&field2.to_be_bytes());
            }
        }
        let dict = format!("/Type /XRef {keys} /W [1 4 2] /Index [{}]", index.trim_end());
        self.buf.extend_from_slice(
            format!("{objid} 0 obj\n<< {dict} /Length {} >>\nstream\n", data.len()).as_bytes(),
        );
        self.buf.extend_from_slice(&data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    pub fn build(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Catalog 1, page tree 2, one page 3 with content stream 4, classic index.
pub fn simple_pdf() -> Vec<u8> {
    let mut b = FixtureBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents 4 0 R >>",
        )
        .stream(4, "", b"BT /F1 12 Tf (Hello) Tj ET");
    b.xref_table("/Root 1 0 R");
    b.build()
}

pub fn open(bytes: Vec<u8>) -> PDFDocument {
    PDFDocument::open(MemorySource::new(bytes)).expect("open fixture")
}

/// Point the last `startxref` past the end of the file.
pub fn break_startxref(data: &mut [u8]) {
    let needle = b"startxref";
    let pos = data
        .windows(needle.len())
        .rposition(|w| w == needle)
        .expect("startxref present")
        + needle.len();
    for b in &mut data[pos..] {
        if b.is_ascii_digit() {
            *b = b'9';
        }
    }
}
