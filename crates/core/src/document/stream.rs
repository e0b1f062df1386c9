//! Stream data access.
//!
//! Raw bytes are what the file stores, with document encryption undone.
//! Decoded bytes have the `/Filter` chain applied as well. An edit's
//! in-memory stream replaces the file bytes entirely.

use super::PDFDocument;
use crate::codec::{FilterSpec, filter_chain, is_image_codec};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};
use crate::parser::stream_extent;
use crate::xref::EntryKind;
use std::io::Read;

/// Stream bytes with the filters that still have to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedStream {
    pub data: Vec<u8>,
    /// Remaining filters, outermost first. Starts at the first image codec.
    pub filters: Vec<FilterSpec>,
    pub truncated: bool,
}

struct RawStream {
    dict: Dict,
    data: Vec<u8>,
    truncated: bool,
}

impl PDFDocument {
    fn stream_dict(&mut self, objid: u32) -> Result<Dict> {
        let value = self.cache_object(objid);
        match &*value {
            PDFObject::Dict(dict) => Ok(dict.clone()),
            other => Err(PdfError::TypeError {
                expected: "stream",
                got: other.type_name(),
            }),
        }
    }

    fn raw_stream(&mut self, objid: u32) -> Result<RawStream> {
        let dict = self.stream_dict(objid)?;
        let entry = self.xref.lookup(objid);
        if let Some(buf) = &entry.stm_buf {
            return Ok(RawStream {
                dict,
                data: buf.to_vec(),
                truncated: false,
            });
        }
        let (stm_ofs, genno) = match entry.kind {
            EntryKind::InUse {
                stm_ofs: Some(stm_ofs),
                genno,
                ..
            } => (stm_ofs, genno),
            _ => {
                return Err(PdfError::TypeError {
                    expected: "stream",
                    got: "dict",
                });
            }
        };
        let original = match entry.original_objid {
            0 => objid,
            n => n,
        };

        let length = match dict.get("Length") {
            Some(len) => self.resolve_chain(len).as_int().ok(),
            None => None,
        };
        let length = length.and_then(|n| usize::try_from(n).ok());

        let data = self.source.available();
        let stm_ofs = usize::try_from(stm_ofs).unwrap_or(usize::MAX);
        let extent = stream_extent(data, stm_ofs, length);
        let mut bytes = data[extent.start..extent.end].to_vec();
        if extent.truncated {
            tracing::warn!(
                objid,
                declared = ?length,
                available = bytes.len(),
                "stream data truncated"
            );
        }
        if let Some(decryptor) = self.decryptor_for(objid, &PDFObject::Dict(dict.clone())) {
            bytes = decryptor.decrypt_stream(original, genno, &bytes, &dict)?;
        }
        Ok(RawStream {
            dict,
            data: bytes,
            truncated: extent.truncated,
        })
    }

    /// Resolve indirect `/Filter` and `/DecodeParms` values so the chain can
    /// be read from a direct dictionary.
    fn resolved_filters(&mut self, dict: &Dict) -> Vec<FilterSpec> {
        let mut direct = Dict::new();
        for key in ["Filter", "DecodeParms", "F", "DP"] {
            let Some(value) = dict.get(key) else {
                continue;
            };
            let value = match &*self.resolve_chain(value) {
                PDFObject::Array(items) => PDFObject::Array(
                    items
                        .iter()
                        .map(|item| (*self.resolve_chain(item)).clone())
                        .collect(),
                ),
                other => other.clone(),
            };
            direct.insert(key.to_string(), value);
        }
        filter_chain(&direct)
    }

    fn decode_chain(&self, mut data: Vec<u8>, chain: &[FilterSpec]) -> Result<Vec<u8>> {
        for spec in chain {
            data = self
                .options
                .filters
                .decode(&data, &spec.name, spec.params.as_ref())?;
        }
        Ok(data)
    }

    /// Raw bytes of stream `objid`: encryption removed, filters kept.
    pub fn load_raw_stream_number(&mut self, objid: u32) -> Result<Vec<u8>> {
        Ok(self.raw_stream(objid)?.data)
    }

    /// Raw bytes of the stream `obj` refers to.
    pub fn load_raw_stream(&mut self, obj: &PDFObject) -> Result<Vec<u8>> {
        self.load_raw_stream_number(stream_objid(obj)?)
    }

    /// Decoded bytes of stream `objid`.
    pub fn load_stream_number(&mut self, objid: u32) -> Result<Vec<u8>> {
        Ok(self.load_stream_truncated(objid)?.0)
    }

    /// Decoded bytes of the stream `obj` refers to.
    pub fn load_stream(&mut self, obj: &PDFObject) -> Result<Vec<u8>> {
        self.load_stream_number(stream_objid(obj)?)
    }

    /// Decoded bytes of stream `objid`, plus whether the stored data was
    /// cut short. Truncated data is decoded as far as it goes.
    pub fn load_stream_truncated(&mut self, objid: u32) -> Result<(Vec<u8>, bool)> {
        let raw = self.raw_stream(objid)?;
        let chain = self.resolved_filters(&raw.dict);
        let decoded = self.decode_chain(raw.data, &chain)?;
        Ok((decoded, raw.truncated))
    }

    /// Bytes of stream `objid` decoded up to, but not including, the first
    /// image codec in its filter chain.
    pub fn load_compressed_stream(&mut self, objid: u32) -> Result<CompressedStream> {
        let raw = self.raw_stream(objid)?;
        let chain = self.resolved_filters(&raw.dict);
        let split = chain
            .iter()
            .position(|spec| is_image_codec(&spec.name))
            .unwrap_or(chain.len());
        let data = self.decode_chain(raw.data, &chain[..split])?;
        Ok(CompressedStream {
            data,
            filters: chain[split..].to_vec(),
            truncated: raw.truncated,
        })
    }

    /// Read and decode an inline stream such as inline image data.
    ///
    /// `length` bytes are taken from `cursor`; a short read is accepted.
    /// Filter names may use the abbreviated inline forms.
    pub fn load_inline_stream(
        &mut self,
        dict: &Dict,
        length: usize,
        cursor: &mut impl Read,
    ) -> Result<Vec<u8>> {
        let data = read_inline(cursor, length)?;
        let chain = self.resolved_filters(dict);
        self.decode_chain(data, &chain)
    }

    /// Read an inline image and decode it up to its image codec.
    pub fn load_compressed_inline_stream(
        &mut self,
        dict: &Dict,
        length: usize,
        cursor: &mut impl Read,
    ) -> Result<CompressedStream> {
        let data = read_inline(cursor, length)?;
        let truncated = data.len() < length;
        let chain = self.resolved_filters(dict);
        let split = chain
            .iter()
            .position(|spec| is_image_codec(&spec.name))
            .unwrap_or(chain.len());
        let data = self.decode_chain(data, &chain[..split])?;
        Ok(CompressedStream {
            data,
            filters: chain[split..].to_vec(),
            truncated,
        })
    }

    /// Decoded page contents.
    ///
    /// `obj` is a content stream or an array of them; array parts are joined
    /// with a single newline. Parts that cannot be loaded are skipped.
    pub fn open_contents_stream(&mut self, obj: &PDFObject) -> Result<Vec<u8>> {
        let resolved = match obj {
            PDFObject::Ref(_) => {
                let direct = self.resolve_chain(obj);
                if let PDFObject::Array(parts) = &*direct {
                    PDFObject::Array(parts.clone())
                } else {
                    obj.clone()
                }
            }
            other => other.clone(),
        };
        match resolved {
            PDFObject::Array(parts) => {
                let mut out = Vec::new();
                for (i, part) in parts.iter().enumerate() {
                    match self.load_stream(part) {
                        Ok(data) => {
                            if i > 0 {
                                out.push(b'\n');
                            }
                            out.extend_from_slice(&data);
                        }
                        Err(err) => tracing::warn!(part = %part, %err, "skipping content stream"),
                    }
                }
                Ok(out)
            }
            PDFObject::Ref(_) => self.load_stream(&resolved),
            PDFObject::Null => Ok(Vec::new()),
            other => Err(PdfError::TypeError {
                expected: "stream",
                got: other.type_name(),
            }),
        }
    }
}

fn stream_objid(obj: &PDFObject) -> Result<u32> {
    match obj {
        PDFObject::Ref(r) => Ok(r.objid),
        other => Err(PdfError::TypeError {
            expected: "ref",
            got: other.type_name(),
        }),
    }
}

fn read_inline(cursor: &mut impl Read, length: usize) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(length.min(1 << 20));
    cursor.take(length as u64).read_to_end(&mut data)?;
    if data.len() < length {
        tracing::warn!(length, read = data.len(), "inline stream cut short");
    }
    Ok(data)
}
