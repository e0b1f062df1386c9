//! Stream filters and document-level decryption.
//!
//! This module contains:
//! - `flate`: zlib inflate with a lenient fallback for damaged data
//! - `predictor`: PNG and TIFF predictor reversal
//! - `ascii85`: ASCII85 and ASCIIHex decoding
//! - `lzw`: LZW decompression
//! - `runlength`: Run-length decoding
//! - `arcfour`, `aes`, `crypt`: per-object decryption

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod crypt;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use crypt::{CryptMethod, Decryptor, StandardDecryptor};

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject};

/// One entry of a stream's `/Filter` chain with its `/DecodeParms`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub name: String,
    pub params: Option<Dict>,
}

/// Decodes one filter stage.
///
/// Implementations must be shareable; a document holds its pipeline behind
/// an `Arc` and may be moved across threads between operations.
pub trait FilterPipeline: Send + Sync {
    fn decode(&self, data: &[u8], name: &str, params: Option<&Dict>) -> Result<Vec<u8>>;
}

/// Map abbreviated inline-image filter names to their full form.
pub fn canonical_filter_name(name: &str) -> &str {
    match name {
        "Fl" => "FlateDecode",
        "LZW" => "LZWDecode",
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "RL" => "RunLengthDecode",
        "DCT" => "DCTDecode",
        "CCF" => "CCITTFaxDecode",
        other => other,
    }
}

/// Filters whose output is image samples; the core never decodes these.
pub fn is_image_codec(name: &str) -> bool {
    matches!(
        canonical_filter_name(name),
        "DCTDecode" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode"
    )
}

/// Read the `/Filter` and `/DecodeParms` entries of a stream dictionary.
///
/// Values must already be direct; indirect names or parameter dictionaries
/// are resolved by the caller. Parameters that are not dictionaries (such as
/// `null` placeholders in a parameter array) are dropped.
pub fn filter_chain(dict: &Dict) -> Vec<FilterSpec> {
    let names: Vec<&str> = match dict.get("Filter").or_else(|| dict.get("F")) {
        Some(PDFObject::Name(name)) => vec![name.as_str()],
        Some(PDFObject::Array(arr)) => arr.iter().filter_map(|f| f.as_name().ok()).collect(),
        _ => Vec::new(),
    };
    let params = dict.get("DecodeParms").or_else(|| dict.get("DP"));
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let params = match params {
                Some(PDFObject::Dict(d)) if i == 0 => Some(d.clone()),
                Some(PDFObject::Array(arr)) => arr.get(i).and_then(|p| p.as_dict().ok()).cloned(),
                _ => None,
            };
            FilterSpec {
                name: canonical_filter_name(name).to_string(),
                params,
            }
        })
        .collect()
}

fn int_param(params: Option<&Dict>, key: &str, default: i64) -> i64 {
    params
        .and_then(|p| p.get(key))
        .and_then(|v| v.as_int().ok())
        .unwrap_or(default)
}

/// The built-in decoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardFilters;

impl StandardFilters {
    fn predict(data: Vec<u8>, params: Option<&Dict>) -> Result<Vec<u8>> {
        let predictor = int_param(params, "Predictor", 1);
        if predictor <= 1 {
            return Ok(data);
        }
        let columns = usize::try_from(int_param(params, "Columns", 1).max(1))
            .map_err(|_| PdfError::DecodeError("predictor /Columns out of range".into()))?;
        let layout = predictor::RowLayout {
            columns,
            colors: int_param(params, "Colors", 1).clamp(1, 32) as usize,
            bits_per_component: int_param(params, "BitsPerComponent", 8).clamp(1, 16) as usize,
        };
        match predictor {
            2 => predictor::apply_tiff_predictor(&data, layout),
            10..=15 => predictor::apply_png_predictor(&data, layout),
            other => Err(PdfError::DecodeError(format!("unknown predictor {other}"))),
        }
    }
}

impl FilterPipeline for StandardFilters {
    fn decode(&self, data: &[u8], name: &str, params: Option<&Dict>) -> Result<Vec<u8>> {
        match canonical_filter_name(name) {
            "FlateDecode" => Self::predict(flate::inflate(data), params),
            "LZWDecode" => {
                let early_change = int_param(params, "EarlyChange", 1);
                Self::predict(lzw::lzwdecode_with_earlychange(data, early_change)?, params)
            }
            "ASCIIHexDecode" => ascii85::asciihexdecode(data),
            "ASCII85Decode" => ascii85::ascii85decode(data),
            "RunLengthDecode" => runlength::rldecode(data),
            // Document-level decryption already happened; /Identity crypt
            // filters are all that can remain.
            "Crypt" => Ok(data.to_vec()),
            other => Err(PdfError::UnsupportedFilter(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn filter_chain_pairs_params_by_position() {
        let mut parms = Dict::new();
        parms.insert("Predictor".into(), PDFObject::Int(12));
        let mut dict = Dict::new();
        dict.insert(
            "Filter".into(),
            PDFObject::Array(vec![PDFObject::name("A85"), PDFObject::name("FlateDecode")]),
        );
        dict.insert(
            "DecodeParms".into(),
            PDFObject::Array(vec![PDFObject::Null, PDFObject::Dict(parms.clone())]),
        );
        let chain = filter_chain(&dict);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "ASCII85Decode");
        assert_eq!(chain[0].params, None);
        assert_eq!(chain[1].params, Some(parms));
    }

    #[test]
    fn flate_with_png_up_predictor() {
        // Two rows of 3 bytes, second row encoded with the Up filter.
        let predicted = [0u8, 1, 2, 3, 2, 1, 1, 1];
        let mut parms = Dict::new();
        parms.insert("Predictor".into(), PDFObject::Int(12));
        parms.insert("Columns".into(), PDFObject::Int(3));
        let out = StandardFilters
            .decode(&deflate(&predicted), "FlateDecode", Some(&parms))
            .unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn hostile_predictor_columns_are_a_decode_error() {
        let mut parms = Dict::new();
        parms.insert("Predictor".into(), PDFObject::Int(12));
        parms.insert("Columns".into(), PDFObject::Int(4_611_686_018_427_387_904));
        let err = StandardFilters
            .decode(&deflate(&[2, 0, 0, 0]), "FlateDecode", Some(&parms))
            .unwrap_err();
        assert!(matches!(err, PdfError::DecodeError(_)));
    }

    #[test]
    fn image_codecs_are_unsupported() {
        let err = StandardFilters.decode(b"xx", "DCTDecode", None).unwrap_err();
        assert!(matches!(err, PdfError::UnsupportedFilter(name) if name == "DCTDecode"));
        assert!(is_image_codec("CCF"));
        assert!(!is_image_codec("Fl"));
    }
}
