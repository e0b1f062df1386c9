//! zlib inflate.

use flate2::{Decompress, FlushDecompress, Status};
use std::io::Read;

/// Inflate zlib data. Damaged input yields whatever decoded cleanly
/// before the damage.
pub fn inflate(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_err() {
        tracing::debug!(len = data.len(), "flate stream damaged, decoding leniently");
        out = decompress_corrupted(data);
    }
    out
}

/// Best-effort zlib decompression for corrupted streams.
///
/// Feeds the decoder one byte at a time and keeps everything it produced up
/// to the first failure (often a bad checksum or a truncated tail).
pub fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    // Drain output still buffered inside the decoder.
    loop {
        let before_out = decoder.total_out();
        match decoder.decompress(&[], &mut buf, FlushDecompress::Sync) {
            Ok(_) => {
                let produced = (decoder.total_out() - before_out) as usize;
                if produced == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..produced]);
            }
            Err(_) => break,
        }
    }
    out
}
