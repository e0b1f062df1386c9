//! LZW stream decoder using weezl crate.

use crate::error::Result;
use weezl::{BitOrder, decode::Decoder};

/// Decode LZW-encoded data with the given `/EarlyChange` setting.
///
/// EarlyChange=1, the PDF default, widens codes one code early the way TIFF
/// does; EarlyChange=0 is the GIF-style switch.
/// Corrupt data yields the output decoded before the error.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    let status = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = status.status {
        tracing::debug!(%err, produced = output.len(), "LZW stream ended early");
    }
    Ok(output)
}
