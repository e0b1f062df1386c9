//! RunLength stream decoder.

use crate::error::Result;

/// Decode RunLength-encoded data.
///
/// - Length byte 0-127: copy the next (length + 1) bytes literally
/// - Length byte 128: end of data
/// - Length byte 129-255: repeat the next byte (257 - length) times
///
/// A run cut short by the end of the input is dropped.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let Some(run) = data.get(i..i + count) else {
                    break;
                };
                result.extend_from_slice(run);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else {
                    break;
                };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
            }
        }
    }

    Ok(result)
}
