//! Predictor reversal for Flate and LZW streams.
//!
//! Cross-reference streams almost always use the PNG Up predictor, so the
//! PNG path is the one that matters for index loading.

use crate::error::{PdfError, Result};

/// Sample layout taken from `/DecodeParms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub columns: usize,
    pub colors: usize,
    pub bits_per_component: usize,
}

impl RowLayout {
    /// Bytes in one unpredicted row, or `None` when the layout overflows.
    pub const fn row_bytes(&self) -> Option<usize> {
        match self.colors.checked_mul(self.columns) {
            Some(samples) => match samples.checked_mul(self.bits_per_component) {
                Some(bits) => Some(bits.div_ceil(8)),
                None => None,
            },
            None => None,
        }
    }

    /// Row size checked against the data it applies to. A row longer than
    /// the whole stream can only come from bogus parameters.
    fn checked_row_bytes(&self, data: &[u8]) -> Result<usize> {
        match self.row_bytes() {
            Some(row_bytes) if row_bytes <= data.len() => Ok(row_bytes),
            _ => Err(PdfError::DecodeError(format!(
                "predictor row of {} columns does not fit {} bytes",
                self.columns,
                data.len()
            ))),
        }
    }

    /// Bytes per pixel, at least one.
    pub const fn bpp(&self) -> usize {
        let bpp = self.colors * self.bits_per_component / 8;
        if bpp == 0 { 1 } else { bpp }
    }
}

/// Reverse PNG prediction: every row starts with a filter-type byte.
///
/// A trailing partial row is dropped.
pub fn apply_png_predictor(data: &[u8], layout: RowLayout) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let row_bytes = layout.checked_row_bytes(data)?;
    let bpp = layout.bpp();
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let filter_type = row[0];
        let row_data = &row[1..];

        match filter_type {
            // Sub
            1 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            // Up
            2 => {
                for i in 0..row_bytes {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            // Average
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp {
                        u16::from(current_row[i - bpp])
                    } else {
                        0
                    };
                    let above = u16::from(prev_row[i]);
                    current_row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            // Paeth
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let above = prev_row[i];
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(paeth_predictor(left, above, upper_left));
                }
            }
            // None, and unknown filter types are copied as-is.
            _ => current_row.copy_from_slice(row_data),
        }

        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// Reverse TIFF predictor 2 (horizontal differencing).
///
/// Only 8-bit components are differenced; other depths pass through.
pub fn apply_tiff_predictor(data: &[u8], layout: RowLayout) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    if layout.bits_per_component != 8 || data.is_empty() {
        return Ok(out);
    }
    let row_bytes = layout.checked_row_bytes(data)?;
    let colors = layout.colors;
    for row in out.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(out)
}
