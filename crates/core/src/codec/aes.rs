//! AES-CBC helpers for AESV2/AESV3 encrypted objects.

use crate::error::{PdfError, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Decrypt `data` whose first 16 bytes are the IV, then strip PKCS#7
/// padding. A ragged tail (not a whole block) is ignored.
pub fn aes_cbc_decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 {
        return Ok(Vec::new());
    }
    let (iv, body) = data.split_at(16);
    let whole = body.len() / 16 * 16;
    let mut buf = body[..whole].to_vec();
    let bad_key = |_| PdfError::DecodeError(format!("invalid AES key length {}", key.len()));
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| PdfError::DecodeError("AES block error".into()))?;
        }
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| PdfError::DecodeError("AES block error".into()))?;
        }
        n => return Err(PdfError::DecodeError(format!("invalid AES key length {n}"))),
    }
    let len = unpad_aes(&buf).len();
    buf.truncate(len);
    Ok(buf)
}

/// Remove PKCS#7 padding. Invalid padding leaves the data unchanged.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b as usize == pad_len) {
        &data[..start]
    } else {
        data
    }
}
