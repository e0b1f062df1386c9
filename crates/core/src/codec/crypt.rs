//! Per-object decryption of strings and stream data.
//!
//! Key derivation from passwords is not done here: a [`StandardDecryptor`]
//! is built from an already-derived file key.

use super::aes::aes_cbc_decrypt_with_iv;
use super::arcfour::Arcfour;
use crate::error::Result;
use crate::model::objects::Dict;

/// Decrypts data belonging to one indirect object.
///
/// `objid` is always the object's original number, as stored in the file,
/// even if the object was renumbered afterwards.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, objid: u32, genno: u16, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a string value.
    fn decrypt_string(&self, objid: u32, genno: u16, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt(objid, genno, data)
    }

    /// Decrypt stream data. `dict` lets handlers skip unencrypted metadata.
    fn decrypt_stream(&self, objid: u32, genno: u16, data: &[u8], dict: &Dict) -> Result<Vec<u8>> {
        let _ = dict;
        self.decrypt(objid, genno, data)
    }
}

/// Crypt filter method (`/CFM`), or the implicit method of V1/V2 handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    /// RC4 with a per-object key.
    V2,
    /// AES-128-CBC with a per-object key.
    AesV2,
    /// AES-256-CBC with the file key.
    AesV3,
}

/// Standard security handler decryption with a known file key.
#[derive(Debug, Clone)]
pub struct StandardDecryptor {
    key: Vec<u8>,
    strings: CryptMethod,
    streams: CryptMethod,
    encrypt_metadata: bool,
}

impl StandardDecryptor {
    /// A handler that uses `method` for both strings and streams.
    pub fn new(key: impl Into<Vec<u8>>, method: CryptMethod) -> Self {
        Self {
            key: key.into(),
            strings: method,
            streams: method,
            encrypt_metadata: true,
        }
    }

    /// Use different methods for strings (`/StrF`) and streams (`/StmF`).
    pub const fn with_methods(mut self, strings: CryptMethod, streams: CryptMethod) -> Self {
        self.strings = strings;
        self.streams = streams;
        self
    }

    /// Leave `/Type /Metadata` streams untouched (`/EncryptMetadata false`).
    pub const fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// Per-object key: md5(file key, objid low 3 bytes, genno low 2 bytes [, "sAlT"]).
    fn object_key(&self, objid: u32, genno: u16, salt: bool) -> [u8; 16] {
        let mut key_data = self.key.clone();
        key_data.extend_from_slice(&objid.to_le_bytes()[..3]);
        key_data.extend_from_slice(&genno.to_le_bytes());
        if salt {
            key_data.extend_from_slice(b"sAlT");
        }
        md5::compute(&key_data).0
    }

    fn decrypt_with_method(
        &self,
        method: CryptMethod,
        objid: u32,
        genno: u16,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::V2 => {
                let key = self.object_key(objid, genno, false);
                let key_len = (self.key.len() + 5).min(16);
                Ok(Arcfour::new(&key[..key_len]).process(data))
            }
            CryptMethod::AesV2 => {
                let key = self.object_key(objid, genno, true);
                aes_cbc_decrypt_with_iv(&key, data)
            }
            CryptMethod::AesV3 => aes_cbc_decrypt_with_iv(&self.key, data),
        }
    }
}

impl Decryptor for StandardDecryptor {
    fn decrypt(&self, objid: u32, genno: u16, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_method(self.streams, objid, genno, data)
    }

    fn decrypt_string(&self, objid: u32, genno: u16, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_method(self.strings, objid, genno, data)
    }

    fn decrypt_stream(&self, objid: u32, genno: u16, data: &[u8], dict: &Dict) -> Result<Vec<u8>> {
        let is_metadata = dict
            .get("Type")
            .and_then(|t| t.as_name().ok())
            .is_some_and(|name| name == "Metadata");
        if is_metadata && !self.encrypt_metadata {
            return Ok(data.to_vec());
        }
        self.decrypt_with_method(self.streams, objid, genno, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_is_keyed_per_object() {
        let dec = StandardDecryptor::new(b"12345".to_vec(), CryptMethod::V2);
        let plain = b"secret text";
        // RC4 is symmetric, so decrypting twice restores the input.
        let once = dec.decrypt(4, 0, plain).unwrap();
        assert_ne!(once, plain);
        assert_eq!(dec.decrypt(4, 0, &once).unwrap(), plain);
        assert_ne!(dec.decrypt(5, 0, plain).unwrap(), once);
    }

    #[test]
    fn metadata_can_stay_clear() {
        let dec = StandardDecryptor::new(b"12345".to_vec(), CryptMethod::V2)
            .with_encrypt_metadata(false);
        let mut dict = Dict::new();
        dict.insert(
            "Type".into(),
            crate::model::objects::PDFObject::name("Metadata"),
        );
        assert_eq!(dec.decrypt_stream(1, 0, b"<x/>", &dict).unwrap(), b"<x/>");
    }
}
