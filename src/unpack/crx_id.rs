//! Chrome extension id derivation.
//!
//! Chrome ids are the first 128 bits of the SHA-256 of the DER encoded
//! public key, written as 32 characters in the alphabet `a..=p`. CRX3
//! packages also carry the id directly inside the signed header data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use super::crx::ParsedHeader;

const ID_BYTES: usize = 16;

// CrxFileHeader field numbers (components/crx_file/crx3.proto)
const FIELD_SHA256_WITH_RSA: u64 = 2;
const FIELD_SHA256_WITH_ECDSA: u64 = 3;
const FIELD_SIGNED_HEADER_DATA: u64 = 10000;
// AsymmetricKeyProof
const FIELD_PUBLIC_KEY: u64 = 1;
// SignedData
const FIELD_CRX_ID: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    pub fn from_id_bytes(bytes: &[u8; ID_BYTES]) -> Self {
        let mut id = String::with_capacity(ID_BYTES * 2);
        for byte in bytes {
            id.push((b'a' + (byte >> 4)) as char);
            id.push((b'a' + (byte & 0x0f)) as char);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn extension_id_from_public_key(der: &[u8]) -> ExtensionId {
    let digest = Sha256::digest(der);
    let mut bytes = [0u8; ID_BYTES];
    bytes.copy_from_slice(&digest[..ID_BYTES]);
    ExtensionId::from_id_bytes(&bytes)
}

/// Read the id from a CRX3 `CrxFileHeader`.
///
/// Prefers `signed_header_data.crx_id`; falls back to hashing the first
/// declared public key. Returns `None` for malformed or empty headers.
pub fn extension_id_from_crx3_header(header: &[u8]) -> Option<ExtensionId> {
    let mut first_key: Option<&[u8]> = None;

    for (field, value) in ProtoFields::new(header) {
        let Some(value) = value else { continue };
        match field {
            FIELD_SIGNED_HEADER_DATA => {
                for (inner, data) in ProtoFields::new(value) {
                    if inner == FIELD_CRX_ID
                        && let Some(data) = data
                        && let Ok(bytes) = <[u8; ID_BYTES]>::try_from(data)
                    {
                        return Some(ExtensionId::from_id_bytes(&bytes));
                    }
                }
            }
            FIELD_SHA256_WITH_RSA | FIELD_SHA256_WITH_ECDSA if first_key.is_none() => {
                first_key = ProtoFields::new(value)
                    .find(|(inner, _)| *inner == FIELD_PUBLIC_KEY)
                    .and_then(|(_, key)| key);
            }
            _ => {}
        }
    }

    first_key.map(extension_id_from_public_key)
}

/// Derive an id from the manifest `key` field (base64 DER public key).
pub fn extension_id_from_manifest_key(key: &str) -> Option<ExtensionId> {
    let compact: String = key.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .ok()
        .filter(|der| !der.is_empty())
        .map(|der| extension_id_from_public_key(&der))
}

/// Best available id for a package, or `None` when it carries no key material.
pub fn derive_extension_id(
    data: &[u8],
    header: Option<&ParsedHeader>,
    manifest_key: Option<&str>,
) -> Option<ExtensionId> {
    if let Some(header) = header {
        if let Some(range) = &header.signed_header
            && let Some(bytes) = data.get(range.clone())
            && let Some(id) = extension_id_from_crx3_header(bytes)
        {
            return Some(id);
        }
        if let Some(range) = &header.public_key
            && let Some(key) = data.get(range.clone())
        {
            return Some(extension_id_from_public_key(key));
        }
    }
    manifest_key.and_then(extension_id_from_manifest_key)
}

/// Iterator over top-level protobuf fields.
///
/// Yields `(field_number, Some(bytes))` for length-delimited fields and
/// `(field_number, None)` for scalar fields. Stops at the first malformed
/// record.
struct ProtoFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ProtoFields<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        let end = self.pos.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }
}

impl<'a> Iterator for ProtoFields<'a> {
    type Item = (u64, Option<&'a [u8]>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let key = self.read_varint()?;
        let field = key >> 3;
        match key & 0x7 {
            0 => {
                self.read_varint()?;
                Some((field, None))
            }
            1 => {
                self.skip(8)?;
                Some((field, None))
            }
            2 => {
                let len = usize::try_from(self.read_varint()?).ok()?;
                let start = self.pos;
                self.skip(len)?;
                Some((field, Some(&self.data[start..self.pos])))
            }
            5 => {
                self.skip(4)?;
                Some((field, None))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(mut value: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    fn bytes_field(field: u64, data: &[u8], out: &mut Vec<u8>) {
        varint(field << 3 | 2, out);
        varint(data.len() as u64, out);
        out.extend_from_slice(data);
    }

    #[test]
    fn test_id_from_empty_key() {
        // SHA-256("") starts with e3b0c44298fc1c149afbf4c8996fb924
        assert_eq!(
            extension_id_from_public_key(b"").as_str(),
            "odlameecjipmbmbejkplpemijjgpljce"
        );
    }

    #[test]
    fn test_id_alphabet() {
        let id = extension_id_from_public_key(b"some public key");
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| ('a'..='p').contains(&c)));
    }

    #[test]
    fn test_crx3_signed_crx_id() {
        let crx_id: Vec<u8> = (0u8..16).collect();
        let mut signed = Vec::new();
        bytes_field(FIELD_CRX_ID, &crx_id, &mut signed);

        let mut header = Vec::new();
        // An unrelated varint field must be skipped.
        varint(5 << 3, &mut header);
        varint(300, &mut header);
        bytes_field(FIELD_SIGNED_HEADER_DATA, &signed, &mut header);

        let id = extension_id_from_crx3_header(&header).unwrap();
        assert_eq!(id.as_str(), "aaabacadaeafagahaiajakalamanaoap");
    }

    #[test]
    fn test_crx3_falls_back_to_public_key() {
        let mut proof = Vec::new();
        bytes_field(FIELD_PUBLIC_KEY, b"key-bytes", &mut proof);
        bytes_field(2, b"signature", &mut proof);

        let mut header = Vec::new();
        bytes_field(FIELD_SHA256_WITH_RSA, &proof, &mut header);

        assert_eq!(
            extension_id_from_crx3_header(&header),
            Some(extension_id_from_public_key(b"key-bytes"))
        );
    }

    #[test]
    fn test_crx3_truncated_header() {
        let mut header = Vec::new();
        varint(FIELD_SIGNED_HEADER_DATA << 3 | 2, &mut header);
        varint(1000, &mut header);
        header.extend_from_slice(b"short");
        assert_eq!(extension_id_from_crx3_header(&header), None);
        assert_eq!(extension_id_from_crx3_header(&[0xff; 12]), None);
    }

    #[test]
    fn test_manifest_key() {
        let key = STANDARD.encode(b"key-bytes");
        assert_eq!(
            extension_id_from_manifest_key(&key),
            Some(extension_id_from_public_key(b"key-bytes"))
        );
        assert_eq!(extension_id_from_manifest_key("!!not base64!!"), None);
    }
}
