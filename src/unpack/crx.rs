use serde::Serialize;
use std::ops::Range;
use thiserror::Error;

// CRX2 format:
// - Magic: "Cr24" (4 bytes)
// - Version: 2 (4 bytes, little-endian)
// - Public key length (4 bytes, little-endian)
// - Signature length (4 bytes, little-endian)
// - Public key, signature
// - ZIP data
//
// CRX3 format:
// - Magic: "Cr24" (4 bytes)
// - Version: 3 (4 bytes, little-endian)
// - Header length (4 bytes, little-endian)
// - Header (protobuf, variable length)
// - ZIP data

pub const CRX_MAGIC: &[u8; 4] = b"Cr24";
pub const ZIP_MAGIC: [u8; 2] = [0x50, 0x4B];

const MIN_HEADER_LEN: usize = 16;
const CRX2_PREFIX_LEN: usize = 16;
const CRX3_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("CRX file too small: {len} bytes, need at least {MIN_HEADER_LEN}")]
    TooShort { len: usize },

    #[error("Invalid CRX magic: expected \"Cr24\" in the first 4 bytes")]
    BadMagic,

    #[error("Unsupported CRX version {0}: only versions 2 and 3 exist")]
    UnsupportedVersion(u32),

    #[error("Corrupt CRX header: {0}")]
    CorruptHeader(String),

    #[error("Invalid CRX payload: no ZIP signature at offset {offset}")]
    InvalidPayload { offset: usize },
}

/// Result of parsing the fixed part of a CRX header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedHeader {
    pub format_version: u32,
    pub archive_payload_offset: usize,
    /// CRX2 only: location of the DER public key.
    #[serde(skip)]
    pub public_key: Option<Range<usize>>,
    /// CRX2 only: location of the signature.
    #[serde(skip)]
    pub signature: Option<Range<usize>>,
    /// CRX3 only: location of the protobuf `CrxFileHeader`.
    #[serde(skip)]
    pub signed_header: Option<Range<usize>>,
}

impl ParsedHeader {
    /// The embedded archive, or `None` if `data` is not the buffer this
    /// header was parsed from.
    pub fn payload<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.archive_payload_offset..)
    }
}

/// Parse a CRX2 or CRX3 header and locate the embedded ZIP archive.
///
/// Every length field is bounds-checked before use: the input may be an
/// upload or a download from a third party.
pub fn parse_header(data: &[u8]) -> Result<ParsedHeader, HeaderError> {
    if data.len() < MIN_HEADER_LEN {
        return Err(HeaderError::TooShort { len: data.len() });
    }

    if !data.starts_with(CRX_MAGIC) {
        return Err(HeaderError::BadMagic);
    }

    let version = read_u32_le(data, 4);
    let header = match version {
        2 => parse_crx2(data)?,
        3 => parse_crx3(data)?,
        other => return Err(HeaderError::UnsupportedVersion(other)),
    };

    let offset = header.archive_payload_offset;
    match data.get(offset..offset.saturating_add(2)) {
        Some(magic) if magic == ZIP_MAGIC => Ok(header),
        _ => Err(HeaderError::InvalidPayload { offset }),
    }
}

fn parse_crx2(data: &[u8]) -> Result<ParsedHeader, HeaderError> {
    let key_len = read_u32_le(data, 8) as usize;
    let sig_len = read_u32_le(data, 12) as usize;

    if key_len == 0 {
        return Err(HeaderError::CorruptHeader(
            "public key length must be greater than zero".to_string(),
        ));
    }
    if sig_len == 0 {
        return Err(HeaderError::CorruptHeader(
            "signature length must be greater than zero".to_string(),
        ));
    }

    let key_end = CRX2_PREFIX_LEN.checked_add(key_len);
    let offset = key_end.and_then(|end| end.checked_add(sig_len)).ok_or_else(|| {
        HeaderError::CorruptHeader("public key and signature lengths overflow".to_string())
    })?;

    if offset > data.len() {
        return Err(HeaderError::CorruptHeader(format!(
            "public key ({key_len} bytes) and signature ({sig_len} bytes) extend past end of file ({} bytes)",
            data.len()
        )));
    }

    let key_end = CRX2_PREFIX_LEN + key_len;
    Ok(ParsedHeader {
        format_version: 2,
        archive_payload_offset: offset,
        public_key: Some(CRX2_PREFIX_LEN..key_end),
        signature: Some(key_end..offset),
        signed_header: None,
    })
}

fn parse_crx3(data: &[u8]) -> Result<ParsedHeader, HeaderError> {
    let header_len = read_u32_le(data, 8) as usize;

    if header_len == 0 {
        return Err(HeaderError::CorruptHeader(
            "header length must be greater than zero".to_string(),
        ));
    }

    let offset = CRX3_PREFIX_LEN
        .checked_add(header_len)
        .ok_or_else(|| HeaderError::CorruptHeader("header length overflows".to_string()))?;

    if offset > data.len() {
        return Err(HeaderError::CorruptHeader(format!(
            "header length {header_len} extends past end of file ({} bytes)",
            data.len()
        )));
    }

    Ok(ParsedHeader {
        format_version: 3,
        archive_payload_offset: offset,
        public_key: None,
        signature: None,
        signed_header: Some(CRX3_PREFIX_LEN..offset),
    })
}

/// Caller guarantees `offset + 4 <= data.len()`.
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}
