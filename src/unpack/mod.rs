pub mod archive;
pub mod crx;
pub mod crx_id;

pub use archive::{ArchiveEntry, ArchiveReader, ExtractionError, MemoryArchive, ZipArchiveReader};
pub use crx::{HeaderError, ParsedHeader, parse_header};
pub use crx_id::{ExtensionId, derive_extension_id, extension_id_from_public_key};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageFormat {
    Crx2,
    Crx3,
    Zip, // unpacked extension zipped without a CRX header
    Unknown,
}

pub fn detect_format(data: &[u8]) -> PackageFormat {
    if data.len() < 4 {
        return PackageFormat::Unknown;
    }

    // CRX magic: "Cr24" followed by the little-endian version
    if data.starts_with(crx::CRX_MAGIC) {
        return match data.get(4..8) {
            Some([2, 0, 0, 0]) => PackageFormat::Crx2,
            Some([3, 0, 0, 0]) => PackageFormat::Crx3,
            _ => PackageFormat::Unknown,
        };
    }

    // ZIP magic: "PK\x03\x04", or "PK\x05\x06" for an empty archive
    if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
        return PackageFormat::Zip;
    }

    PackageFormat::Unknown
}
