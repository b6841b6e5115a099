pub mod manifest;

pub use manifest::{MANIFEST_PATH, ManifestError, parse_manifest, resolve_manifest};
