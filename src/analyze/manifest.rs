use crate::models::Manifest;
use crate::models::extension::string_array;
use crate::unpack::{ArchiveReader, ExtractionError};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MANIFEST_PATH: &str = "manifest.json";

const PERMISSION_FIELDS: [&str; 3] = ["permissions", "host_permissions", "optional_permissions"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("manifest.json not found")]
    NotFound,

    #[error("Failed to read manifest.json: {0}")]
    Read(String),

    #[error("manifest.json is not valid UTF-8 (at byte {valid_up_to})")]
    InvalidEncoding { valid_up_to: usize },

    #[error("manifest.json is not valid JSON at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("manifest.json must contain a JSON object")]
    NotAnObject,

    #[error("manifest.json is missing required string field \"{0}\"")]
    MissingField(&'static str),

    #[error("Unsupported manifest_version {0}: expected 2 or 3")]
    UnsupportedManifestVersion(String),
}

/// Load `manifest.json` from the archive root and parse it.
///
/// The lookup is exact and case-sensitive; `Manifest.json` or a manifest in a
/// subdirectory does not count.
pub fn resolve_manifest(reader: &dyn ArchiveReader) -> Result<Manifest, ManifestError> {
    let bytes = reader.read_entry(MANIFEST_PATH).map_err(|e| match e {
        ExtractionError::NotFound(_) => ManifestError::NotFound,
        other => ManifestError::Read(other.to_string()),
    })?;

    let text = std::str::from_utf8(&bytes).map_err(|e| ManifestError::InvalidEncoding {
        valid_up_to: e.valid_up_to(),
    })?;

    parse_manifest(text)
}

pub fn parse_manifest(json: &str) -> Result<Manifest, ManifestError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ManifestError::InvalidJson {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })?;

    let Value::Object(mut object) = value else {
        return Err(ManifestError::NotAnObject);
    };

    let manifest_version = match object.remove("manifest_version") {
        Some(Value::Number(n)) if n.as_u64() == Some(2) => 2,
        Some(Value::Number(n)) if n.as_u64() == Some(3) => 3,
        Some(other) => return Err(ManifestError::UnsupportedManifestVersion(other.to_string())),
        None => {
            return Err(ManifestError::UnsupportedManifestVersion(
                "missing".to_string(),
            ));
        }
    };

    let name = take_string(&mut object, "name")?;
    let version = take_string(&mut object, "version")?;
    let description = match object.remove("description") {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // Keep a malformed description visible instead of dropping it.
            object.insert("description".to_string(), other);
            None
        }
        None => None,
    };

    let permissions = collect_permissions(&object);

    Ok(Manifest {
        name,
        version,
        manifest_version,
        description,
        permissions,
        extra: object,
    })
}

fn take_string(object: &mut Map<String, Value>, field: &'static str) -> Result<String, ManifestError> {
    match object.remove(field) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ManifestError::MissingField(field)),
    }
}

/// Union of the permission-bearing arrays, first occurrence wins.
fn collect_permissions(object: &Map<String, Value>) -> Vec<String> {
    let mut permissions: Vec<String> = Vec::new();
    for field in PERMISSION_FIELDS {
        for permission in string_array(object.get(field)) {
            if !permissions.contains(&permission) {
                permissions.push(permission);
            }
        }
    }
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpack::MemoryArchive;

    #[test]
    fn test_permission_union() {
        let manifest = parse_manifest(
            r#"{"manifest_version":3,"name":"X","version":"1.0","permissions":["storage"],"host_permissions":["<all_urls>"]}"#,
        )
        .unwrap();
        assert_eq!(manifest.permissions, vec!["storage", "<all_urls>"]);
    }

    #[test]
    fn test_malformed_permission_fields_are_empty() {
        let manifest = parse_manifest(
            r#"{"manifest_version":2,"name":"X","version":"1","permissions":"tabs","optional_permissions":[1,"cookies",null]}"#,
        )
        .unwrap();
        assert_eq!(manifest.permissions, vec!["cookies"]);
    }

    #[test]
    fn test_invalid_json_position() {
        let err = parse_manifest("{\n  \"name\": \"X\",\n  oops\n}").unwrap_err();
        match err {
            ManifestError::InvalidJson { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_manifest_version_validation() {
        let missing = parse_manifest(r#"{"name":"X","version":"1"}"#).unwrap_err();
        assert!(matches!(missing, ManifestError::UnsupportedManifestVersion(_)));

        let wrong = parse_manifest(r#"{"manifest_version":4,"name":"X","version":"1"}"#).unwrap_err();
        assert_eq!(wrong, ManifestError::UnsupportedManifestVersion("4".to_string()));

        let string = parse_manifest(r#"{"manifest_version":"3","name":"X","version":"1"}"#).unwrap_err();
        assert!(matches!(string, ManifestError::UnsupportedManifestVersion(_)));
    }

    #[test]
    fn test_missing_name() {
        let err = parse_manifest(r#"{"manifest_version":3,"version":"1"}"#).unwrap_err();
        assert_eq!(err, ManifestError::MissingField("name"));
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(parse_manifest("[1, 2]").unwrap_err(), ManifestError::NotAnObject);
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let archive = MemoryArchive::new().with_file(
            "Manifest.json",
            r#"{"manifest_version":3,"name":"X","version":"1"}"#,
        );
        assert_eq!(resolve_manifest(&archive).unwrap_err(), ManifestError::NotFound);
    }

    #[test]
    fn test_resolve_rejects_invalid_utf8() {
        let archive = MemoryArchive::new().with_file("manifest.json", vec![b'{', 0xff, b'}']);
        assert_eq!(
            resolve_manifest(&archive).unwrap_err(),
            ManifestError::InvalidEncoding { valid_up_to: 1 }
        );
    }

    #[test]
    fn test_bom_is_not_stripped() {
        let mut bytes = vec![0xef, 0xbb, 0xbf];
        bytes.extend_from_slice(br#"{"manifest_version":3,"name":"X","version":"1"}"#);
        let archive = MemoryArchive::new().with_file("manifest.json", bytes);
        assert!(matches!(
            resolve_manifest(&archive).unwrap_err(),
            ManifestError::InvalidJson { .. }
        ));
    }
}
