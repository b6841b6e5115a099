use serde::Serialize;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;
use zip::ZipArchive;

use crate::config::DEFAULT_MAX_ENTRY_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Failed to read ZIP archive: {0}")]
    InvalidArchive(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Failed to read entry {path}: {reason}")]
    ReadError { path: String, reason: String },

    #[error("Entry {path} is {size} bytes, limit is {limit}")]
    TooLarge { path: String, size: u64, limit: u64 },
}

/// One file or directory record of the embedded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub last_modified: Option<String>,
    /// Path contains a `..` segment.
    pub escapes_root: bool,
    #[serde(skip)]
    pub(crate) index: usize,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        let path = normalize_entry_path(&path.into());
        Self {
            escapes_root: escapes_root(&path),
            path,
            is_directory: false,
            uncompressed_size: size,
            compressed_size: size,
            last_modified: None,
            index: 0,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        let path = normalize_entry_path(&path.into());
        Self {
            escapes_root: escapes_root(&path),
            path,
            is_directory: true,
            uncompressed_size: 0,
            compressed_size: 0,
            last_modified: None,
            index: 0,
        }
    }
}

/// Read access to the files of an unpacked extension.
///
/// Implementations are read-only after construction, so one reader can be
/// shared across threads and `read_entry` may run concurrently.
pub trait ArchiveReader: Send + Sync {
    /// All entries in archive order.
    fn entries(&self) -> &[ArchiveEntry];

    /// Load and decompress one entry.
    fn read_entry(&self, path: &str) -> Result<Vec<u8>, ExtractionError>;

    fn list_entries(&self) -> std::slice::Iter<'_, ArchiveEntry> {
        self.entries().iter()
    }

    fn file_paths(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.path.clone())
            .collect()
    }
}

/// Package bytes shared between clones of the archive index.
#[derive(Debug, Clone)]
struct SharedPayload {
    data: Arc<[u8]>,
    start: usize,
}

impl AsRef<[u8]> for SharedPayload {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.start..]
    }
}

/// `ArchiveReader` over a ZIP payload.
///
/// Opening reads only the central directory; entries are decompressed when
/// requested.
#[derive(Debug, Clone)]
pub struct ZipArchiveReader {
    archive: ZipArchive<Cursor<SharedPayload>>,
    entries: Vec<ArchiveEntry>,
    by_path: HashMap<String, usize>,
    max_entry_size: u64,
}

impl ZipArchiveReader {
    pub fn open(payload: impl Into<Arc<[u8]>>) -> Result<Self, ExtractionError> {
        Self::open_at(payload.into(), 0)
    }

    /// Open the archive that starts `offset` bytes into `data`.
    pub fn open_at(data: Arc<[u8]>, offset: usize) -> Result<Self, ExtractionError> {
        if offset > data.len() {
            return Err(ExtractionError::InvalidArchive(format!(
                "payload offset {offset} is past end of buffer ({} bytes)",
                data.len()
            )));
        }

        let cursor = Cursor::new(SharedPayload { data, start: offset });
        let mut archive =
            ZipArchive::new(cursor).map_err(|e| ExtractionError::InvalidArchive(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut by_path = HashMap::with_capacity(archive.len());

        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| ExtractionError::InvalidArchive(e.to_string()))?;

            let path = normalize_entry_path(file.name());
            if path.is_empty() {
                tracing::warn!(index, name = file.name(), "Skipping archive entry with empty path");
                continue;
            }

            let modified: Option<zip::DateTime> = file.last_modified().into();
            let entry = ArchiveEntry {
                escapes_root: escapes_root(&path),
                path,
                is_directory: file.is_dir(),
                uncompressed_size: file.size(),
                compressed_size: file.compressed_size(),
                last_modified: modified.map(format_zip_time),
                index,
            };

            if entry.escapes_root {
                tracing::warn!(path = %entry.path, "Archive entry path escapes the archive root");
            }

            by_path.insert(entry.path.clone(), entries.len());
            entries.push(entry);
        }

        tracing::debug!(entries = entries.len(), "Opened ZIP archive");

        Ok(Self {
            archive,
            entries,
            by_path,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        })
    }

    pub fn with_max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = limit;
        self
    }

    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.by_path
            .get(&normalize_entry_path(path))
            .map(|&i| &self.entries[i])
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>, ExtractionError> {
        let entry = self
            .entry(path)
            .ok_or_else(|| ExtractionError::NotFound(path.to_string()))?;

        if entry.is_directory {
            return Err(ExtractionError::ReadError {
                path: path.to_string(),
                reason: "entry is a directory".to_string(),
            });
        }

        let limit = self.max_entry_size;
        if entry.uncompressed_size > limit {
            return Err(ExtractionError::TooLarge {
                path: path.to_string(),
                size: entry.uncompressed_size,
                limit,
            });
        }

        // The clone shares the parsed central directory and the package bytes.
        let mut archive = self.archive.clone();
        let file = archive
            .by_index(entry.index)
            .map_err(|e| ExtractionError::ReadError {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        // Declared sizes come from the archive and may lie.
        let mut content = Vec::with_capacity(entry.uncompressed_size as usize);
        file.take(limit.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(|e| ExtractionError::ReadError {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        if content.len() as u64 > limit {
            return Err(ExtractionError::TooLarge {
                path: path.to_string(),
                size: content.len() as u64,
                limit,
            });
        }

        Ok(content)
    }
}

/// `ArchiveReader` over files held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    contents: HashMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let mut entry = ArchiveEntry::file(path, content.len() as u64);
        entry.index = self.entries.len();
        self.contents.insert(entry.path.clone(), content);
        self.entries.push(entry);
        self
    }

    pub fn with_directory(mut self, path: &str) -> Self {
        let mut entry = ArchiveEntry::directory(path);
        entry.index = self.entries.len();
        self.entries.push(entry);
        self
    }
}

impl ArchiveReader for MemoryArchive {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&self, path: &str) -> Result<Vec<u8>, ExtractionError> {
        self.contents
            .get(&normalize_entry_path(path))
            .cloned()
            .ok_or_else(|| ExtractionError::NotFound(path.to_string()))
    }
}

/// Posix separators, no empty segments, no leading or trailing slash.
///
/// Matches the segmentation of the file tree, so every tree path is a
/// valid `read_entry` key.
pub fn normalize_entry_path(name: &str) -> String {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn escapes_root(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}

fn format_zip_time(time: zip::DateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}
