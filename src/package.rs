//! One analysis session over one package.
//!
//! Raw bytes are parsed once; the archive reader, manifest and file tree are
//! cached and shared read-only by every filter and search call.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::analyze::manifest::{ManifestError, resolve_manifest};
use crate::config::Limits;
use crate::filter::{FilterError, FilterQuery, filter_tree};
use crate::models::Manifest;
use crate::search::{SearchEngine, SearchError, SearchOutcome, SearchProgress, SearchQuery, SearchSession};
use crate::tree::FileTree;
use crate::unpack::{
    ArchiveReader, ExtensionId, ExtractionError, HeaderError, PackageFormat, ParsedHeader,
    ZipArchiveReader, derive_extension_id, detect_format, parse_header,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    #[error("Package is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unknown package format: not a CRX or ZIP file")]
    UnknownFormat,

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Archive(#[from] ExtractionError),
}

pub struct ExtensionPackage {
    format: PackageFormat,
    header: Option<ParsedHeader>,
    reader: Arc<ZipArchiveReader>,
    manifest: Result<Manifest, ManifestError>,
    tree: FileTree,
    extension_id: Option<ExtensionId>,
    limits: Limits,
}

impl ExtensionPackage {
    pub fn from_bytes(data: impl Into<Arc<[u8]>>, limits: &Limits) -> Result<Self, PackageError> {
        let data: Arc<[u8]> = data.into();
        if data.len() > limits.max_package_size {
            return Err(PackageError::TooLarge {
                size: data.len(),
                limit: limits.max_package_size,
            });
        }

        let format = detect_format(&data);
        let header = match format {
            PackageFormat::Crx2 | PackageFormat::Crx3 => Some(parse_header(&data)?),
            PackageFormat::Zip => None,
            // Let the header parser name what is wrong with a CRX-looking buffer.
            PackageFormat::Unknown if data.starts_with(crate::unpack::crx::CRX_MAGIC) => {
                Some(parse_header(&data)?)
            }
            PackageFormat::Unknown => return Err(PackageError::UnknownFormat),
        };
        tracing::debug!(?format, size = data.len(), "Detected package format");

        let offset = header.as_ref().map_or(0, |h| h.archive_payload_offset);
        let reader = ZipArchiveReader::open_at(Arc::clone(&data), offset)?
            .with_max_entry_size(limits.max_entry_size);

        let manifest = resolve_manifest(&reader);
        if let Err(e) = &manifest {
            tracing::warn!(error = %e, "Manifest unavailable");
        }

        let tree = FileTree::build(reader.entries());
        let manifest_key = manifest.as_ref().ok().and_then(|m| m.key());
        let extension_id = derive_extension_id(&data, header.as_ref(), manifest_key);

        tracing::debug!(
            entries = reader.entries().len(),
            files = tree.file_count(),
            id = ?extension_id,
            "Loaded package"
        );

        Ok(Self {
            format,
            header,
            reader: Arc::new(reader),
            manifest,
            tree,
            extension_id,
            limits: limits.clone(),
        })
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    pub fn header(&self) -> Option<&ParsedHeader> {
        self.header.as_ref()
    }

    pub fn manifest(&self) -> Result<&Manifest, &ManifestError> {
        self.manifest.as_ref()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn extension_id(&self) -> Option<&ExtensionId> {
        self.extension_id.as_ref()
    }

    pub fn reader(&self) -> Arc<dyn ArchiveReader> {
        self.reader.clone()
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, ExtractionError> {
        self.reader.read_entry(path)
    }

    pub fn filter(&self, query: &FilterQuery) -> Result<FileTree, FilterError> {
        filter_tree(&self.tree, query)
    }

    /// File paths in tree display order.
    pub fn file_paths(&self) -> Vec<String> {
        self.tree.files().map(|n| n.path.clone()).collect()
    }

    /// Search every file on the calling thread.
    pub fn search<F>(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<SearchOutcome, SearchError>
    where
        F: FnMut(&SearchProgress),
    {
        let engine =
            SearchEngine::new(query)?.with_binary_sample_len(self.limits.binary_sample_len);
        Ok(engine.search(self.reader.as_ref(), &self.file_paths(), cancel, on_progress))
    }

    /// Background search session over every file of the package.
    pub fn search_session(&self) -> SearchSession {
        SearchSession::new(self.reader(), self.file_paths())
            .with_binary_sample_len(self.limits.binary_sample_len)
    }
}
