//! Document records for the managed index and the manifest they are imported from.
//!
//! A record's id is derived from the file's base name only, so re-ingesting the
//! same file name updates the same index entry. Within one batch, ids that
//! sanitize to the same value are made unique with a short hash of the file's
//! path relative to the input directory.

use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Longest document id the index accepts.
pub const MAX_DOCUMENT_ID_LEN: usize = 63;
pub const RAW_PREFIX: &str = "raw";
pub const MANIFEST_OBJECT: &str = "metadata/metadata.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
    Markdown,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 3] = [
        DocumentFormat::Pdf,
        DocumentFormat::PlainText,
        DocumentFormat::Markdown,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::PlainText => "txt",
            DocumentFormat::Markdown => "md",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::PlainText => "text/plain",
            DocumentFormat::Markdown => "text/markdown",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(extension))
    }

    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| IngestError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructData {
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub uri: String,
}

/// One manifest entry: `{"id", "structData": {"source_file"}, "content": {"mimeType", "uri"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(rename = "structData")]
    pub struct_data: StructData,
    pub content: ContentRef,
}

impl DocumentRecord {
    pub fn source_file(&self) -> &str {
        &self.struct_data.source_file
    }

    pub fn mime_type(&self) -> &str {
        &self.content.mime_type
    }

    pub fn content_locator(&self) -> &str {
        &self.content.uri
    }

    pub fn to_manifest_line(&self) -> Result<String, IngestError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_manifest_line(line: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// Newline-delimited JSON, one record per line, trailing newline included.
pub fn render_manifest(records: &[DocumentRecord]) -> Result<String, IngestError> {
    let mut manifest = String::new();
    for record in records {
        manifest.push_str(&record.to_manifest_line()?);
        manifest.push('\n');
    }
    Ok(manifest)
}

pub fn parse_manifest(manifest: &str) -> Result<Vec<DocumentRecord>, IngestError> {
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(DocumentRecord::from_manifest_line)
        .collect()
}

/// A file found by discovery, with its path relative to the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative: PathBuf,
}

impl SourceFile {
    pub fn file_name(&self) -> Result<&str, IngestError> {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(self.path.display().to_string()))
    }

    /// Relative path with `/` separators, as used in object names.
    pub fn relative_key(&self) -> String {
        self.relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Object naming in the durable storage bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub bucket: String,
}

impl StorageLayout {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    pub fn raw_object(&self, source: &SourceFile) -> String {
        format!("{RAW_PREFIX}/{}", source.relative_key())
    }

    pub fn manifest_object(&self) -> &'static str {
        MANIFEST_OBJECT
    }

    pub fn uri(&self, object: &str) -> String {
        format!("gs://{}/{}", self.bucket, object)
    }
}

pub struct MetadataBuilder {
    layout: StorageLayout,
    disallowed: Regex,
    repeated: Regex,
    max_id_len: usize,
}

impl MetadataBuilder {
    pub fn new(layout: StorageLayout) -> Result<Self, IngestError> {
        Ok(Self {
            layout,
            disallowed: Regex::new(r"[^A-Za-z0-9_-]+")?,
            repeated: Regex::new(r"([_-])[_-]+")?,
            max_id_len: MAX_DOCUMENT_ID_LEN,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Base name without extension, restricted to letters, digits, `-` and `_`.
    pub fn sanitize_id(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name);

        let replaced = self.disallowed.replace_all(stem, "_");
        let collapsed = self.repeated.replace_all(&replaced, "$1");
        let trimmed = collapsed.trim_matches(|c: char| c == '_' || c == '-');

        let mut id: String = trimmed.chars().take(self.max_id_len).collect();
        while id.ends_with(|c: char| c == '_' || c == '-') {
            id.pop();
        }
        if id.is_empty() {
            id.push_str("document");
        }
        id
    }

    pub fn build(&self, source: &SourceFile) -> Result<DocumentRecord, IngestError> {
        let file_name = source.file_name()?;
        let format = DocumentFormat::from_path(&source.path)?;

        Ok(DocumentRecord {
            id: self.sanitize_id(file_name),
            struct_data: StructData {
                source_file: file_name.to_string(),
            },
            content: ContentRef {
                mime_type: format.mime_type().to_string(),
                uri: self.layout.uri(&self.layout.raw_object(source)),
            },
        })
    }
}

/// Tracks ids handed out within one ingestion batch.
#[derive(Debug, Default)]
pub struct BatchIds {
    seen: HashSet<String>,
}

impl BatchIds {
    /// Returns `id` unchanged the first time; later claims get a path-hash suffix.
    pub fn claim(&mut self, id: &str, source: &SourceFile) -> String {
        if self.seen.insert(id.to_string()) {
            return id.to_string();
        }

        let digest = format!("{:x}", Sha256::digest(source.relative_key().as_bytes()));
        let suffix = &digest[..8];
        let keep = MAX_DOCUMENT_ID_LEN - suffix.len() - 1;
        let base: String = id.chars().take(keep).collect();

        let mut candidate = format!("{base}-{suffix}");
        let mut attempt = 1;
        while !self.seen.insert(candidate.clone()) {
            attempt += 1;
            candidate = format!("{base}-{suffix}{attempt}");
        }
        candidate
    }
}
