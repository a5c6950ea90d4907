use crate::chunking::{chunk_text, ChunkingConfig};
use crate::config::{PollPolicy, RagConfig};
use crate::error::IngestError;
use crate::extractor::{parse_document, ParsedText};
use crate::metadata::{
    render_manifest, BatchIds, DocumentFormat, DocumentRecord, MetadataBuilder, SourceFile,
    StorageLayout,
};
use crate::models::{Chunk, ImportReport};
use crate::retrieval::SearchClient;
use crate::traits::{IndexService, ObjectStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub const LOCAL_MANIFEST: &str = "metadata.jsonl";
pub const PROCESSED_DATA: &str = "processed_data.json";
const MANIFEST_MIME: &str = "application/x-ndjson";

/// Supported documents under `folder`, sorted by path. Only the top level unless `recursive`.
pub fn discover_documents(folder: &Path, recursive: bool) -> Vec<SourceFile> {
    let mut walker = WalkDir::new(folder).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<SourceFile> = walker
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| DocumentFormat::from_path(entry.path()).is_ok())
        .map(|entry| {
            let path = entry.path().to_path_buf();
            let relative = path
                .strip_prefix(folder)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
            SourceFile { path, relative }
        })
        .collect();

    files.sort_unstable_by(|left, right| left.path.cmp(&right.path));
    files
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    Completed(ImportReport),
    Failed { reason: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub staged: Vec<DocumentRecord>,
    pub failures: Vec<FileFailure>,
    pub manifest_uri: Option<String>,
    pub import: ImportOutcome,
    pub processed_data: Option<PathBuf>,
    pub processed_data_error: Option<String>,
}

impl IngestionReport {
    /// True when the index import reached a terminal success state.
    pub fn succeeded(&self) -> bool {
        matches!(self.import, ImportOutcome::Completed(_))
    }

    pub fn to_json(&self) -> Result<String, IngestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct Staged {
    source: SourceFile,
    record: DocumentRecord,
    parsed: ParsedText,
}

#[derive(Serialize)]
struct ProcessedText<'a> {
    source_file: &'a str,
    text_content: &'a str,
}

#[derive(Serialize)]
struct ProcessedRecord<'a> {
    id: &'a str,
    #[serde(rename = "structData")]
    struct_data: ProcessedText<'a>,
    pages: usize,
    chunks: Vec<Chunk>,
}

pub struct IngestionPipeline<S, I> {
    store: S,
    client: SearchClient<I>,
    builder: MetadataBuilder,
    chunking: ChunkingConfig,
    poll: PollPolicy,
    concurrency: usize,
    recursive: bool,
}

impl<S, I> IngestionPipeline<S, I>
where
    S: ObjectStore,
    I: IndexService,
{
    pub fn new(store: S, client: SearchClient<I>, config: &RagConfig) -> Result<Self, IngestError> {
        Ok(Self {
            store,
            client,
            builder: MetadataBuilder::new(StorageLayout::new(config.bucket.clone()))?,
            chunking: config.chunking,
            poll: config.import_poll,
            concurrency: config.upload_concurrency.max(1),
            recursive: config.recursive,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &SearchClient<I> {
        &self.client
    }

    /// Stages every supported file, uploads the manifest and imports it.
    ///
    /// Per-file problems are collected in the report. Only an unusable input
    /// directory is an error; import failures are reported, not raised, and
    /// nothing already uploaded is rolled back.
    pub async fn ingest(
        &self,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<IngestionReport, IngestError> {
        if !input_dir.is_dir() {
            return Err(IngestError::InvalidArgument(format!(
                "input directory {} does not exist",
                input_dir.display()
            )));
        }

        let started_at = Utc::now();
        let files = discover_documents(input_dir, self.recursive);
        let discovered = files.len();
        info!(input_dir = %input_dir.display(), discovered, "documents discovered");

        let mut report = IngestionReport {
            started_at,
            finished_at: started_at,
            discovered,
            staged: Vec::new(),
            failures: Vec::new(),
            manifest_uri: None,
            import: ImportOutcome::Skipped,
            processed_data: None,
            processed_data_error: None,
        };

        if files.is_empty() {
            warn!(input_dir = %input_dir.display(), "no supported documents found; nothing to ingest");
            report.finished_at = Utc::now();
            return Ok(report);
        }

        let results: Vec<_> = stream::iter(files)
            .map(|source| self.stage(source))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut ids = BatchIds::default();
        let mut staged = Vec::new();
        for result in results {
            match result {
                Ok(mut item) => {
                    item.record.id = ids.claim(&item.record.id, &item.source);
                    staged.push(item);
                }
                Err(failure) => {
                    warn!(path = %failure.path.display(), reason = %failure.reason, "document skipped");
                    report.failures.push(failure);
                }
            }
        }
        report.staged = staged.iter().map(|item| item.record.clone()).collect();

        info!(
            staged = report.staged.len(),
            failed = report.failures.len(),
            "staging finished"
        );

        match self.write_processed_data(output_dir, &staged).await {
            Ok(path) => report.processed_data = Some(path),
            Err(error) => {
                warn!(error = %error, "could not write processed data");
                report.processed_data_error = Some(error.to_string());
            }
        }

        if report.staged.is_empty() {
            warn!("every document failed to stage; skipping import");
            report.finished_at = Utc::now();
            return Ok(report);
        }

        report.import = match self.publish_manifest(&report.staged, output_dir).await {
            Ok(manifest_uri) => {
                report.manifest_uri = Some(manifest_uri.clone());
                match self.client.import_from_storage(&manifest_uri, &self.poll).await {
                    Ok(import) => ImportOutcome::Completed(import),
                    Err(error) => {
                        warn!(error = %error, "index import failed");
                        ImportOutcome::Failed {
                            reason: error.to_string(),
                        }
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, "manifest upload failed");
                ImportOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        };

        report.finished_at = Utc::now();
        Ok(report)
    }

    async fn stage(&self, source: SourceFile) -> Result<Staged, FileFailure> {
        let failure = |error: IngestError| FileFailure {
            path: source.path.clone(),
            reason: error.to_string(),
        };

        let record = self.builder.build(&source).map_err(failure)?;

        let path = source.path.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_document(&path))
            .await
            .map_err(|join_error| failure(IngestError::parse(&source.path, join_error)))?
            .map_err(failure)?;

        let bytes = tokio::fs::read(&source.path)
            .await
            .map_err(|error| failure(error.into()))?;
        let object = self.builder.layout().raw_object(&source);
        let uri = self
            .store
            .upload(&object, bytes, record.mime_type())
            .await
            .map_err(failure)?;
        info!(%object, %uri, "document uploaded");

        Ok(Staged {
            source,
            record,
            parsed,
        })
    }

    async fn publish_manifest(
        &self,
        records: &[DocumentRecord],
        output_dir: &Path,
    ) -> Result<String, IngestError> {
        let manifest = render_manifest(records)?;

        let local = output_dir.join(LOCAL_MANIFEST);
        if let Err(error) = write_local(&local, manifest.as_bytes()).await {
            warn!(path = %local.display(), error = %error, "could not keep a local manifest copy");
        }

        let object = self.builder.layout().manifest_object();
        let uri = self
            .store
            .upload(object, manifest.into_bytes(), MANIFEST_MIME)
            .await?;
        info!(%object, %uri, records = records.len(), "manifest uploaded");
        Ok(uri)
    }

    async fn write_processed_data(
        &self,
        output_dir: &Path,
        staged: &[Staged],
    ) -> Result<PathBuf, IngestError> {
        let mut lines = String::new();
        for item in staged {
            let record = ProcessedRecord {
                id: &item.record.id,
                struct_data: ProcessedText {
                    source_file: item.record.source_file(),
                    text_content: &item.parsed.text,
                },
                pages: item.parsed.pages.len(),
                chunks: chunk_text(&item.parsed.text, self.chunking),
            };
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
        }

        let path = output_dir.join(PROCESSED_DATA);
        write_local(&path, lines.as_bytes()).await?;
        info!(path = %path.display(), documents = staged.len(), "processed data written");
        Ok(path)
    }
}

async fn write_local(path: &Path, contents: &[u8]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
