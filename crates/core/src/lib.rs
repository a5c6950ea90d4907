pub mod agent;
pub mod backends;
pub mod chunking;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod retrieval;
pub mod traits;

pub use agent::{
    Answer, AnswerKind, ChatSession, ExtractiveAnswerer, GroundedAgent, GroundedPrompt, Turn,
    REFUSAL,
};
pub use backends::{
    default_token_source, AdcToken, DiscoveryEngineClient, GcsObjectStore, GeminiModel, StaticToken,
};
pub use chunking::{chunk_text, ChunkingConfig};
pub use config::{IndexTarget, Location, ModelConfig, PollPolicy, RagConfig, SearchOptions};
pub use error::{AnswerError, ConfigError, IngestError, SearchError};
pub use extractor::{parse_document, DocumentParser, LopdfExtractor, PageText, ParsedText, PlainTextParser};
pub use ingest::{discover_documents, FileFailure, ImportOutcome, IngestionPipeline, IngestionReport};
pub use metadata::{DocumentFormat, DocumentRecord, MetadataBuilder, SourceFile, StorageLayout};
pub use models::{Chunk, ConsolidatedContext, ImportReport, Retrieval, NO_RELEVANT_DOCUMENTS, RETRIEVAL_ERROR};
pub use retrieval::{consolidate, validate_data_store, SearchClient};
pub use traits::{AnswerModel, IndexService, ObjectStore, Retriever, TokenSource};
