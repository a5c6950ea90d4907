use crate::agent::GroundedPrompt;
use crate::config::IndexTarget;
use crate::error::{AnswerError, IngestError, SearchError};
use crate::models::{ImportStatus, ReconciliationMode, Retrieval, SearchHit, SearchRequest};
use async_trait::async_trait;

/// Durable object storage, write-only from the pipeline's side.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` under `object` and returns the object's URI.
    async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, IngestError>;
}

/// The managed search index.
#[async_trait]
pub trait IndexService: Send + Sync {
    fn target(&self) -> &IndexTarget;

    /// Ids of the data stores visible in the target's project and location.
    async fn data_store_ids(&self) -> Result<Vec<String>, SearchError>;

    async fn import_documents(
        &self,
        manifest_uri: &str,
        mode: ReconciliationMode,
    ) -> Result<ImportStatus, SearchError>;

    async fn import_status(&self, operation: &str) -> Result<ImportStatus, SearchError>;

    /// Ranked hits in backend order.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError>;
}

/// The single search tool the agent may call.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Retrieval;
}

#[async_trait]
pub trait AnswerModel: Send + Sync {
    fn name(&self) -> &str;

    async fn answer(&self, prompt: &GroundedPrompt<'_>) -> Result<String, AnswerError>;
}

/// OAuth bearer tokens for the REST backends.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, SearchError>;
}
