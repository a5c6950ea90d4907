use crate::config::{PollPolicy, SearchOptions};
use crate::error::{ConfigError, IngestError};
use crate::models::{
    ConsolidatedContext, ContextSnippet, ContextTier, ImportReport, ReconciliationMode, Retrieval,
    SearchHit, SearchRequest,
};
use crate::traits::{IndexService, Retriever};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, info, warn};

/// Fails unless the target data store exists in the target location.
pub async fn validate_data_store<I: IndexService>(index: &I) -> Result<(), ConfigError> {
    let target = index.target();
    info!(
        data_store = %target.data_store_id,
        project = %target.project_id,
        location = %target.location,
        "validating data store"
    );

    let ids = index.data_store_ids().await?;
    if ids.iter().any(|id| id == &target.data_store_id) {
        Ok(())
    } else {
        Err(ConfigError::DataStoreNotFound {
            data_store_id: target.data_store_id.clone(),
            location: target.location.to_string(),
        })
    }
}

/// Name a hit is cited by: its source file, else its document id.
fn provenance(hit: &SearchHit) -> Option<&str> {
    hit.source_file
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| Some(hit.document_id.as_str()).filter(|id| !id.trim().is_empty()))
}

/// Picks the first non-empty tier across the whole result set; tiers are never mixed.
///
/// Blank fragments are dropped, the rest are kept verbatim. Hits that cannot
/// be attributed to any document contribute nothing.
pub fn consolidate(hits: &[SearchHit]) -> Option<ConsolidatedContext> {
    ContextTier::PRIORITY.into_iter().find_map(|tier| {
        let snippets: Vec<ContextSnippet> = hits
            .iter()
            .filter_map(|hit| provenance(hit).map(|source| (hit, source)))
            .flat_map(|(hit, source)| {
                tier.fragments(hit)
                    .iter()
                    .filter(|fragment| !fragment.content.trim().is_empty())
                    .map(move |fragment| ContextSnippet {
                        content: fragment.content.clone(),
                        source_file: source.to_string(),
                        page: fragment.page,
                    })
            })
            .collect();

        if snippets.is_empty() {
            None
        } else {
            Some(ConsolidatedContext { tier, snippets })
        }
    })
}

pub struct SearchClient<I> {
    index: I,
    options: SearchOptions,
}

impl<I> SearchClient<I>
where
    I: IndexService,
{
    pub fn new(index: I, options: SearchOptions) -> Self {
        Self { index, options }
    }

    /// Builds the client only after the data store is confirmed in its location.
    pub async fn connect(index: I, options: SearchOptions) -> Result<Self, ConfigError> {
        validate_data_store(&index).await?;
        Ok(Self::new(index, options))
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    fn request(&self, query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            page_size: self.options.page_size,
            max_extractive_segments: self.options.max_extractive_segments,
            max_extractive_answers: self.options.max_extractive_answers,
            return_snippets: true,
        }
    }

    /// One request, no retries. Backend failures become [`Retrieval::Failed`].
    pub async fn search(&self, query: &str) -> Retrieval {
        if query.trim().is_empty() {
            warn!("refusing to search with an empty query");
            return Retrieval::Failed("query is empty".to_string());
        }

        let hits = match self.index.search(&self.request(query)).await {
            Ok(hits) => hits,
            Err(search_error) => {
                error!(query, error = %search_error, "search request failed");
                return Retrieval::Failed(search_error.to_string());
            }
        };

        match consolidate(&hits) {
            Some(context) => {
                info!(
                    query,
                    results = hits.len(),
                    snippets = context.snippets.len(),
                    tier = ?context.tier,
                    "search returned context"
                );
                Retrieval::Found(context)
            }
            None => {
                info!(query, results = hits.len(), "search returned no usable context");
                Retrieval::Empty
            }
        }
    }

    /// String form of [`search`](Self::search), with the sentinel strings.
    pub async fn search_context(&self, query: &str) -> String {
        self.search(query).await.as_tool_output()
    }

    /// Triggers an incremental import of `manifest_uri` and waits for it to finish.
    pub async fn import_from_storage(
        &self,
        manifest_uri: &str,
        policy: &PollPolicy,
    ) -> Result<ImportReport, IngestError> {
        let mode = ReconciliationMode::Incremental;
        let mut status = self
            .index
            .import_documents(manifest_uri, mode)
            .await
            .map_err(|error| IngestError::Import(format!("could not start import: {error}")))?;
        let operation = status.operation.clone();
        info!(%operation, manifest_uri, "import started");

        let started = Instant::now();
        let mut attempt = 0u32;
        while !status.done {
            if attempt >= policy.max_attempts || started.elapsed() >= policy.budget {
                return Err(IngestError::Import(format!(
                    "{operation} did not finish after {attempt} polls ({:?})",
                    started.elapsed()
                )));
            }

            tokio::time::sleep(policy.delay_for(attempt)).await;
            attempt += 1;

            match self.index.import_status(&operation).await {
                Ok(next) => status = next,
                Err(poll_error) => {
                    warn!(%operation, attempt, error = %poll_error, "import poll failed");
                }
            }
        }

        if let Some(reason) = status.error {
            return Err(IngestError::Import(format!("{operation} failed: {reason}")));
        }

        info!(
            %operation,
            success_count = status.success_count,
            failure_count = status.failure_count,
            "import finished"
        );
        for sample in &status.error_samples {
            warn!(%operation, sample = %sample, "import error sample");
        }

        Ok(ImportReport {
            operation,
            manifest_uri: manifest_uri.to_string(),
            mode,
            success_count: status.success_count,
            failure_count: status.failure_count,
            error_samples: status.error_samples,
        })
    }
}

#[async_trait]
impl<I> Retriever for SearchClient<I>
where
    I: IndexService,
{
    async fn retrieve(&self, query: &str) -> Retrieval {
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexTarget, Location};
    use crate::models::{Fragment, ImportStatus, NO_RELEVANT_DOCUMENTS, RETRIEVAL_ERROR};
    use crate::SearchError;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeIndex {
        target: IndexTarget,
        hits: Result<Vec<SearchHit>, String>,
        data_stores: Vec<String>,
        statuses: Mutex<Vec<Result<ImportStatus, String>>>,
        requests: Mutex<Vec<SearchRequest>>,
        imports: Mutex<Vec<(String, ReconciliationMode)>>,
    }

    impl FakeIndex {
        fn with_hits(hits: Vec<SearchHit>) -> Self {
            Self {
                target: IndexTarget::new("demo", Location::Us, "records"),
                hits: Ok(hits),
                data_stores: vec!["records".to_string()],
                statuses: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                imports: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                hits: Err("503 unavailable".to_string()),
                ..Self::with_hits(Vec::new())
            }
        }

        fn with_statuses(statuses: Vec<Result<ImportStatus, String>>) -> Self {
            let index = Self::with_hits(Vec::new());
            *index.statuses.lock().expect("lock") = statuses;
            index
        }

        fn next_status(&self) -> Result<ImportStatus, SearchError> {
            let mut statuses = self.statuses.lock().expect("lock");
            if statuses.is_empty() {
                return Err(SearchError::Request("no scripted status".to_string()));
            }
            statuses.remove(0).map_err(SearchError::Request)
        }
    }

    #[async_trait]
    impl IndexService for FakeIndex {
        fn target(&self) -> &IndexTarget {
            &self.target
        }

        async fn data_store_ids(&self) -> Result<Vec<String>, SearchError> {
            Ok(self.data_stores.clone())
        }

        async fn import_documents(
            &self,
            manifest_uri: &str,
            mode: ReconciliationMode,
        ) -> Result<ImportStatus, SearchError> {
            self.imports
                .lock()
                .expect("lock")
                .push((manifest_uri.to_string(), mode));
            self.next_status()
        }

        async fn import_status(&self, _operation: &str) -> Result<ImportStatus, SearchError> {
            self.next_status()
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
            self.requests.lock().expect("lock").push(request.clone());
            self.hits.clone().map_err(SearchError::Request)
        }
    }

    fn hit(source: &str) -> SearchHit {
        SearchHit {
            document_id: source.trim_end_matches(".pdf").to_string(),
            source_file: Some(source.to_string()),
            ..SearchHit::default()
        }
    }

    fn quick_poll() -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2,
            max_attempts: 3,
            budget: Duration::from_secs(60),
        }
    }

    fn status(done: bool) -> ImportStatus {
        ImportStatus {
            operation: "operations/import-1".to_string(),
            done,
            ..ImportStatus::default()
        }
    }

    #[test]
    fn segments_win_over_snippets_and_are_never_mixed() {
        let mut first = hit("a.pdf");
        first.snippets = vec![Fragment::new("snippet from a")];
        let mut second = hit("b.pdf");
        second.extractive_segments = vec![Fragment::new("segment from b").on_page(4)];
        second.snippets = vec![Fragment::new("snippet from b")];

        let context = consolidate(&[first, second]).expect("segments present");

        assert_eq!(context.tier, ContextTier::ExtractiveSegments);
        assert_eq!(context.text(), "segment from b");
        assert!(!context.text().contains("snippet"));
        assert_eq!(context.snippets[0].page, Some(4));
        assert_eq!(context.sources(), vec!["b.pdf"]);
    }

    #[test]
    fn answers_are_used_only_when_no_segment_exists() {
        let mut first = hit("a.pdf");
        first.extractive_answers = vec![Fragment::new("HbA1c 7.1%")];
        first.snippets = vec![Fragment::new("snippet a")];
        let mut second = hit("b.pdf");
        second.extractive_segments = vec![Fragment::new("   ")];
        second.extractive_answers = vec![Fragment::new("LDL 130 mg/dL")];

        let context = consolidate(&[first, second]).expect("answers present");

        assert_eq!(context.tier, ContextTier::ExtractiveAnswers);
        assert_eq!(context.text(), "HbA1c 7.1%\n\nLDL 130 mg/dL");
    }

    #[test]
    fn snippets_are_the_last_resort() {
        let mut only = hit("c.pdf");
        only.snippets = vec![Fragment::new(""), Fragment::new("patient reports headaches")];

        let context = consolidate(&[only]).expect("snippet present");
        assert_eq!(context.tier, ContextTier::Snippets);
        assert_eq!(context.text(), "patient reports headaches");
        assert!(consolidate(&[hit("d.pdf")]).is_none());
    }

    #[test]
    fn hits_without_a_source_file_are_cited_by_document_id() {
        let mut unnamed = SearchHit {
            document_id: "Patient_Record_04".to_string(),
            ..SearchHit::default()
        };
        unnamed.extractive_segments = vec![Fragment::new("Blood type O negative.")];
        let mut anonymous = SearchHit::default();
        anonymous.extractive_segments = vec![Fragment::new("unattributed text")];

        let context = consolidate(&[unnamed, anonymous]).expect("segment present");

        assert_eq!(context.snippets.len(), 1);
        assert_eq!(context.snippets[0].source_file, "Patient_Record_04");
        assert_eq!(context.sources(), vec!["Patient_Record_04"]);
    }

    #[test]
    fn fragments_keep_their_text_and_blank_ones_are_dropped() {
        let mut only = hit("e.pdf");
        only.extractive_segments = vec![
            Fragment::new("  indented line\n"),
            Fragment::new(" \n\t "),
        ];

        let context = consolidate(&[only]).expect("segment present");

        assert_eq!(context.snippets.len(), 1);
        assert_eq!(context.snippets[0].content, "  indented line\n");
    }

    #[tokio::test]
    async fn zero_results_yield_the_empty_sentinel() {
        let client = SearchClient::new(FakeIndex::with_hits(Vec::new()), SearchOptions::default());

        assert_eq!(client.search("fever").await, Retrieval::Empty);
        assert_eq!(client.search_context("fever").await, NO_RELEVANT_DOCUMENTS);
    }

    #[tokio::test]
    async fn backend_failure_yields_the_error_sentinel() {
        let client = SearchClient::new(FakeIndex::failing(), SearchOptions::default());

        assert!(matches!(client.search("fever").await, Retrieval::Failed(_)));
        let text = client.search_context("fever").await;
        assert_eq!(text, RETRIEVAL_ERROR);
        assert_ne!(text, NO_RELEVANT_DOCUMENTS);
    }

    #[tokio::test]
    async fn one_bounded_request_asks_for_extractive_content() {
        let client = SearchClient::new(FakeIndex::with_hits(Vec::new()), SearchOptions::default());
        client.search("medication list").await;

        let requests = client.index().requests.lock().expect("lock").clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].page_size, 5);
        assert_eq!(requests[0].max_extractive_segments, 1);
        assert_eq!(requests[0].max_extractive_answers, 1);
        assert!(requests[0].return_snippets);
    }

    #[tokio::test]
    async fn connect_fails_fast_when_data_store_is_missing() {
        let mut index = FakeIndex::with_hits(Vec::new());
        index.data_stores = vec!["other".to_string()];

        let result = SearchClient::connect(index, SearchOptions::default()).await;
        assert!(matches!(
            result.err(),
            Some(ConfigError::DataStoreNotFound { location, .. }) if location == "us"
        ));
    }

    #[tokio::test]
    async fn import_polls_until_done_and_reports_counts() -> Result<(), IngestError> {
        let mut finished = status(true);
        finished.success_count = 2;
        finished.failure_count = 1;
        finished.error_samples = vec!["x.pdf: unreadable".to_string()];
        let index = FakeIndex::with_statuses(vec![
            Ok(status(false)),
            Err("transient".to_string()),
            Ok(finished),
        ]);
        let client = SearchClient::new(index, SearchOptions::default());

        let report = client
            .import_from_storage("gs://bucket/metadata/metadata.jsonl", &quick_poll())
            .await?;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.error_samples.len(), 1);
        assert_eq!(report.mode, ReconciliationMode::Incremental);
        let imports = client.index().imports.lock().expect("lock").clone();
        assert_eq!(
            imports,
            vec![(
                "gs://bucket/metadata/metadata.jsonl".to_string(),
                ReconciliationMode::Incremental
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn import_gives_up_after_max_attempts() {
        let index = FakeIndex::with_statuses(vec![
            Ok(status(false)),
            Ok(status(false)),
            Ok(status(false)),
            Ok(status(false)),
            Ok(status(true)),
        ]);
        let client = SearchClient::new(index, SearchOptions::default());

        let result = client
            .import_from_storage("gs://bucket/metadata/metadata.jsonl", &quick_poll())
            .await;
        assert!(matches!(result, Err(IngestError::Import(_))));
    }

    #[tokio::test]
    async fn failed_operation_is_an_import_error() {
        let mut failed = status(true);
        failed.error = Some("permission denied on bucket".to_string());
        let client = SearchClient::new(
            FakeIndex::with_statuses(vec![Ok(failed)]),
            SearchOptions::default(),
        );

        let result = client
            .import_from_storage("gs://bucket/metadata/metadata.jsonl", &quick_poll())
            .await;
        assert!(matches!(result, Err(IngestError::Import(reason)) if reason.contains("permission denied")));
    }
}
