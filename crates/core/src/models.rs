use serde::{Deserialize, Serialize};

/// A contiguous window of a parsed document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Offset of the first character, counted in chars rather than bytes.
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.start + self.text.chars().count()
    }
}

/// Only incremental imports are issued: entries missing from a batch stay in the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationMode {
    #[default]
    Incremental,
}

/// Snapshot of a long-running import operation on the managed index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStatus {
    pub operation: String,
    pub done: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_samples: Vec<String>,
    /// Set when the operation as a whole failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub operation: String,
    pub manifest_uri: String,
    pub mode: ReconciliationMode,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub page_size: usize,
    pub max_extractive_segments: usize,
    pub max_extractive_answers: usize,
    pub return_snippets: bool,
}

/// One piece of text returned by the index, with the page it came from when known.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    pub content: String,
    pub page: Option<u32>,
}

impl Fragment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page: None,
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// One ranked result of a search, as derived by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchHit {
    pub document_id: String,
    pub source_file: Option<String>,
    pub extractive_segments: Vec<Fragment>,
    pub extractive_answers: Vec<Fragment>,
    pub snippets: Vec<Fragment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContextTier {
    ExtractiveSegments,
    ExtractiveAnswers,
    Snippets,
}

impl ContextTier {
    pub const PRIORITY: [ContextTier; 3] = [
        ContextTier::ExtractiveSegments,
        ContextTier::ExtractiveAnswers,
        ContextTier::Snippets,
    ];

    pub fn fragments(self, hit: &SearchHit) -> &[Fragment] {
        match self {
            ContextTier::ExtractiveSegments => &hit.extractive_segments,
            ContextTier::ExtractiveAnswers => &hit.extractive_answers,
            ContextTier::Snippets => &hit.snippets,
        }
    }
}

/// A context fragment and the document it came from. Provenance is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnippet {
    pub content: String,
    pub source_file: String,
    pub page: Option<u32>,
}

impl ContextSnippet {
    pub fn citation(&self) -> String {
        match self.page {
            Some(page) => format!("{}, page {page}", self.source_file),
            None => self.source_file.clone(),
        }
    }
}

/// The context handed to the answering model: one tier's fragments in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedContext {
    pub tier: ContextTier,
    pub snippets: Vec<ContextSnippet>,
}

impl ConsolidatedContext {
    pub const SEPARATOR: &'static str = "\n\n";

    /// Fragments joined with a blank line, in retrieval order.
    pub fn text(&self) -> String {
        self.snippets
            .iter()
            .map(|snippet| snippet.content.as_str())
            .collect::<Vec<_>>()
            .join(Self::SEPARATOR)
    }

    /// Same as [`text`](Self::text), each fragment prefixed with its provenance.
    pub fn annotated_text(&self) -> String {
        self.snippets
            .iter()
            .map(|snippet| format!("[Source: {}]\n{}", snippet.citation(), snippet.content))
            .collect::<Vec<_>>()
            .join(Self::SEPARATOR)
    }

    /// Distinct source files in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for snippet in &self.snippets {
            if !sources.contains(&snippet.source_file) {
                sources.push(snippet.source_file.clone());
            }
        }
        sources
    }
}

pub const NO_RELEVANT_DOCUMENTS: &str = "no relevant documents found";
pub const RETRIEVAL_ERROR: &str = "error retrieving documents from the search backend";

/// Outcome of one retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    Found(ConsolidatedContext),
    Empty,
    Failed(String),
}

impl Retrieval {
    /// String form handed to a tool-calling model.
    pub fn as_tool_output(&self) -> String {
        match self {
            Retrieval::Found(context) => context.text(),
            Retrieval::Empty => NO_RELEVANT_DOCUMENTS.to_string(),
            Retrieval::Failed(_) => RETRIEVAL_ERROR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(content: &str, source: &str, page: Option<u32>) -> ContextSnippet {
        ContextSnippet {
            content: content.to_string(),
            source_file: source.to_string(),
            page,
        }
    }

    #[test]
    fn context_text_joins_with_blank_line() {
        let context = ConsolidatedContext {
            tier: ContextTier::Snippets,
            snippets: vec![
                snippet("first", "a.pdf", None),
                snippet("second", "b.pdf", Some(3)),
            ],
        };

        assert_eq!(context.text(), "first\n\nsecond");
        assert_eq!(
            context.annotated_text(),
            "[Source: a.pdf]\nfirst\n\n[Source: b.pdf, page 3]\nsecond"
        );
    }

    #[test]
    fn sources_are_deduplicated_in_rank_order() {
        let context = ConsolidatedContext {
            tier: ContextTier::ExtractiveSegments,
            snippets: vec![
                snippet("x", "b.pdf", None),
                snippet("z", "a.pdf", None),
                snippet("w", "b.pdf", Some(2)),
            ],
        };

        assert_eq!(context.sources(), vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn sentinels_are_distinct() {
        assert_ne!(
            Retrieval::Empty.as_tool_output(),
            Retrieval::Failed("timeout".to_string()).as_tool_output()
        );
        assert_eq!(Retrieval::Empty.as_tool_output(), NO_RELEVANT_DOCUMENTS);
    }

    #[test]
    fn reconciliation_mode_uses_api_spelling() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&ReconciliationMode::Incremental)?,
            "\"INCREMENTAL\""
        );
        Ok(())
    }
}
