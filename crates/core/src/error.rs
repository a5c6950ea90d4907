use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid location '{0}': must be one of us, eu, global")]
    InvalidLocation(String),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("data store '{data_store_id}' not found in location '{location}'")]
    DataStoreNotFound {
        data_store_id: String,
        location: String,
    },

    #[error("data store validation failed: {0}")]
    Validation(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("unsupported document format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upload of {object} failed: {reason}")]
    Upload { object: String, reason: String },

    #[error("import failed: {0}")]
    Import(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("credentials unavailable: {0}")]
    Auth(String),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer model {model} failed: {details}")]
    Model { model: String, details: String },

    #[error(transparent)]
    Backend(#[from] SearchError),
}
