pub mod auth;
pub mod discovery;
pub mod gcs;
pub mod gemini;

pub use auth::{default_token_source, AdcToken, StaticToken};
pub use discovery::DiscoveryEngineClient;
pub use gcs::GcsObjectStore;
pub use gemini::GeminiModel;
