use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Region the managed index was created in. Clients must use the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Us,
    Eu,
    Global,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Us => "us",
            Location::Eu => "eu",
            Location::Global => "global",
        }
    }

    pub fn discovery_endpoint(self) -> String {
        match self {
            Location::Global => "https://discoveryengine.googleapis.com".to_string(),
            regional => format!("https://{}-discoveryengine.googleapis.com", regional.as_str()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "us" => Ok(Location::Us),
            "eu" => Ok(Location::Eu),
            "global" => Ok(Location::Global),
            _ => Err(ConfigError::InvalidLocation(value.to_string())),
        }
    }
}

/// Fully qualified data store the pipeline imports into and searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub project_id: String,
    pub location: Location,
    pub data_store_id: String,
}

impl IndexTarget {
    pub fn new(
        project_id: impl Into<String>,
        location: Location,
        data_store_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location,
            data_store_id: data_store_id.into(),
        }
    }

    pub fn collection_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/default_collection",
            self.project_id, self.location
        )
    }

    pub fn data_store_path(&self) -> String {
        format!("{}/dataStores/{}", self.collection_path(), self.data_store_id)
    }

    pub fn branch_path(&self) -> String {
        format!("{}/branches/default_branch", self.data_store_path())
    }

    pub fn serving_config_path(&self) -> String {
        format!("{}/servingConfigs/default_config", self.data_store_path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub page_size: usize,
    pub max_extractive_segments: usize,
    pub max_extractive_answers: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: 5,
            max_extractive_segments: 1,
            max_extractive_answers: 1,
        }
    }
}

/// Exponential backoff for polling the import operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
            max_attempts: 40,
            budget: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    /// Delay before poll number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub vertex_region: String,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.0-flash-lite".to_string(),
            vertex_region: "us-central1".to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub index: IndexTarget,
    pub bucket: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub recursive: bool,
    pub chunking: ChunkingConfig,
    pub search: SearchOptions,
    pub import_poll: PollPolicy,
    pub upload_concurrency: usize,
    pub model: ModelConfig,
}

impl RagConfig {
    pub fn new(index: IndexTarget, bucket: impl Into<String>) -> Self {
        Self {
            index,
            bucket: bucket.into(),
            input_dir: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/processed"),
            recursive: false,
            chunking: ChunkingConfig::default(),
            search: SearchOptions::default(),
            import_poll: PollPolicy::default(),
            upload_concurrency: 4,
            model: ModelConfig::default(),
        }
    }

    /// Checked once at startup, before any storage or index call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("project_id", &self.index.project_id)?;
        require("data_store_id", &self.index.data_store_id)?;
        require("bucket", &self.bucket)?;
        require("model.name", &self.model.name)?;
        require("model.vertex_region", &self.model.vertex_region)?;

        positive("chunking.chunk_size", self.chunking.chunk_size)?;
        positive("search.page_size", self.search.page_size)?;
        positive("upload_concurrency", self.upload_concurrency)?;
        positive("import_poll.max_attempts", self.import_poll.max_attempts as usize)?;

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid {
                name: "model.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.model.temperature),
            });
        }
        Ok(())
    }
}

fn require(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(())
    }
}

fn positive(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RagConfig {
        RagConfig::new(IndexTarget::new("demo-project", Location::Eu, "records"), "bucket")
    }

    #[test]
    fn locations_parse_from_enumerated_set_only() {
        assert_eq!("EU".parse::<Location>().ok(), Some(Location::Eu));
        assert_eq!("global".parse::<Location>().ok(), Some(Location::Global));
        assert!(matches!(
            "us-central1".parse::<Location>(),
            Err(ConfigError::InvalidLocation(_))
        ));
    }

    #[test]
    fn endpoints_follow_location() {
        assert_eq!(
            Location::Eu.discovery_endpoint(),
            "https://eu-discoveryengine.googleapis.com"
        );
        assert_eq!(
            Location::Global.discovery_endpoint(),
            "https://discoveryengine.googleapis.com"
        );
    }

    #[test]
    fn resource_paths_embed_location() {
        let target = config().index;
        assert_eq!(
            target.serving_config_path(),
            "projects/demo-project/locations/eu/collections/default_collection/dataStores/records/servingConfigs/default_config"
        );
        assert!(target.branch_path().ends_with("/dataStores/records/branches/default_branch"));
    }

    #[test]
    fn validation_rejects_missing_identifiers() {
        let mut missing = config();
        missing.index.data_store_id = " ".to_string();
        assert!(matches!(
            missing.validate(),
            Err(ConfigError::Missing("data_store_id"))
        ));

        let mut zero = config();
        zero.search.page_size = 0;
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid { .. })));

        assert!(config().validate().is_ok());
    }

    #[test]
    fn poll_delay_grows_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
    }
}
