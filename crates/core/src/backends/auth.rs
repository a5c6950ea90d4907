//! Bearer tokens for Google Cloud APIs.
//!
//! `GOOGLE_OAUTH_ACCESS_TOKEN` wins when set (handy with
//! `gcloud auth print-access-token`); otherwise Application Default
//! Credentials are used, refreshed and cached by `google-cloud-auth`.

use crate::error::SearchError;
use crate::traits::TokenSource;
use async_trait::async_trait;
use google_cloud_auth::project::Config;
use google_cloud_auth::token::DefaultTokenSourceProvider;
use google_cloud_token::{TokenSource as ProviderTokenSource, TokenSourceProvider};
use std::fmt;
use std::sync::Arc;

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/cloud-platform"];
const BEARER: &str = "Bearer ";

pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, SearchError> {
        Ok(self.token.clone())
    }
}

/// Application Default Credentials: credentials file, gcloud user login or
/// the metadata server, whichever is found first.
pub struct AdcToken {
    source: Arc<dyn ProviderTokenSource>,
}

impl AdcToken {
    pub async fn discover() -> Result<Self, SearchError> {
        let provider = DefaultTokenSourceProvider::new(Config::default().with_scopes(&SCOPES))
            .await
            .map_err(|error| SearchError::Auth(error.to_string()))?;

        Ok(Self {
            source: provider.token_source(),
        })
    }
}

#[async_trait]
impl TokenSource for AdcToken {
    async fn token(&self) -> Result<String, SearchError> {
        let header = self
            .source
            .token()
            .await
            .map_err(|error| SearchError::Auth(error.to_string()))?;

        Ok(header
            .strip_prefix(BEARER)
            .unwrap_or(header.as_str())
            .to_string())
    }
}

/// Lends a [`TokenSource`] to the Cloud Storage client, which expects
/// ready-made `Authorization` header values.
#[derive(Clone)]
pub(crate) struct StorageTokens {
    inner: Arc<dyn TokenSource>,
}

impl StorageTokens {
    pub(crate) fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for StorageTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTokens").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderTokenSource for StorageTokens {
    async fn token(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let token = self.inner.token().await?;
        Ok(format!("{BEARER}{token}"))
    }
}

impl TokenSourceProvider for StorageTokens {
    fn token_source(&self) -> Arc<dyn ProviderTokenSource> {
        Arc::new(self.clone())
    }
}

pub async fn default_token_source() -> Result<Arc<dyn TokenSource>, SearchError> {
    match StaticToken::from_env() {
        Some(token) => Ok(Arc::new(token)),
        None => Ok(Arc::new(AdcToken::discover().await?)),
    }
}
