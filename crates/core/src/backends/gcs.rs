use crate::backends::auth::StorageTokens;
use crate::error::IngestError;
use crate::metadata::StorageLayout;
use crate::traits::{ObjectStore, TokenSource};
use async_trait::async_trait;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::sync::Arc;

/// Simple media uploads into one bucket.
pub struct GcsObjectStore {
    client: GcsClient,
    layout: StorageLayout,
}

impl GcsObjectStore {
    /// Requests are authorized with the same tokens the index and model clients use.
    pub fn new(layout: StorageLayout, tokens: Arc<dyn TokenSource>) -> Self {
        let config = ClientConfig {
            token_source_provider: Some(Box::new(StorageTokens::new(tokens))),
            ..ClientConfig::default()
        };

        Self {
            client: GcsClient::new(config),
            layout,
        }
    }
}

fn media(object: &str, content_type: &str, length: usize) -> Media {
    let mut media = Media::new(object.to_string());
    media.content_type = content_type.to_string().into();
    media.content_length = u64::try_from(length).ok();
    media
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, IngestError> {
        let upload_type = UploadType::Simple(media(object, content_type, bytes.len()));

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.layout.bucket.clone(),
                    ..Default::default()
                },
                bytes,
                &upload_type,
            )
            .await
            .map_err(|error| IngestError::Upload {
                object: object.to_string(),
                reason: error.to_string(),
            })?;

        Ok(self.layout.uri(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_carries_object_name_type_and_length() {
        let media = media("raw/ward b/notes 1.pdf", "application/pdf", 2_048);

        assert_eq!(media.name, "raw/ward b/notes 1.pdf");
        assert_eq!(media.content_type, "application/pdf");
        assert_eq!(media.content_length, Some(2_048));
    }
}
