use crate::config::IndexTarget;
use crate::models::{Fragment, ImportStatus, ReconciliationMode, SearchHit, SearchRequest};
use crate::traits::{IndexService, TokenSource};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::sync::Arc;

const BACKEND: &str = "discoveryengine";
const NO_SNIPPET: &str = "NO_SNIPPET_AVAILABLE";

/// REST client for a Discovery Engine data store.
///
/// The endpoint is derived from the target's location, so requests always go
/// to the region the data store lives in.
pub struct DiscoveryEngineClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    target: IndexTarget,
    endpoint: String,
}

impl DiscoveryEngineClient {
    pub fn new(target: IndexTarget, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            tokens,
            endpoint: target.location.discovery_endpoint(),
            target,
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.endpoint.trim_end_matches('/'), resource)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, SearchError> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(token)
            .header("X-Goog-User-Project", &self.target.project_id)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IndexService for DiscoveryEngineClient {
    fn target(&self) -> &IndexTarget {
        &self.target
    }

    async fn data_store_ids(&self) -> Result<Vec<String>, SearchError> {
        let url = self.url(&format!("{}/dataStores", self.target.collection_path()));
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page = self.send(request).await?;
            ids.extend(parse_data_store_ids(&page));

            page_token = page
                .pointer("/nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(ids);
            }
        }
    }

    async fn import_documents(
        &self,
        manifest_uri: &str,
        mode: ReconciliationMode,
    ) -> Result<ImportStatus, SearchError> {
        let body = json!({
            "gcsSource": {
                "inputUris": [manifest_uri],
                "dataSchema": "document",
            },
            "reconciliationMode": mode,
        });

        let url = self.url(&format!("{}/documents:import", self.target.branch_path()));
        let operation = self.send(self.client.post(url).json(&body)).await?;
        parse_operation(&operation)
    }

    async fn import_status(&self, operation: &str) -> Result<ImportStatus, SearchError> {
        let operation = self.send(self.client.get(self.url(operation))).await?;
        parse_operation(&operation)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let body = json!({
            "query": request.query,
            "pageSize": request.page_size,
            "contentSearchSpec": {
                "snippetSpec": { "returnSnippet": request.return_snippets },
                "extractiveContentSpec": {
                    "maxExtractiveAnswerCount": request.max_extractive_answers,
                    "maxExtractiveSegmentCount": request.max_extractive_segments,
                },
            },
        });

        let url = self.url(&format!("{}:search", self.target.serving_config_path()));
        let response = self.send(self.client.post(url).json(&body)).await?;
        Ok(parse_search_hits(&response))
    }
}

fn parse_data_store_ids(page: &Value) -> Vec<String> {
    page.pointer("/dataStores")
        .and_then(Value::as_array)
        .map(|stores| {
            stores
                .iter()
                .filter_map(|store| store.pointer("/name").and_then(Value::as_str))
                .filter_map(|name| name.rsplit('/').next())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// int64 fields arrive as JSON strings.
fn as_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::String(text)) => text.parse().unwrap_or(0),
        Some(number) => number.as_u64().unwrap_or(0),
        None => 0,
    }
}

fn parse_operation(operation: &Value) -> Result<ImportStatus, SearchError> {
    let name = operation
        .pointer("/name")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "operation has no name".to_string(),
        })?;

    let error_samples = operation
        .pointer("/response/errorSamples")
        .or_else(|| operation.pointer("/metadata/errorSamples"))
        .and_then(Value::as_array)
        .map(|samples| {
            samples
                .iter()
                .map(|sample| {
                    sample
                        .pointer("/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| sample.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    let error = operation.pointer("/error").map(|error| {
        error
            .pointer("/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    });

    Ok(ImportStatus {
        operation: name.to_string(),
        done: operation
            .pointer("/done")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        success_count: as_count(operation.pointer("/metadata/successCount")),
        failure_count: as_count(operation.pointer("/metadata/failureCount")),
        error_samples,
        error,
    })
}

fn fragments(derived: &Value, key: &str, text_field: &str) -> Vec<Fragment> {
    derived
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("snippet_status").and_then(Value::as_str) != Some(NO_SNIPPET))
                .filter_map(|item| {
                    let content = item.get(text_field).and_then(Value::as_str)?;
                    let page = match item.get("pageNumber") {
                        Some(Value::String(text)) => text.parse().ok(),
                        Some(number) => number.as_u64().and_then(|page| u32::try_from(page).ok()),
                        None => None,
                    };
                    Some(Fragment {
                        content: content.to_string(),
                        page,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Snippets come back with the query terms wrapped in `<b>` highlight tags.
fn strip_highlights(mut fragment: Fragment) -> Fragment {
    fragment.content = fragment.content.replace("<b>", "").replace("</b>", "");
    fragment
}

fn parse_search_hits(response: &Value) -> Vec<SearchHit> {
    let results = response
        .pointer("/results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    results
        .iter()
        .filter_map(|result| result.pointer("/document"))
        .map(|document| {
            let derived = document
                .pointer("/derivedStructData")
                .cloned()
                .unwrap_or(Value::Null);

            let source_file = document
                .pointer("/structData/source_file")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    derived
                        .pointer("/link")
                        .and_then(Value::as_str)
                        .and_then(|link| link.rsplit('/').next())
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                });

            SearchHit {
                document_id: document
                    .pointer("/id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source_file,
                extractive_segments: fragments(&derived, "extractive_segments", "content"),
                extractive_answers: fragments(&derived, "extractive_answers", "content"),
                snippets: fragments(&derived, "snippets", "snippet")
                    .into_iter()
                    .map(strip_highlights)
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_keeps_rank_order_and_provenance() {
        let response = json!({
            "results": [
                {
                    "id": "Patient_Record_01",
                    "document": {
                        "id": "Patient_Record_01",
                        "structData": { "source_file": "Patient_Record_01.pdf" },
                        "derivedStructData": {
                            "link": "gs://bucket/raw/Patient_Record_01.pdf",
                            "extractive_segments": [
                                { "content": "Diagnosis: type 2 diabetes.", "pageNumber": "2" }
                            ],
                            "snippets": [
                                { "snippet": "type 2 <b>diabetes</b>", "snippet_status": "SUCCESS" }
                            ]
                        }
                    }
                },
                {
                    "document": {
                        "id": "Patient_Record_02",
                        "derivedStructData": {
                            "link": "gs://bucket/raw/Patient_Record_02.pdf",
                            "extractive_answers": [ { "content": "HbA1c 7.1%", "pageNumber": 1 } ],
                            "snippets": [
                                {
                                    "snippet": "No snippet is available for this page.",
                                    "snippet_status": "NO_SNIPPET_AVAILABLE"
                                }
                            ]
                        }
                    }
                }
            ]
        });

        let hits = parse_search_hits(&response);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_file.as_deref(), Some("Patient_Record_01.pdf"));
        assert_eq!(
            hits[0].extractive_segments,
            vec![Fragment::new("Diagnosis: type 2 diabetes.").on_page(2)]
        );
        assert_eq!(hits[0].snippets, vec![Fragment::new("type 2 diabetes")]);
        assert_eq!(hits[1].source_file.as_deref(), Some("Patient_Record_02.pdf"));
        assert_eq!(hits[1].extractive_answers[0].page, Some(1));
        assert!(hits[1].snippets.is_empty());
    }

    #[test]
    fn import_operation_counts_and_samples_are_read() -> Result<(), SearchError> {
        let operation = json!({
            "name": "projects/p/locations/eu/collections/default_collection/dataStores/d/branches/0/operations/import-123",
            "done": true,
            "metadata": { "successCount": "2", "failureCount": "1" },
            "response": {
                "errorSamples": [ { "code": 3, "message": "gs://bucket/raw/x.pdf: unsupported" } ]
            }
        });

        let status = parse_operation(&operation)?;
        assert!(status.done);
        assert_eq!(status.success_count, 2);
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.error_samples, vec!["gs://bucket/raw/x.pdf: unsupported"]);
        assert_eq!(status.error, None);
        Ok(())
    }

    #[test]
    fn pending_operation_without_metadata_is_not_done() -> Result<(), SearchError> {
        let status = parse_operation(&json!({ "name": "operations/import-9" }))?;
        assert!(!status.done);
        assert_eq!(status.success_count, 0);
        assert!(parse_operation(&json!({ "done": true })).is_err());
        Ok(())
    }

    #[test]
    fn data_store_ids_are_last_name_segment() {
        let page = json!({
            "dataStores": [
                { "name": "projects/p/locations/us/collections/default_collection/dataStores/records" },
                { "name": "projects/p/locations/us/collections/default_collection/dataStores/other" }
            ]
        });
        assert_eq!(parse_data_store_ids(&page), vec!["records", "other"]);
    }
}
