use crate::agent::{GroundedPrompt, SYSTEM_INSTRUCTION};
use crate::config::ModelConfig;
use crate::error::AnswerError;
use crate::traits::{AnswerModel, TokenSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Gemini via Vertex AI `generateContent`.
pub struct GeminiModel {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    project_id: String,
    config: ModelConfig,
}

impl GeminiModel {
    pub fn new(project_id: impl Into<String>, config: ModelConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: Client::new(),
            tokens,
            project_id: project_id.into(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:generateContent",
            region = self.config.vertex_region,
            project = self.project_id,
            model = self.config.name,
        )
    }

    fn failed(&self, details: impl Into<String>) -> AnswerError {
        AnswerError::Model {
            model: self.config.name.clone(),
            details: details.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    candidate_count: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn build_request(prompt: &GroundedPrompt<'_>, temperature: f32) -> GenerateRequest {
    let mut contents = Vec::with_capacity(prompt.history.len() * 2 + 1);
    for turn in prompt.history {
        contents.push(Content::text(Some("user"), turn.question.clone()));
        contents.push(Content::text(Some("model"), turn.answer.clone()));
    }
    contents.push(Content::text(Some("user"), prompt.user_message()));

    GenerateRequest {
        system_instruction: Content::text(None, SYSTEM_INSTRUCTION),
        contents,
        generation_config: GenerationConfig {
            temperature,
            candidate_count: 1,
        },
    }
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl AnswerModel for GeminiModel {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn answer(&self, prompt: &GroundedPrompt<'_>) -> Result<String, AnswerError> {
        let token = self.tokens.token().await?;
        let request = build_request(prompt, self.config.temperature);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|error| self.failed(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.failed(format!("{status}: {body}")));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|error| self.failed(format!("unreadable response: {error}")))?;

        first_candidate_text(payload).ok_or_else(|| self.failed("response had no text"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Turn;
    use crate::models::{ConsolidatedContext, ContextSnippet, ContextTier};

    #[test]
    fn request_carries_history_context_and_zero_temperature() -> Result<(), serde_json::Error> {
        let context = ConsolidatedContext {
            tier: ContextTier::ExtractiveSegments,
            snippets: vec![ContextSnippet {
                content: "Blood type: O negative.".to_string(),
                source_file: "Patient_Record_03.pdf".to_string(),
                page: Some(1),
            }],
        };
        let history = vec![Turn {
            question: "Who is the patient?".to_string(),
            answer: "Jane Roe [Source: Patient_Record_03.pdf]".to_string(),
        }];
        let prompt = GroundedPrompt {
            question: "What is her blood type?",
            context: &context,
            history: &history,
        };

        let body = serde_json::to_value(build_request(&prompt, 0.0))?;

        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert_eq!(body["contents"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["contents"][1]["role"], "model");
        let last = body["contents"][2]["parts"][0]["text"].as_str().unwrap_or_default();
        assert!(last.contains("[Source: Patient_Record_03.pdf, page 1]"));
        assert!(last.contains("What is her blood type?"));
        assert!(body["systemInstruction"].get("role").is_none());
        Ok(())
    }

    #[test]
    fn candidate_parts_are_joined() -> Result<(), serde_json::Error> {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [
                { "content": { "role": "model", "parts": [ { "text": "O negative " }, { "text": "[Source: a.pdf]" } ] } }
            ]
        }))?;
        assert_eq!(
            first_candidate_text(response).as_deref(),
            Some("O negative [Source: a.pdf]")
        );

        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({ "candidates": [] }))?;
        assert_eq!(first_candidate_text(empty), None);
        Ok(())
    }
}
