//! Grounded answering: every question triggers exactly one retrieval, and the
//! answer is composed only from what that retrieval returned.

use crate::error::AnswerError;
use crate::models::{ConsolidatedContext, Retrieval};
use crate::traits::{AnswerModel, Retriever};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

pub const REFUSAL: &str = "I could not find any information about that in the documents.";
pub const RETRIEVAL_ERROR_MESSAGE: &str =
    "Sorry, I could not search the documents right now. Please try again in a moment.";
pub const ANSWER_ERROR_MESSAGE: &str =
    "Sorry, I could not compose an answer from the documents right now.";

pub const SYSTEM_INSTRUCTION: &str = "\
You are a medical records analysis assistant. The records you can see are synthetic, not real patient data.
- Answer exclusively from the context supplied with the question. Do not use prior knowledge.
- Cite the source file of every fact you use as [Source: file name].
- If the context does not contain the answer, say that you could not find the information in the documents.
- Do not answer questions unrelated to the documents.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Everything an answer model is allowed to see for one question.
pub struct GroundedPrompt<'a> {
    pub question: &'a str,
    pub context: &'a ConsolidatedContext,
    pub history: &'a [Turn],
}

impl GroundedPrompt<'_> {
    pub fn user_message(&self) -> String {
        format!(
            "Context from the documents:\n\n{}\n\nQuestion: {}",
            self.context.annotated_text(),
            self.question
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerKind {
    Grounded,
    Refused,
    RetrievalFailed,
    ModelFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    pub citations: Vec<String>,
}

impl Answer {
    fn fixed(text: &str, kind: AnswerKind) -> Self {
        Self {
            text: text.to_string(),
            kind,
            citations: Vec::new(),
        }
    }
}

pub struct GroundedAgent<R, M> {
    retriever: R,
    model: M,
}

impl<R, M> GroundedAgent<R, M>
where
    R: Retriever,
    M: AnswerModel,
{
    pub fn new(retriever: R, model: M) -> Self {
        Self { retriever, model }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub async fn ask(&self, question: &str, history: &[Turn]) -> Answer {
        info!(question, "question received");

        let context = match self.retriever.retrieve(question).await {
            Retrieval::Found(context) => context,
            Retrieval::Empty => {
                info!("no context retrieved; refusing");
                return Answer::fixed(REFUSAL, AnswerKind::Refused);
            }
            Retrieval::Failed(reason) => {
                warn!(%reason, "retrieval failed");
                return Answer::fixed(RETRIEVAL_ERROR_MESSAGE, AnswerKind::RetrievalFailed);
            }
        };

        let citations = context.sources();
        if citations.is_empty() {
            warn!("retrieved context carries no provenance; refusing");
            return Answer::fixed(REFUSAL, AnswerKind::Refused);
        }

        let prompt = GroundedPrompt {
            question,
            context: &context,
            history,
        };
        let text = match self.model.answer(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(model = self.model.name(), "model returned an empty answer");
                return Answer::fixed(ANSWER_ERROR_MESSAGE, AnswerKind::ModelFailed);
            }
            Err(answer_error) => {
                warn!(model = self.model.name(), error = %answer_error, "answer model failed");
                return Answer::fixed(ANSWER_ERROR_MESSAGE, AnswerKind::ModelFailed);
            }
        };

        let text = with_citations(text.trim(), &citations);
        info!(citations = citations.len(), "grounded answer composed");

        Answer {
            text,
            kind: AnswerKind::Grounded,
            citations,
        }
    }
}

/// Appends a sources line unless every source is already cited inline as
/// `[Source: name]`. A bare mention of a file name does not count.
pub fn with_citations(answer: &str, sources: &[String]) -> String {
    let missing: Vec<&str> = sources
        .iter()
        .map(String::as_str)
        .filter(|source| !answer.contains(&format!("[Source: {source}")))
        .collect();

    if missing.is_empty() {
        answer.to_string()
    } else {
        format!("{answer}\n\nSources: {}", sources.join(", "))
    }
}

/// Answers with the top-ranked fragment verbatim. Used when no generative model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveAnswerer;

#[async_trait]
impl AnswerModel for ExtractiveAnswerer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn answer(&self, prompt: &GroundedPrompt<'_>) -> Result<String, AnswerError> {
        prompt
            .context
            .snippets
            .first()
            .map(|snippet| snippet.content.clone())
            .ok_or_else(|| AnswerError::Model {
                model: self.name().to_string(),
                details: "context has no fragments".to_string(),
            })
    }
}

/// One user's conversation. History is owned here and never shared across sessions.
pub struct ChatSession<'a, R, M> {
    agent: &'a GroundedAgent<R, M>,
    history: Vec<Turn>,
}

impl<'a, R, M> ChatSession<'a, R, M>
where
    R: Retriever,
    M: AnswerModel,
{
    pub fn new(agent: &'a GroundedAgent<R, M>) -> Self {
        Self {
            agent,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub async fn ask(&mut self, question: &str) -> Answer {
        let answer = self.agent.ask(question, &self.history).await;
        if answer.kind == AnswerKind::Grounded {
            self.history.push(Turn {
                question: question.to_string(),
                answer: answer.text.clone(),
            });
        }
        answer
    }
}
