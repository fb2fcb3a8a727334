//! Cloze question generation
//!
//! The generator turns a highlight into a fill-in-the-blank question and its
//! answer. `OpenAiGenerator` talks to any OpenAI-compatible chat completions
//! endpoint and asks for a strict JSON schema response.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a specialized educational assistant designed to create \
fill-in-the-blank questions from provided text content.";

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generator API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("Question generator is not configured")]
    NotConfigured,
}

/// A generated question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClozeQa {
    pub question: String,
    pub answer: String,
}

impl ClozeQa {
    fn validate(self) -> Result<Self, GeneratorError> {
        if self.question.trim().is_empty() || self.answer.trim().is_empty() {
            return Err(GeneratorError::InvalidResponse(
                "empty question or answer".to_string(),
            ));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_cloze(&self, content: &str) -> Result<ClozeQa, GeneratorError>;
}

/// Generator used when no API key is configured; every call fails
pub struct DisabledGenerator;

#[async_trait]
impl QuestionGenerator for DisabledGenerator {
    async fn generate_cloze(&self, _content: &str) -> Result<ClozeQa, GeneratorError> {
        Err(GeneratorError::NotConfigured)
    }
}

/// OpenAI-compatible chat completions generator
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    /// Fails if the HTTP client cannot be built, e.g. no TLS backend
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
    ) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
        })
    }

    fn request_body(&self, content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "create_question",
                    "description": "Generate cloze type question and answer from a piece of information",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "question": {
                                "type": "string",
                                "description": "Fill in the blank type question from the notes",
                            },
                            "answer": {
                                "type": "string",
                                "description": "Answer of the fill in the blank type question",
                            },
                        },
                        "required": ["question", "answer"],
                        "additionalProperties": false,
                    },
                },
            },
        })
    }
}

#[async_trait]
impl QuestionGenerator for OpenAiGenerator {
    async fn generate_cloze(&self, content: &str) -> Result<ClozeQa, GeneratorError> {
        log::info!("Generating cloze question with {}", self.model);

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(content))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::warn!("Cloze generation failed with status {}", status);
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Extract the question/answer pair from a chat completions response body
pub fn parse_completion(body: &str) -> Result<ClozeQa, GeneratorError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| GeneratorError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GeneratorError::InvalidResponse("No choices in response".to_string()))?;

    let qa: ClozeQa = serde_json::from_str(&content)
        .map_err(|e| GeneratorError::InvalidResponse(format!("Malformed cloze payload: {}", e)))?;

    qa.validate()
}
