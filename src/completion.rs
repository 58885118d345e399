//! Completion gateway over Azure OpenAI chat completions.
//!
//! Sends an ordered turn sequence with the deployment's fixed sampling
//! parameters and returns the top answer. When a [`SearchBinding`] is
//! attached, the request goes to the `extensions` route so the service runs
//! retrieval-augmented generation against the bound index.
//!
//! Errors are returned, never retried; callers decide how to surface them
//! (see [`user_facing`]).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::{CompletionConfig, Secrets};
use crate::models::ConversationTurn;
use crate::retrieval::SearchBinding;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed completion response: {0}")]
    Malformed(String),
    #[error("completion service returned no answer")]
    EmptyAnswer,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub turns: Vec<ConversationTurn>,
    pub binding: Option<SearchBinding>,
}

impl CompletionRequest {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self {
            turns,
            binding: None,
        }
    }

    pub fn with_binding(mut self, binding: SearchBinding) -> Self {
        self.binding = Some(binding);
        self
    }
}

/// The LLM completion collaborator.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Message shown to a chat caller instead of an error.
pub fn user_facing(err: &CompletionError) -> String {
    format!("Error retrieving insights: {}", err)
}

// ============ Azure OpenAI ============

pub struct AzureOpenAiClient {
    endpoint: String,
    deployment: String,
    api_version: String,
    key: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AzureOpenAiClient {
    pub fn new(config: &CompletionConfig, secrets: &Secrets) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
            key: secrets.completion_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn url(&self, with_extensions: bool) -> String {
        let route = if with_extensions {
            "extensions/chat/completions"
        } else {
            "chat/completions"
        };
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.endpoint, self.deployment, route, self.api_version
        )
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.deployment,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": request.turns,
        });
        if let Some(binding) = &request.binding {
            if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), binding.data_sources())
            {
                obj.extend(extra);
            }
        }
        body
    }
}

#[async_trait]
impl CompletionService for AzureOpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = self.url(request.binding.is_some());
        tracing::debug!(
            deployment = %self.deployment,
            turns = request.turns.len(),
            rag = request.binding.is_some(),
            "requesting completion"
        );

        let resp = self
            .client
            .post(&url)
            .header("api-key", &self.key)
            .header("Content-Type", "application/json")
            .json(&self.body(request))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        parse_answer(&json)
    }
}

/// Extract the top choice's assistant content.
///
/// Plain completions carry `choices[0].message.content`; the extensions route
/// may instead return `choices[0].messages[]`, in which case the last
/// assistant message is the answer.
fn parse_answer(json: &Value) -> Result<String, CompletionError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| CompletionError::Malformed("missing choices array".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .or_else(|| {
            choice
                .get("messages")
                .and_then(|m| m.as_array())
                .and_then(|msgs| {
                    msgs.iter()
                        .rev()
                        .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("assistant"))
                })
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        });

    match content {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(CompletionError::EmptyAnswer),
    }
}
