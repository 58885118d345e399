//! Extraction adapter over Azure AI Document Intelligence.
//!
//! The adapter hands an [`AccessGrant`]'s signed URL to the extraction
//! service, waits for the long-running analysis to finish, and joins the
//! reported paragraphs into one body.
//!
//! # Protocol
//!
//! ```text
//! POST {endpoint}/formrecognizer/documentModels/{model}:analyze?api-version=...
//!      { "urlSource": "<signed url>" }
//!   → 202 Accepted, Operation-Location: <poll url>
//! GET  <poll url>   (every poll_interval_ms)
//!   → { "status": "notStarted" | "running" | "succeeded" | "failed" | "canceled", "analyzeResult": {...} }
//! ```
//!
//! The whole submit-and-poll sequence runs under one deadline
//! (`extraction.timeout_secs`). Nothing is retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ExtractionConfig, Secrets};
use crate::models::{AccessGrant, ExtractedDocument};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("access grant for '{resource}' expired at {expired_at}")]
    GrantExpired {
        resource: String,
        expired_at: DateTime<Utc>,
    },
    #[error("extraction service error: {0}")]
    Service(String),
    #[error("extraction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("extraction did not complete within {0} seconds")]
    Timeout(u64),
}

/// The text-extraction collaborator. Returns paragraph contents in the order
/// the service reported them.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, document_url: &str) -> Result<Vec<String>, ExtractError>;
}

/// Consume `grant` and produce the document body it points at.
///
/// An expired grant fails with [`ExtractError::GrantExpired`] before anything
/// is sent. Zero paragraphs is a successful, empty document.
pub async fn extract_document(
    analyzer: &dyn DocumentAnalyzer,
    grant: AccessGrant,
) -> Result<ExtractedDocument, ExtractError> {
    extract_document_at(analyzer, grant, Utc::now()).await
}

async fn extract_document_at(
    analyzer: &dyn DocumentAnalyzer,
    grant: AccessGrant,
    now: DateTime<Utc>,
) -> Result<ExtractedDocument, ExtractError> {
    if grant.is_expired(now) {
        return Err(ExtractError::GrantExpired {
            resource: grant.resource_ref().to_string(),
            expired_at: grant.expires_at(),
        });
    }

    let paragraphs = analyzer.analyze(grant.url()).await?;
    let document = ExtractedDocument::from_paragraphs(grant.resource_ref(), &paragraphs);
    if document.is_empty {
        tracing::warn!(resource = grant.resource_ref(), "extraction returned no paragraphs");
    } else {
        tracing::info!(
            resource = grant.resource_ref(),
            paragraphs = paragraphs.len(),
            chars = document.body_text.len(),
            "extracted document"
        );
    }
    Ok(document)
}

// ============ Document Intelligence client ============

pub struct DocumentIntelligenceClient {
    endpoint: String,
    model: String,
    api_version: String,
    key: String,
    poll_interval: Duration,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl DocumentIntelligenceClient {
    pub fn new(config: &ExtractionConfig, secrets: &Secrets) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_version: config.api_version.clone(),
            key: secrets.extraction_key.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout_secs: config.timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model, self.api_version
        )
    }

    async fn begin_analyze(&self, document_url: &str) -> Result<String, ExtractError> {
        let resp = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .json(&serde_json::json!({ "urlSource": document_url }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Service(format!(
                "analyze request rejected (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        resp.headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ExtractError::Service("analyze response has no Operation-Location".to_string())
            })
    }

    async fn poll_until_done(&self, operation_url: &str) -> Result<Vec<String>, ExtractError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let resp = self
                .client
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExtractError::Service(format!(
                    "poll failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let operation: AnalyzeOperation = resp
                .json()
                .await
                .map_err(|e| ExtractError::Service(format!("malformed poll response: {}", e)))?;

            match operation.into_outcome() {
                Some(outcome) => return outcome,
                None => tracing::trace!("analysis still running"),
            }
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for DocumentIntelligenceClient {
    async fn analyze(&self, document_url: &str) -> Result<Vec<String>, ExtractError> {
        let work = async {
            let operation_url = self.begin_analyze(document_url).await?;
            self.poll_until_done(&operation_url).await
        };
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), work)
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout_secs))?
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ServiceErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl AnalyzeOperation {
    /// `None` while the operation is still in progress.
    fn into_outcome(self) -> Option<Result<Vec<String>, ExtractError>> {
        match self.status.as_str() {
            "succeeded" => Some(Ok(self
                .analyze_result
                .map(|r| r.paragraphs.into_iter().map(|p| p.content).collect())
                .unwrap_or_default())),
            "failed" => {
                let message = self
                    .error
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "analysis failed".to_string());
                Some(Err(ExtractError::Service(message)))
            }
            "notStarted" | "running" => None,
            "canceled" => Some(Err(ExtractError::Service(
                "analysis was canceled".to_string(),
            ))),
            other => Some(Err(ExtractError::Service(format!(
                "unexpected analysis status '{}'",
                other
            )))),
        }
    }
}
