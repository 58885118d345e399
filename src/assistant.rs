//! The assistant: one dependency-injection context wiring the four external
//! collaborators to the prompt composer.
//!
//! ```text
//!  chat ───────────────────────────────► compose_retrieval ─┐
//!                                        + SearchBinding    │
//!  upload_and_ask ─► upload ─► grant ─► extract ─►          ├─► CompletionService
//!                                        compose_grounded   │
//!  followup ─────────────────────────► compose_followup ────┘
//! ```
//!
//! The context is built once per process and shared behind an `Arc`; it holds
//! no mutable state, so requests never coordinate with each other.

use chrono::Duration;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

use crate::completion::{
    user_facing, AzureOpenAiClient, CompletionError, CompletionRequest, CompletionService,
};
use crate::config::{Config, Secrets};
use crate::extraction::{extract_document, DocumentAnalyzer, DocumentIntelligenceClient, ExtractError};
use crate::grant::{GrantError, GrantIssuer};
use crate::models::{ExtractedDocument, Permission};
use crate::prompt::{self, PromptError};
use crate::retrieval::SearchBinding;
use crate::session::ConversationSession;
use crate::storage::{upload_resource, AzureBlobStore, ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("{0}")]
    Validation(String),
    #[error("no text extracted from document")]
    EmptyDocument,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Grant(#[from] GrantError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl AssistError {
    /// Machine-readable error code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AssistError::Validation(_) => "bad_request",
            AssistError::EmptyDocument => "empty_document",
            AssistError::Storage(_) => "storage_error",
            AssistError::Grant(GrantError::NotFound(_)) => "resource_not_found",
            AssistError::Grant(_) => "grant_error",
            AssistError::Extraction(ExtractError::GrantExpired { .. }) => "grant_expired",
            AssistError::Extraction(ExtractError::Timeout(_)) => "extraction_timeout",
            AssistError::Extraction(_) => "extraction_error",
            AssistError::Completion(_) => "completion_error",
        }
    }

    /// True for problems with the caller's input rather than an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AssistError::Validation(_))
    }
}

impl From<PromptError> for AssistError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::EmptyDocument => AssistError::EmptyDocument,
        }
    }
}

/// A file received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub grant_ttl: Duration,
    pub max_history_turns: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            grant_ttl: Duration::minutes(10),
            max_history_turns: 40,
        }
    }
}

impl AssistantSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            grant_ttl: Duration::try_seconds(config.storage.grant_ttl_secs).unwrap_or(Duration::MAX),
            max_history_turns: config.conversation.max_history_turns,
        }
    }
}

pub struct Assistant {
    store: Arc<dyn ObjectStore>,
    grants: GrantIssuer,
    analyzer: Arc<dyn DocumentAnalyzer>,
    completion: Arc<dyn CompletionService>,
    binding: SearchBinding,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        completion: Arc<dyn CompletionService>,
        binding: SearchBinding,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            grants: GrantIssuer::new(store.clone()),
            store,
            analyzer,
            completion,
            binding,
            settings,
        }
    }

    /// Build the production clients from validated configuration.
    pub fn from_config(config: &Config, secrets: &Secrets) -> anyhow::Result<Self> {
        let store = AzureBlobStore::new(&config.storage, secrets)?;
        let analyzer = DocumentIntelligenceClient::new(&config.extraction, secrets);
        let completion = AzureOpenAiClient::new(&config.completion, secrets)?;
        let binding = SearchBinding::from_config(&config.search, secrets)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(analyzer),
            Arc::new(completion),
            binding,
            AssistantSettings::from_config(config),
        ))
    }

    /// Answer `message` against the bound search index.
    ///
    /// Never fails: any error is turned into an explanatory answer string.
    pub async fn chat(&self, message: &str) -> String {
        let span = tracing::info_span!("chat", index = self.binding.index());
        async move {
            if message.trim().is_empty() {
                return "Please enter a question about the indexed documents.".to_string();
            }
            let request = CompletionRequest::new(prompt::compose_retrieval(message))
                .with_binding(self.binding.clone());
            match self.completion.complete(&request).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::error!(error = %e, "indexed chat failed");
                    user_facing(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Upload, grant, and extract. Zero paragraphs is returned as an empty
    /// document, not an error.
    pub async fn ingest(&self, file: UploadedFile) -> Result<ExtractedDocument, AssistError> {
        if file.bytes.is_empty() {
            return Err(AssistError::Validation("uploaded file is empty".to_string()));
        }
        let resource =
            upload_resource(self.store.as_ref(), &file.name, file.bytes, &file.content_type)
                .await?;
        let grant = self
            .grants
            .issue(&resource.storage_key, Permission::Read, self.settings.grant_ttl)
            .await?;
        Ok(extract_document(self.analyzer.as_ref(), grant).await?)
    }

    /// Extract a document's text. An empty extraction is reported as
    /// [`AssistError::EmptyDocument`].
    pub async fn extract_text(&self, file: UploadedFile) -> Result<ExtractedDocument, AssistError> {
        let span = tracing::info_span!("extract_text", file = %file.name);
        async move {
            let document = self.ingest(file).await?;
            if document.is_empty {
                return Err(AssistError::EmptyDocument);
            }
            Ok(document)
        }
        .instrument(span)
        .await
    }

    /// Answer one question about a freshly uploaded file.
    pub async fn upload_and_ask(
        &self,
        file: UploadedFile,
        question: &str,
    ) -> Result<String, AssistError> {
        if question.trim().is_empty() {
            return Err(AssistError::Validation("question must not be empty".to_string()));
        }
        let span = tracing::info_span!("upload_and_ask", file = %file.name);
        async move {
            let document = self.ingest(file).await?;
            let turns = prompt::compose_grounded(&document, question)?;
            let answer = self.completion.complete(&CompletionRequest::new(turns)).await?;
            Ok(answer)
        }
        .instrument(span)
        .await
    }

    /// Continue a conversation about `document`. `history` is replayed in order
    /// after the instruction and document turns, bounded by the history window.
    pub async fn followup(
        &self,
        document: &str,
        history: &ConversationSession,
    ) -> Result<String, AssistError> {
        if document.trim().is_empty() {
            return Err(AssistError::Validation("doc must not be empty".to_string()));
        }
        let span = tracing::info_span!("followup", history = history.len());
        async move {
            let turns =
                prompt::compose_followup(document, history, self.settings.max_history_turns);
            let answer = self.completion.complete(&CompletionRequest::new(turns)).await?;
            Ok(answer)
        }
        .instrument(span)
        .await
    }
}
