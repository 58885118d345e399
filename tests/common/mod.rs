//! In-memory stand-ins for the external services, shared by the integration
//! tests.
//!
//! `MemStore` keeps blobs in a map and signs `mem://` URLs; `MemAnalyzer`
//! reads the blob behind such a URL and treats blank-line-separated blocks as
//! paragraphs; `RecordingCompletion` answers with a caller-supplied function
//! and keeps every request it saw.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docent::assistant::{Assistant, AssistantSettings};
use docent::completion::{CompletionError, CompletionRequest, CompletionService};
use docent::extraction::{DocumentAnalyzer, ExtractError};
use docent::retrieval::SearchBinding;
use docent::storage::{ObjectStore, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ─── Object store ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn keys(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        self.blobs.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    fn sign_read_url(&self, key: &str, expires_at: DateTime<Utc>) -> Result<String, StorageError> {
        Ok(format!("mem://{}?se={}&sp=r", key, expires_at.timestamp()))
    }
}

// ─── Extraction ─────────────────────────────────────────────────────

pub struct MemAnalyzer {
    store: Arc<MemStore>,
    pub seen_urls: Mutex<Vec<String>>,
}

impl MemAnalyzer {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self {
            store,
            seen_urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for MemAnalyzer {
    async fn analyze(&self, document_url: &str) -> Result<Vec<String>, ExtractError> {
        self.seen_urls.lock().unwrap().push(document_url.to_string());
        let key = document_url
            .strip_prefix("mem://")
            .and_then(|rest| rest.split('?').next())
            .ok_or_else(|| ExtractError::Service("InvalidRequest: bad url".to_string()))?;
        let bytes = self
            .store
            .get(key)
            .ok_or_else(|| ExtractError::Service("InvalidContent: blob missing".to_string()))?;
        let text = String::from_utf8_lossy(&bytes).to_string();
        Ok(text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Always fails, as a service outage would.
pub struct DownAnalyzer;

#[async_trait]
impl DocumentAnalyzer for DownAnalyzer {
    async fn analyze(&self, _document_url: &str) -> Result<Vec<String>, ExtractError> {
        Err(ExtractError::Service("ServiceUnavailable: try later".to_string()))
    }
}

// ─── Completion ─────────────────────────────────────────────────────

pub type Responder = fn(&CompletionRequest) -> Result<String, CompletionError>;

pub struct RecordingCompletion {
    responder: Responder,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingCompletion {
    pub fn new(responder: Responder) -> Self {
        Self {
            responder,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no completion request recorded")
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

/// Answers budget and compliance questions from whatever document text the
/// prompt contains, the way a well-behaved model following the instructions
/// would.
pub fn document_reader(request: &CompletionRequest) -> Result<String, CompletionError> {
    let prompt: String = request
        .turns
        .iter()
        .map(|t| t.content())
        .collect::<Vec<_>>()
        .join("\n");
    let question = asked(request).to_lowercase();

    if question.contains("compliance") && !prompt.contains("compliance requirement:") {
        return Ok(
            "This document does not contain information on Compliance requirements.".to_string(),
        );
    }
    if question.contains("budget") {
        if let Some(pos) = prompt.find("Budget: ") {
            let figure: String = prompt[pos + "Budget: ".len()..]
                .chars()
                .take_while(|c| !c.is_whitespace())
                .collect();
            return Ok(format!("The budget is {}", figure.trim_end_matches('.')));
        }
    }
    Ok("I could not find that in the provided material.".to_string())
}

/// The caller's own words inside the last turn, without the instruction text
/// the composer wraps around them.
pub fn asked(request: &CompletionRequest) -> String {
    let last = request.turns.last().map(|t| t.content()).unwrap_or_default();
    for marker in ["They asked:\n", "User query:\n"] {
        if let Some(pos) = last.find(marker) {
            let rest = &last[pos + marker.len()..];
            return rest.split("\n\n").next().unwrap_or(rest).to_string();
        }
    }
    last.to_string()
}

pub fn quota_exceeded(_request: &CompletionRequest) -> Result<String, CompletionError> {
    Err(CompletionError::Http {
        status: 429,
        body: "Requests to the ChatCompletions_Create Operation have exceeded rate limit".into(),
    })
}

pub fn no_matching_documents(_request: &CompletionRequest) -> Result<String, CompletionError> {
    Ok("The requested information is not found in the retrieved data.".to_string())
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<MemStore>,
    pub completion: Arc<RecordingCompletion>,
    pub assistant: Arc<Assistant>,
}

pub fn harness(responder: Responder) -> Harness {
    harness_with(responder, AssistantSettings::default(), None)
}

pub fn harness_with(
    responder: Responder,
    settings: AssistantSettings,
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
) -> Harness {
    let store = Arc::new(MemStore::default());
    let analyzer: Arc<dyn DocumentAnalyzer> = match analyzer {
        Some(analyzer) => analyzer,
        None => Arc::new(MemAnalyzer::new(store.clone())),
    };
    let completion = Arc::new(RecordingCompletion::new(responder));
    let binding = SearchBinding::new("https://acme.search.windows.net", "search-key", "proposals")
        .unwrap();
    let assistant = Arc::new(Assistant::new(
        store.clone(),
        analyzer,
        completion.clone(),
        binding,
        settings,
    ));
    Harness {
        store,
        completion,
        assistant,
    }
}
