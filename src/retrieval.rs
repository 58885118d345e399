//! Retrieval binding for the indexed-corpus path.
//!
//! Nothing is searched here. The binding tells the completion service which
//! Azure Cognitive Search index to consult server-side, and refuses to exist
//! unless endpoint, key, and index name are all present.

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{Secrets, SearchConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("search binding is missing {0}")]
    Missing(&'static str),
}

#[derive(Clone, PartialEq, Eq)]
pub struct SearchBinding {
    endpoint: String,
    key: String,
    index: String,
}

impl SearchBinding {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        index: impl Into<String>,
    ) -> Result<Self, BindingError> {
        let endpoint = endpoint.into();
        let key = key.into();
        let index = index.into();
        if endpoint.trim().is_empty() {
            return Err(BindingError::Missing("endpoint"));
        }
        if key.trim().is_empty() {
            return Err(BindingError::Missing("key"));
        }
        if index.trim().is_empty() {
            return Err(BindingError::Missing("index name"));
        }
        Ok(Self {
            endpoint,
            key,
            index,
        })
    }

    pub fn from_config(config: &SearchConfig, secrets: &Secrets) -> Result<Self, BindingError> {
        Self::new(&config.endpoint, &secrets.search_key, &config.index)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// The `dataSources` extension body merged into the completion request.
    pub fn data_sources(&self) -> Value {
        json!({
            "dataSources": [
                {
                    "type": "AzureCognitiveSearch",
                    "parameters": {
                        "endpoint": self.endpoint,
                        "key": self.key,
                        "indexName": self.index,
                    }
                }
            ]
        })
    }
}

impl std::fmt::Debug for SearchBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchBinding")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("index", &self.index)
            .finish()
    }
}
