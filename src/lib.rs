//! # Docent
//!
//! A document-grounded conversational assistant.
//!
//! Docent answers questions either against a pre-indexed corpus (Azure
//! Cognitive Search, consulted server-side by Azure OpenAI) or against a file
//! the caller just uploaded (stored in Azure Blob Storage, read by Azure AI
//! Document Intelligence through a short-lived read-only grant), and can
//! continue the conversation with the caller's running history.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   upload ──────▶│ ObjectStore  │──▶│ GrantIssuer  │──▶│  Extraction  │──┐
//!                 │ (Blob)       │   │ (SAS)        │   │ (Doc Intel)  │  │
//!                 └──────────────┘   └──────────────┘   └──────────────┘  │
//!                                                                          ▼
//!   query ───────▶ SearchBinding ────────────────────────────────▶ Prompt Composer
//!                                                                          │
//!   history ─────▶ ConversationSession ───────────────────────────────────┤
//!                                                                          ▼
//!                                                               CompletionService
//!                                                                 (Azure OpenAI)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`models`] | Core data types |
//! | [`storage`] | Object store trait and Azure Blob implementation |
//! | [`grant`] | Read-only, time-bounded access grants |
//! | [`extraction`] | Text extraction adapter |
//! | [`retrieval`] | Search index binding |
//! | [`prompt`] | Prompt templates and composition |
//! | [`session`] | Conversation history |
//! | [`completion`] | Completion gateway |
//! | [`assistant`] | Orchestration context |
//! | [`server`] | HTTP API |

pub mod assistant;
pub mod completion;
pub mod config;
pub mod extraction;
pub mod grant;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod storage;
