//! Prompt composer.
//!
//! Builds the turn sequences sent to the completion service. Three shapes:
//!
//! | Shape | Turns |
//! |-------|-------|
//! | retrieval | system (search-grounded) · user (instruction block + query) |
//! | grounded | system (document assistant) · user (document + question + policy) |
//! | follow-up | system (instruction block) · system (document) · history... |
//!
//! Instruction blocks are rendered only from the constant tables in this
//! module; queries, documents and history are placed in their own sections
//! and never spliced into the section list.
//!
//! The composer does not decide whether a section is missing. It tells the
//! completion service to answer each missing section with
//! [`missing_section_sentence`].

use thiserror::Error;

use crate::models::{ConversationTurn, ExtractedDocument};
use crate::session::ConversationSession;

/// Bumped whenever any template text below changes.
pub const TEMPLATE_VERSION: &str = "v1";

/// Placeholder sentence; `[Missing Section]` is replaced by the section label.
pub const MISSING_SECTION_TEMPLATE: &str =
    "This document does not contain information on [Missing Section].";

const MISSING_SECTION_PLACEHOLDER: &str = "[Missing Section]";

pub const RETRIEVAL_SYSTEM: &str = "You answer using Azure Cognitive Search.";
pub const GROUNDED_SYSTEM: &str = "You are an AI document assistant.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("document has no extracted content to ground an answer on")]
    EmptyDocument,
}

/// A required response section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    TechnologySpecs,
    ProblemAddressed,
    DeploymentScale,
    CurrentSystems,
    ActionItems,
    RequiredIntegrations,
    BomJustification,
    ComplianceRequirements,
    ConclusiveSummary,
}

impl Section {
    pub fn label(self) -> &'static str {
        match self {
            Section::TechnologySpecs => "Technology Specs",
            Section::ProblemAddressed => "Problem being addressed",
            Section::DeploymentScale => "User numbers and deployment scale",
            Section::CurrentSystems => "Current systems and pain points",
            Section::ActionItems => "Action items for proposal team",
            Section::RequiredIntegrations => "Required integrations",
            Section::BomJustification => "BOM justification",
            Section::ComplianceRequirements => "Compliance requirements",
            Section::ConclusiveSummary => "Conclusive summary",
        }
    }

    fn guidance(self) -> Option<&'static str> {
        match self {
            Section::BomJustification => {
                Some("if suggesting BOM items, explain why they match the requirements")
            }
            _ => None,
        }
    }
}

/// Sections every single-shot retrieval answer must address.
pub const SINGLE_SHOT_SECTIONS: &[Section] = &[
    Section::TechnologySpecs,
    Section::ProblemAddressed,
    Section::DeploymentScale,
    Section::CurrentSystems,
    Section::ActionItems,
    Section::RequiredIntegrations,
    Section::BomJustification,
];

/// Sections every follow-up answer must address.
pub const FOLLOW_UP_SECTIONS: &[Section] = &[
    Section::TechnologySpecs,
    Section::ProblemAddressed,
    Section::DeploymentScale,
    Section::CurrentSystems,
    Section::ActionItems,
    Section::RequiredIntegrations,
    Section::BomJustification,
    Section::ComplianceRequirements,
    Section::ConclusiveSummary,
];

pub fn missing_section_sentence(label: &str) -> String {
    MISSING_SECTION_TEMPLATE.replace(MISSING_SECTION_PLACEHOLDER, label)
}

fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| match s.guidance() {
            Some(g) => format!("- {} ({})", s.label(), g),
            None => format!("- {}", s.label()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn missing_section_policy() -> String {
    format!(
        "If any section is missing, respond with: \"{}\"",
        MISSING_SECTION_TEMPLATE
    )
}

/// Instruction block for the single-shot retrieval shape.
pub fn retrieval_instructions() -> String {
    format!(
        "You are an AI assistant helping users engage with business documents.\n\
         Always provide specific, relevant information.\n\
         First, give a general summary (include scope and purpose). Then extract, focusing on these sections:\n\
         {}\n\
         {}\n\
         Respond clearly and conversationally.",
        render_sections(SINGLE_SHOT_SECTIONS),
        missing_section_policy()
    )
}

/// Instruction block for the follow-up shape.
pub fn follow_up_instructions() -> String {
    format!(
        "You are an AI assistant analyzing uploaded business documents.\n\
         First, summarize the key content (include the problem it is trying to solve). Then extract:\n\
         {}\n\
         {}\n\
         Respond clearly and conversationally.",
        render_sections(FOLLOW_UP_SECTIONS),
        missing_section_policy()
    )
}

/// `[system, user]` for a question against the bound search index.
pub fn compose_retrieval(query: &str) -> Vec<ConversationTurn> {
    let user = format!("{}\n\nUser query:\n{}", retrieval_instructions(), query);
    vec![
        ConversationTurn::system(RETRIEVAL_SYSTEM),
        ConversationTurn::user(user),
    ]
}

/// `[system, user]` for a one-off question about a freshly extracted document.
///
/// Refuses empty documents so the no-content sentinel never becomes grounding.
pub fn compose_grounded(
    document: &ExtractedDocument,
    question: &str,
) -> Result<Vec<ConversationTurn>, PromptError> {
    if document.is_empty {
        return Err(PromptError::EmptyDocument);
    }
    let labels = FOLLOW_UP_SECTIONS
        .iter()
        .map(|s| s.label())
        .collect::<Vec<_>>()
        .join(", ");
    let user = format!(
        "The user uploaded this document:\n{}\n\n\
         They asked:\n{}\n\n\
         Please answer using only the document's contents. \
         If the question concerns one of these sections ({}) and the document does not cover it, \
         respond with: \"{}\"",
        document.body_text, question, labels, MISSING_SECTION_TEMPLATE
    );
    Ok(vec![
        ConversationTurn::system(GROUNDED_SYSTEM),
        ConversationTurn::user(user),
    ])
}

/// `[system instructions, system document] ++ history` for a follow-up call.
///
/// `window` bounds how many of the most recent history turns are replayed
/// (`0` for all). History order is never changed.
pub fn compose_followup(
    document_body: &str,
    session: &ConversationSession,
    window: usize,
) -> Vec<ConversationTurn> {
    let history = session.replay(window);
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(ConversationTurn::system(follow_up_instructions()));
    turns.push(ConversationTurn::system(document_body));
    turns.extend(history);
    turns
}
