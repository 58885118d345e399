//! Core data types that flow between the assistant's components.
//!
//! An upload produces an [`UploadedResource`]; the grant issuer turns its
//! storage key into an [`AccessGrant`]; the extraction adapter consumes the
//! grant and yields an [`ExtractedDocument`]; conversations are sequences of
//! [`ConversationTurn`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body text used when the extraction service reported no paragraphs.
pub const NO_CONTENT_SENTINEL: &str = "No content found";

/// A file that has been written to the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedResource {
    pub id: Uuid,
    pub original_name: String,
    pub storage_key: String,
}

impl UploadedResource {
    /// Derive a new resource for `original_name`. The storage key is prefixed
    /// with a fresh UUID, so repeated uploads of the same name never collide.
    pub fn new(original_name: &str) -> Self {
        let id = Uuid::new_v4();
        let storage_key = format!("{}_{}", id, sanitize_name(original_name));
        Self {
            id,
            original_name: original_name.to_string(),
            storage_key,
        }
    }
}

/// Replace path separators and control characters so the original name can
/// never address a different blob path.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Permission requested for an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    /// Azure SAS permission letter.
    pub fn sas_letter(self) -> &'static str {
        match self {
            Permission::Read => "r",
            Permission::Write => "w",
            Permission::Delete => "d",
        }
    }
}

/// A short-lived, read-only handle on one stored resource.
///
/// Deliberately not `Clone`: the extraction adapter takes it by value, so a
/// grant is consumed exactly once.
pub struct AccessGrant {
    resource_ref: String,
    url: String,
    permission: Permission,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessGrant {
    /// Only the grant issuer constructs grants; it enforces `Read` and
    /// `expires_at > issued_at`.
    pub(crate) fn new(
        resource_ref: String,
        url: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_ref,
            url,
            permission: Permission::Read,
            issued_at,
            expires_at,
        }
    }

    pub fn resource_ref(&self) -> &str {
        &self.resource_ref
    }

    /// The signed URL. Treat as a secret.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("resource_ref", &self.resource_ref)
            .field("url", &"<redacted>")
            .field("permission", &self.permission)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Plain-text body produced by the extraction adapter.
///
/// Callers must branch on [`is_empty`](Self::is_empty): an empty document
/// carries [`NO_CONTENT_SENTINEL`] as its body, which is not grounding material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub source_resource_ref: String,
    pub body_text: String,
    pub is_empty: bool,
}

impl ExtractedDocument {
    /// Join paragraphs in the order given with a single space.
    pub fn from_paragraphs(source_resource_ref: &str, paragraphs: &[String]) -> Self {
        if paragraphs.is_empty() {
            return Self {
                source_resource_ref: source_resource_ref.to_string(),
                body_text: NO_CONTENT_SENTINEL.to_string(),
                is_empty: true,
            };
        }
        Self {
            source_resource_ref: source_resource_ref.to_string(),
            body_text: paragraphs.join(" "),
            is_empty: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_storage_keys_unique_for_same_name() {
        let a = UploadedResource::new("report.pdf");
        let b = UploadedResource::new("report.pdf");
        assert_ne!(a.storage_key, b.storage_key);
        assert!(a.storage_key.ends_with("_report.pdf"));
        assert_eq!(a.original_name, "report.pdf");
    }

    #[test]
    fn test_storage_key_strips_path_separators() {
        let r = UploadedResource::new("../secret/plan.docx");
        let suffix = r.storage_key.split_once('_').unwrap().1;
        assert_eq!(suffix, ".._secret_plan.docx");
    }

    #[test]
    fn test_storage_key_for_blank_name() {
        let r = UploadedResource::new("   ");
        assert!(r.storage_key.ends_with("_upload"));
    }

    #[test]
    fn test_extracted_document_joins_in_order() {
        let doc = ExtractedDocument::from_paragraphs(
            "k",
            &["Budget: $500k.".to_string(), "No compliance info.".to_string()],
        );
        assert!(!doc.is_empty);
        assert_eq!(doc.body_text, "Budget: $500k. No compliance info.");
    }

    #[test]
    fn test_extracted_document_empty_uses_sentinel() {
        let doc = ExtractedDocument::from_paragraphs("k", &[]);
        assert!(doc.is_empty);
        assert_eq!(doc.body_text, NO_CONTENT_SENTINEL);
    }

    #[test]
    fn test_grant_expiry_and_debug_redaction() {
        let issued = Utc::now();
        let grant = AccessGrant::new(
            "k".into(),
            "https://acct.blob.core.windows.net/c/k?sig=SECRET".into(),
            issued,
            issued + Duration::minutes(10),
        );
        assert!(!grant.is_expired(issued));
        assert!(grant.is_expired(issued + Duration::minutes(10)));
        assert_eq!(grant.permission(), Permission::Read);
        assert!(!format!("{:?}", grant).contains("SECRET"));
    }

    #[test]
    fn test_role_wire_format() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(turn.role(), Role::Assistant);
        assert_eq!(
            serde_json::to_string(&ConversationTurn::user("q")).unwrap(),
            r#"{"role":"user","content":"q"}"#
        );
    }
}
