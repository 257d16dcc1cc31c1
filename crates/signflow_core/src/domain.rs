//! crates/signflow_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format
//! beyond the serde derives used at the API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a document moving through the signature workflow.
///
/// `Completed` is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Sent,
    InProgress,
    Completed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::Sent => "SENT",
            DocumentStatus::InProgress => "IN_PROGRESS",
            DocumentStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(DocumentStatus::Draft),
            "SENT" => Some(DocumentStatus::Sent),
            "IN_PROGRESS" => Some(DocumentStatus::InProgress),
            "COMPLETED" => Some(DocumentStatus::Completed),
            _ => None,
        }
    }
}

/// A document uploaded by a sender, tracked through signing.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub original_file_name: String,
    pub storage_key: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The kind of fillable field placed on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    Signature,
    Date,
    Text,
    Initial,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Signature => "SIGNATURE",
            FieldKind::Date => "DATE",
            FieldKind::Text => "TEXT",
            FieldKind::Initial => "INITIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNATURE" => Some(FieldKind::Signature),
            "DATE" => Some(FieldKind::Date),
            "TEXT" => Some(FieldKind::Text),
            "INITIAL" => Some(FieldKind::Initial),
            _ => None,
        }
    }
}

/// Where a field sits on the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldPlacement {
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A fillable field attached to a document while it is still a draft.
#[derive(Debug, Clone)]
pub struct DocumentField {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: FieldKind,
    pub label: String,
    pub required: bool,
    pub placement: FieldPlacement,
}

/// The caller-supplied specification of one field, used when replacing a
/// document's field set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub label: String,
    pub required: bool,
    pub placement: FieldPlacement,
}

/// Lifecycle of a single signature slot. Pending transitions to Signed
/// exactly once; a signed signature is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    Pending,
    Signed,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Pending => "PENDING",
            SignatureStatus::Signed => "SIGNED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SignatureStatus::Pending),
            "SIGNED" => Some(SignatureStatus::Signed),
            _ => None,
        }
    }
}

/// One signer's slot on a document, created at send time.
///
/// Email and name are denormalized from the invite so the record stays
/// meaningful even if the user account changes later.
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_id: Uuid,
    pub signer_email: String,
    pub signer_name: String,
    pub status: SignatureStatus,
    pub signed_at: Option<DateTime<Utc>>,
    pub payload: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One signer invited through `send_document`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignerInvite {
    pub email: String,
    pub name: String,
}

/// Audit metadata captured alongside a signing event. Recorded only,
/// never used for authorization.
#[derive(Debug, Clone, Default)]
pub struct SigningAudit {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Sender,
    Signer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Sender => "SENDER",
            Role::Signer => "SIGNER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(Role::Admin),
            "SENDER" => Some(Role::Sender),
            "SIGNER" => Some(Role::Signer),
            _ => None,
        }
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub hashed_password: String,
}

/// The authenticated caller identity the engine authorizes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// AI-derived analysis of a document. A convenience artifact only; it never
/// influences workflow state.
#[derive(Debug, Clone, Serialize)]
pub struct AiAnalysis {
    pub id: Uuid,
    pub document_id: Uuid,
    pub summary: String,
    pub risks: Vec<String>,
    pub compliance: Vec<String>,
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Structured output of the AI analysis call, before persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentAnalysis {
    pub summary: String,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub compliance: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// One AI-suggested field placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSuggestion {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub label: String,
    pub required: bool,
    #[serde(default)]
    pub suggested_position: Option<String>,
}

/// A reusable document blueprint: a named file plus a saved field layout.
/// Private templates are visible to their creator only; public templates are
/// visible to every authenticated user.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub fields: Vec<FieldSpec>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A new template as supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub fields: Vec<FieldSpec>,
    pub is_public: bool,
}

/// Reference to an uploaded blob, as returned by the storage gateway.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
}

/// A new document as supplied by the upload handler.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub original_file_name: String,
    pub storage_key: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// Outbound events published by the workflow engine after a successful
/// transition. Delivery is best-effort; a lost event never rolls back the
/// transition that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentEvent {
    DocumentSent {
        document_id: Uuid,
        signature_ids: Vec<Uuid>,
    },
    DocumentSigned {
        document_id: Uuid,
        signature_id: Uuid,
        completed: bool,
    },
}

impl DocumentEvent {
    pub fn document_id(&self) -> Uuid {
        match self {
            DocumentEvent::DocumentSent { document_id, .. } => *document_id,
            DocumentEvent::DocumentSigned { document_id, .. } => *document_id,
        }
    }
}
