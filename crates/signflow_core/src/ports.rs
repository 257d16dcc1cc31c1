//! crates/signflow_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases, object
//! storage, or AI providers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Actor, AiAnalysis, Document, DocumentAnalysis, DocumentEvent, DocumentField, FieldSpec,
    FieldSuggestion, NewDocument, NewTemplate, Signature, SigningAudit, StoredFile, Template,
    User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by all port operations.
///
/// `NotFound` covers both a missing entity and an entity in the wrong state
/// for the requested transition (a signature that is already signed has no
/// pending row to act on). `Conflict` is a concurrent-mutation precondition
/// failure and is retryable. `Dependency` is a failure of an external
/// collaborator (storage, AI provider).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Access denied")]
    Forbidden,
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting update: {0}")]
    Conflict(String),
    #[error("Dependency failure: {0}")]
    Dependency(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Atomic persistence operations consumed by the workflow engine.
///
/// Every mutating operation is expected to be atomic on its own; the engine
/// never holds a lock across calls. The two guarded updates
/// (`update_signature_signed` and `complete_if_fully_signed`) carry the
/// preconditions that make concurrent signing race-safe.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, sender_id: Uuid, new: NewDocument) -> PortResult<Document>;

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document>;

    async fn list_all_documents(&self) -> PortResult<Vec<Document>>;

    async fn list_documents_by_sender(&self, sender_id: Uuid) -> PortResult<Vec<Document>>;

    /// Atomically discards the document's current field set and installs
    /// `fields`. All-or-nothing: on failure the old set remains intact and a
    /// reader never observes a mix of old and new fields.
    async fn replace_fields(
        &self,
        document_id: Uuid,
        fields: Vec<FieldSpec>,
    ) -> PortResult<Vec<DocumentField>>;

    async fn fields_for_document(&self, document_id: Uuid) -> PortResult<Vec<DocumentField>>;

    /// Creates a Pending signature slot. Guarded on document status in the
    /// same atomic operation as the insert: a Completed document accepts no
    /// new signature (`Conflict`), even when the caller's earlier status
    /// read predates a concurrent completion.
    async fn create_signature(
        &self,
        document_id: Uuid,
        signer: &User,
        signer_email: &str,
        signer_name: &str,
    ) -> PortResult<Signature>;

    async fn signatures_for_document(&self, document_id: Uuid) -> PortResult<Vec<Signature>>;

    /// Transitions one signature Pending → Signed, storing the payload and
    /// audit fields. Guarded by an optimistic precondition on the current
    /// status: if the row is no longer Pending the update is rejected with
    /// `Conflict`, so exactly one of two concurrent attempts wins.
    async fn update_signature_signed(
        &self,
        signature_id: Uuid,
        payload: &str,
        audit: &SigningAudit,
        signed_at: DateTime<Utc>,
    ) -> PortResult<Signature>;

    /// Draft → Sent, stamping `sent_at`.
    async fn mark_sent(&self, document_id: Uuid, sent_at: DateTime<Utc>) -> PortResult<()>;

    /// Sent → InProgress. A no-op in any other state, so a straggler can
    /// never demote a completed document.
    async fn mark_in_progress(&self, document_id: Uuid) -> PortResult<()>;

    /// Atomic check-then-set: transitions the document to Completed iff
    /// every signature is Signed and the document is not already Completed.
    /// Returns whether *this call* performed the transition, which is what
    /// makes completion exactly-once under concurrent signers.
    async fn complete_if_fully_signed(
        &self,
        document_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    async fn save_analysis(
        &self,
        document_id: Uuid,
        analysis: &DocumentAnalysis,
    ) -> PortResult<AiAnalysis>;

    async fn analysis_for_document(&self, document_id: Uuid) -> PortResult<Option<AiAnalysis>>;
}

/// Persistence for reusable document templates. Listing is
/// visibility-filtered: a viewer sees their own templates plus any marked
/// public, newest first.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn create_template(&self, creator_id: Uuid, new: NewTemplate) -> PortResult<Template>;

    async fn list_templates_visible_to(&self, viewer_id: Uuid) -> PortResult<Vec<Template>>;
}

/// Resolves an invited signer to a user account, provisioning a placeholder
/// account (signer role, no password) when the email is unknown. Whoever
/// later authenticates with that email gains access to the signing flow.
#[async_trait]
pub trait SignerDirectory: Send + Sync {
    async fn resolve_or_provision(&self, email: &str, name: &str) -> PortResult<User>;
}

/// Account and session operations used by the authentication layer.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Creates an account, or claims a passwordless placeholder account that
    /// was provisioned for an invited signer. Fails with `Conflict` if the
    /// email already belongs to a registered account.
    async fn create_user_with_email(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Actor>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

//=========================================================================================
// External Collaborator Ports
//=========================================================================================

/// Opaque binary blob storage. The engine only ever stores the returned
/// reference; it never interprets blob contents.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn put(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> PortResult<StoredFile>;

    /// Issues a time-limited download URL for a stored blob.
    async fn signed_url(&self, key: &str, ttl_secs: u64) -> PortResult<String>;

    async fn delete(&self, key: &str) -> PortResult<()>;
}

/// Free-text AI analysis and generation. Best-effort: implementations return
/// a degraded-but-valid structured result when the model's output fails to
/// parse, and `Dependency` only when the call itself produced nothing.
#[async_trait]
pub trait ContractAnalysisService: Send + Sync {
    async fn analyze(&self, document_text: &str) -> PortResult<DocumentAnalysis>;

    async fn detect_fields(&self, document_text: &str) -> PortResult<Vec<FieldSuggestion>>;

    async fn generate_contract(&self, prompt: &str, contract_type: &str) -> PortResult<String>;
}

/// Outbound event channel for workflow transitions. Fire-and-forget: a
/// publish failure is the publisher's problem, never the workflow's.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DocumentEvent);
}
