//! crates/signflow_core/src/workflow.rs
//!
//! The signature workflow engine: the rules governing document and signature
//! lifecycle transitions, completion detection across multiple signers, and
//! authorization of each operation by caller role.
//!
//! The engine owns no state of its own. Every operation reads and writes
//! through the injected `DocumentRepository`, whose guarded updates provide
//! the atomicity that keeps concurrent signers race-safe; the engine never
//! holds a lock across a port call.
//!
//! Document state machine:
//!
//! ```text
//! DRAFT --send--> SENT --first sign (signers remain)--> IN_PROGRESS
//! SENT/IN_PROGRESS --last sign--> COMPLETED   (terminal)
//! ```

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Actor, AiAnalysis, Document, DocumentEvent, DocumentField, DocumentStatus, FieldSpec,
    NewDocument, Signature, SignatureStatus, SignerInvite, SigningAudit,
};
use crate::ports::{DocumentRepository, EventPublisher, PortError, PortResult, SignerDirectory};

/// A document together with its fields, signatures, and (if one exists) its
/// AI analysis, as returned by `get_document`.
#[derive(Debug, Clone)]
pub struct DocumentBundle {
    pub document: Document,
    pub fields: Vec<DocumentField>,
    pub signatures: Vec<Signature>,
    pub analysis: Option<AiAnalysis>,
}

/// Enforces the document/signature state machine. One instance is shared
/// across all requests; operations are invoked concurrently.
#[derive(Clone)]
pub struct WorkflowEngine {
    repo: Arc<dyn DocumentRepository>,
    signers: Arc<dyn SignerDirectory>,
    events: Arc<dyn EventPublisher>,
}

impl WorkflowEngine {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        signers: Arc<dyn SignerDirectory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repo,
            signers,
            events,
        }
    }

    /// Creates a new document in Draft, owned by `sender`.
    pub async fn create_document(&self, sender: Uuid, new: NewDocument) -> PortResult<Document> {
        if new.title.trim().is_empty() {
            return Err(PortError::Validation("title must not be empty".into()));
        }
        if new.storage_key.trim().is_empty() {
            return Err(PortError::Validation(
                "storage reference must not be empty".into(),
            ));
        }
        self.repo.create_document(sender, new).await
    }

    /// Atomically replaces the document's field set.
    ///
    /// Only the sender may edit fields, and only while the document is still
    /// a Draft; once sent, the field layout is frozen.
    pub async fn replace_fields(
        &self,
        document_id: Uuid,
        caller: Uuid,
        fields: Vec<FieldSpec>,
    ) -> PortResult<Vec<DocumentField>> {
        let document = self.repo.get_document(document_id).await?;
        if document.sender_id != caller {
            return Err(PortError::Forbidden);
        }
        if document.status != DocumentStatus::Draft {
            return Err(PortError::Conflict(
                "fields can only be edited while the document is a draft".into(),
            ));
        }
        self.repo.replace_fields(document_id, fields).await
    }

    /// Dispatches the document to its signers.
    ///
    /// Each invite is resolved to a user account (provisioning a placeholder
    /// signer account for unknown emails) and receives one Pending signature.
    /// A Draft document transitions to Sent. Re-sending an already-sent
    /// document appends signatures for the new signers only; inviting a user
    /// who already holds a signature on the document is rejected rather than
    /// silently deduplicated.
    pub async fn send_document(
        &self,
        document_id: Uuid,
        caller: &Actor,
        invites: Vec<SignerInvite>,
    ) -> PortResult<Vec<Signature>> {
        let document = self.repo.get_document(document_id).await?;
        if document.sender_id != caller.user_id && !caller.is_admin() {
            return Err(PortError::Forbidden);
        }
        if invites.is_empty() {
            return Err(PortError::Validation(
                "at least one signer is required".into(),
            ));
        }
        if document.status == DocumentStatus::Completed {
            return Err(PortError::Conflict(
                "document is already completed".into(),
            ));
        }

        // Normalize and reject duplicate emails within the request itself.
        let mut seen = Vec::with_capacity(invites.len());
        for invite in &invites {
            let email = invite.email.trim().to_ascii_lowercase();
            if email.is_empty() {
                return Err(PortError::Validation("signer email must not be empty".into()));
            }
            if seen.contains(&email) {
                return Err(PortError::Validation(format!(
                    "duplicate signer email: {}",
                    email
                )));
            }
            seen.push(email);
        }

        // Resolve every invite before creating anything, so an unknown
        // directory failure cannot leave a half-created signature set.
        let mut resolved = Vec::with_capacity(invites.len());
        for invite in &invites {
            let email = invite.email.trim().to_ascii_lowercase();
            let user = self.signers.resolve_or_provision(&email, &invite.name).await?;
            resolved.push((user, email, invite.name.clone()));
        }

        let existing = self.repo.signatures_for_document(document_id).await?;
        for (user, email, _) in &resolved {
            if existing.iter().any(|s| s.signer_id == user.id) {
                return Err(PortError::Conflict(format!(
                    "{} already has a signature on this document",
                    email
                )));
            }
        }

        let mut created = Vec::with_capacity(resolved.len());
        for (user, email, name) in &resolved {
            let signature = self
                .repo
                .create_signature(document_id, user, email, name)
                .await?;
            created.push(signature);
        }

        match document.status {
            DocumentStatus::Draft => {
                self.repo.mark_sent(document_id, Utc::now()).await?;
            }
            DocumentStatus::Sent | DocumentStatus::InProgress => {
                // Resend. If any earlier signature is already signed the
                // document must read as at least InProgress.
                if existing.iter().any(|s| s.status == SignatureStatus::Signed) {
                    self.repo.mark_in_progress(document_id).await?;
                }
            }
            DocumentStatus::Completed => unreachable!("rejected above"),
        }

        self.events
            .publish(DocumentEvent::DocumentSent {
                document_id,
                signature_ids: created.iter().map(|s| s.id).collect(),
            })
            .await;

        Ok(created)
    }

    /// Records the caller's signature on the document.
    ///
    /// Requires a Pending signature for (document, caller). The absence of
    /// one, whether because the caller was never invited or because they
    /// already signed, reads as NotFound. After the signature flips to
    /// Signed, the repository's atomic check-then-set decides whether this
    /// signing completed the document, exactly once even under concurrent
    /// signers.
    pub async fn sign_document(
        &self,
        document_id: Uuid,
        caller: Uuid,
        payload: &str,
        audit: SigningAudit,
    ) -> PortResult<Signature> {
        if payload.trim().is_empty() {
            return Err(PortError::Validation(
                "signature payload must not be empty".into(),
            ));
        }

        let signatures = self.repo.signatures_for_document(document_id).await?;
        let pending = signatures
            .iter()
            .find(|s| s.signer_id == caller && s.status == SignatureStatus::Pending)
            .ok_or_else(|| {
                PortError::NotFound("no pending signature for this document".into())
            })?;

        let now = Utc::now();
        let signed = self
            .repo
            .update_signature_signed(pending.id, payload, &audit, now)
            .await?;

        let completed = self.repo.complete_if_fully_signed(document_id, now).await?;
        if !completed {
            // Signers remain; a Sent document becomes InProgress. The
            // repository ignores this in any other state, so a straggler
            // racing the completing signer can never demote the document.
            self.repo.mark_in_progress(document_id).await?;
        }

        self.events
            .publish(DocumentEvent::DocumentSigned {
                document_id,
                signature_id: signed.id,
                completed,
            })
            .await;

        Ok(signed)
    }

    /// Fetches a document with its fields, signatures, and analysis.
    ///
    /// Administrators see any document; the sender sees their own; any user
    /// holding a signature on the document may view it.
    pub async fn get_document(
        &self,
        document_id: Uuid,
        caller: &Actor,
    ) -> PortResult<DocumentBundle> {
        let document = self.repo.get_document(document_id).await?;
        let signatures = self.repo.signatures_for_document(document_id).await?;

        let allowed = caller.is_admin()
            || document.sender_id == caller.user_id
            || signatures.iter().any(|s| s.signer_id == caller.user_id);
        if !allowed {
            return Err(PortError::Forbidden);
        }

        let fields = self.repo.fields_for_document(document_id).await?;
        let analysis = self.repo.analysis_for_document(document_id).await?;

        Ok(DocumentBundle {
            document,
            fields,
            signatures,
            analysis,
        })
    }

    /// Lists documents the caller sent; administrators see everything.
    ///
    /// Documents where the caller is only a signer are reachable through
    /// `get_document` but deliberately not listed here, preserving the
    /// behavior of the system this replaces.
    pub async fn list_documents(&self, caller: &Actor) -> PortResult<Vec<Document>> {
        if caller.is_admin() {
            self.repo.list_all_documents().await
        } else {
            self.repo.list_documents_by_sender(caller.user_id).await
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentAnalysis, FieldKind, FieldPlacement, Role, User};
    use crate::ports::{DocumentRepository, SignerDirectory};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    //-------------------------------------------------------------------------------------
    // In-memory port implementations
    //-------------------------------------------------------------------------------------

    #[derive(Default)]
    struct MemoryState {
        documents: HashMap<Uuid, Document>,
        fields: HashMap<Uuid, Vec<DocumentField>>,
        signatures: Vec<Signature>,
        analyses: HashMap<Uuid, AiAnalysis>,
        users_by_email: HashMap<String, User>,
    }

    /// A single-lock in-memory repository. Each trait method takes the lock
    /// once and releases it before returning, which gives every operation
    /// the same atomicity the SQL adapter gets from guarded updates.
    #[derive(Default)]
    struct MemoryRepo {
        state: Mutex<MemoryState>,
    }

    #[async_trait]
    impl DocumentRepository for MemoryRepo {
        async fn create_document(
            &self,
            sender_id: Uuid,
            new: NewDocument,
        ) -> PortResult<Document> {
            let document = Document {
                id: Uuid::new_v4(),
                sender_id,
                title: new.title,
                description: new.description,
                original_file_name: new.original_file_name,
                storage_key: new.storage_key,
                file_url: new.file_url,
                file_size: new.file_size,
                mime_type: new.mime_type,
                status: DocumentStatus::Draft,
                created_at: Utc::now(),
                sent_at: None,
                completed_at: None,
            };
            let mut state = self.state.lock().unwrap();
            state.documents.insert(document.id, document.clone());
            Ok(document)
        }

        async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
            let state = self.state.lock().unwrap();
            state
                .documents
                .get(&document_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))
        }

        async fn list_all_documents(&self) -> PortResult<Vec<Document>> {
            let state = self.state.lock().unwrap();
            Ok(state.documents.values().cloned().collect())
        }

        async fn list_documents_by_sender(&self, sender_id: Uuid) -> PortResult<Vec<Document>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .documents
                .values()
                .filter(|d| d.sender_id == sender_id)
                .cloned()
                .collect())
        }

        async fn replace_fields(
            &self,
            document_id: Uuid,
            fields: Vec<FieldSpec>,
        ) -> PortResult<Vec<DocumentField>> {
            let installed: Vec<DocumentField> = fields
                .into_iter()
                .map(|f| DocumentField {
                    id: Uuid::new_v4(),
                    document_id,
                    kind: f.kind,
                    label: f.label,
                    required: f.required,
                    placement: f.placement,
                })
                .collect();
            let mut state = self.state.lock().unwrap();
            state.fields.insert(document_id, installed.clone());
            Ok(installed)
        }

        async fn fields_for_document(&self, document_id: Uuid) -> PortResult<Vec<DocumentField>> {
            let state = self.state.lock().unwrap();
            Ok(state.fields.get(&document_id).cloned().unwrap_or_default())
        }

        async fn create_signature(
            &self,
            document_id: Uuid,
            signer: &User,
            signer_email: &str,
            signer_name: &str,
        ) -> PortResult<Signature> {
            let signature = Signature {
                id: Uuid::new_v4(),
                document_id,
                signer_id: signer.id,
                signer_email: signer_email.to_string(),
                signer_name: signer_name.to_string(),
                status: SignatureStatus::Pending,
                signed_at: None,
                payload: None,
                ip_address: None,
                user_agent: None,
            };
            let mut state = self.state.lock().unwrap();
            // Same status guard the SQL adapter applies in its INSERT, under
            // the same lock as the completion check-then-set.
            let status = state
                .documents
                .get(&document_id)
                .map(|d| d.status)
                .ok_or_else(|| PortError::NotFound("document not found".into()))?;
            if status == DocumentStatus::Completed {
                return Err(PortError::Conflict("document is already completed".into()));
            }
            state.signatures.push(signature.clone());
            Ok(signature)
        }

        async fn signatures_for_document(&self, document_id: Uuid) -> PortResult<Vec<Signature>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .signatures
                .iter()
                .filter(|s| s.document_id == document_id)
                .cloned()
                .collect())
        }

        async fn update_signature_signed(
            &self,
            signature_id: Uuid,
            payload: &str,
            audit: &SigningAudit,
            signed_at: DateTime<Utc>,
        ) -> PortResult<Signature> {
            let mut state = self.state.lock().unwrap();
            let signature = state
                .signatures
                .iter_mut()
                .find(|s| s.id == signature_id)
                .ok_or_else(|| PortError::NotFound("signature not found".into()))?;
            if signature.status != SignatureStatus::Pending {
                return Err(PortError::Conflict("signature already signed".into()));
            }
            signature.status = SignatureStatus::Signed;
            signature.signed_at = Some(signed_at);
            signature.payload = Some(payload.to_string());
            signature.ip_address = audit.ip_address.clone();
            signature.user_agent = audit.user_agent.clone();
            Ok(signature.clone())
        }

        async fn mark_sent(&self, document_id: Uuid, sent_at: DateTime<Utc>) -> PortResult<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(doc) = state.documents.get_mut(&document_id) {
                if doc.status == DocumentStatus::Draft {
                    doc.status = DocumentStatus::Sent;
                    doc.sent_at = Some(sent_at);
                }
            }
            Ok(())
        }

        async fn mark_in_progress(&self, document_id: Uuid) -> PortResult<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(doc) = state.documents.get_mut(&document_id) {
                if doc.status == DocumentStatus::Sent {
                    doc.status = DocumentStatus::InProgress;
                }
            }
            Ok(())
        }

        async fn complete_if_fully_signed(
            &self,
            document_id: Uuid,
            completed_at: DateTime<Utc>,
        ) -> PortResult<bool> {
            let mut state = self.state.lock().unwrap();
            let all_signed = state
                .signatures
                .iter()
                .filter(|s| s.document_id == document_id)
                .all(|s| s.status == SignatureStatus::Signed);
            if !all_signed {
                return Ok(false);
            }
            let doc = state
                .documents
                .get_mut(&document_id)
                .ok_or_else(|| PortError::NotFound("document not found".into()))?;
            if doc.status == DocumentStatus::Completed {
                return Ok(false);
            }
            doc.status = DocumentStatus::Completed;
            doc.completed_at = Some(completed_at);
            Ok(true)
        }

        async fn save_analysis(
            &self,
            document_id: Uuid,
            analysis: &DocumentAnalysis,
        ) -> PortResult<AiAnalysis> {
            let record = AiAnalysis {
                id: Uuid::new_v4(),
                document_id,
                summary: analysis.summary.clone(),
                risks: analysis.risks.clone(),
                compliance: analysis.compliance.clone(),
                suggestions: analysis.suggestions.clone(),
                created_at: Utc::now(),
            };
            let mut state = self.state.lock().unwrap();
            state.analyses.insert(document_id, record.clone());
            Ok(record)
        }

        async fn analysis_for_document(
            &self,
            document_id: Uuid,
        ) -> PortResult<Option<AiAnalysis>> {
            let state = self.state.lock().unwrap();
            Ok(state.analyses.get(&document_id).cloned())
        }
    }

    #[async_trait]
    impl SignerDirectory for MemoryRepo {
        async fn resolve_or_provision(&self, email: &str, name: &str) -> PortResult<User> {
            let mut state = self.state.lock().unwrap();
            if let Some(user) = state.users_by_email.get(email) {
                return Ok(user.clone());
            }
            let mut parts = name.split_whitespace();
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                first_name: parts.next().unwrap_or_default().to_string(),
                last_name: parts.collect::<Vec<_>>().join(" "),
                role: Role::Signer,
            };
            state.users_by_email.insert(email.to_string(), user.clone());
            Ok(user)
        }
    }

    /// Delegates to a `MemoryRepo`, but when armed parks `create_signature`
    /// on a semaphore until the test releases it. Lets a test interleave a
    /// signing operation between a send's status check and its inserts.
    struct GatedRepo {
        inner: Arc<MemoryRepo>,
        gate: Semaphore,
        armed: AtomicBool,
    }

    impl GatedRepo {
        fn new(inner: Arc<MemoryRepo>) -> Self {
            Self {
                inner,
                gate: Semaphore::new(0),
                armed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentRepository for GatedRepo {
        async fn create_document(
            &self,
            sender_id: Uuid,
            new: NewDocument,
        ) -> PortResult<Document> {
            self.inner.create_document(sender_id, new).await
        }

        async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
            self.inner.get_document(document_id).await
        }

        async fn list_all_documents(&self) -> PortResult<Vec<Document>> {
            self.inner.list_all_documents().await
        }

        async fn list_documents_by_sender(&self, sender_id: Uuid) -> PortResult<Vec<Document>> {
            self.inner.list_documents_by_sender(sender_id).await
        }

        async fn replace_fields(
            &self,
            document_id: Uuid,
            fields: Vec<FieldSpec>,
        ) -> PortResult<Vec<DocumentField>> {
            self.inner.replace_fields(document_id, fields).await
        }

        async fn fields_for_document(&self, document_id: Uuid) -> PortResult<Vec<DocumentField>> {
            self.inner.fields_for_document(document_id).await
        }

        async fn create_signature(
            &self,
            document_id: Uuid,
            signer: &User,
            signer_email: &str,
            signer_name: &str,
        ) -> PortResult<Signature> {
            if self.armed.swap(false, Ordering::SeqCst) {
                let _permit = self.gate.acquire().await;
            }
            self.inner
                .create_signature(document_id, signer, signer_email, signer_name)
                .await
        }

        async fn signatures_for_document(&self, document_id: Uuid) -> PortResult<Vec<Signature>> {
            self.inner.signatures_for_document(document_id).await
        }

        async fn update_signature_signed(
            &self,
            signature_id: Uuid,
            payload: &str,
            audit: &SigningAudit,
            signed_at: DateTime<Utc>,
        ) -> PortResult<Signature> {
            self.inner
                .update_signature_signed(signature_id, payload, audit, signed_at)
                .await
        }

        async fn mark_sent(&self, document_id: Uuid, sent_at: DateTime<Utc>) -> PortResult<()> {
            self.inner.mark_sent(document_id, sent_at).await
        }

        async fn mark_in_progress(&self, document_id: Uuid) -> PortResult<()> {
            self.inner.mark_in_progress(document_id).await
        }

        async fn complete_if_fully_signed(
            &self,
            document_id: Uuid,
            completed_at: DateTime<Utc>,
        ) -> PortResult<bool> {
            self.inner
                .complete_if_fully_signed(document_id, completed_at)
                .await
        }

        async fn save_analysis(
            &self,
            document_id: Uuid,
            analysis: &DocumentAnalysis,
        ) -> PortResult<AiAnalysis> {
            self.inner.save_analysis(document_id, analysis).await
        }

        async fn analysis_for_document(
            &self,
            document_id: Uuid,
        ) -> PortResult<Option<AiAnalysis>> {
            self.inner.analysis_for_document(document_id).await
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<DocumentEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: DocumentEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    fn test_engine() -> (WorkflowEngine, Arc<MemoryRepo>, Arc<RecordingPublisher>) {
        let repo = Arc::new(MemoryRepo::default());
        let events = Arc::new(RecordingPublisher::default());
        let engine = WorkflowEngine::new(repo.clone(), repo.clone(), events.clone());
        (engine, repo, events)
    }

    fn new_document(title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            description: None,
            original_file_name: "contract.pdf".to_string(),
            storage_key: "documents/contract.pdf".to_string(),
            file_url: "https://bucket.example/documents/contract.pdf".to_string(),
            file_size: 1024,
            mime_type: "application/pdf".to_string(),
        }
    }

    fn sender() -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role: Role::Sender,
        }
    }

    fn field(label: &str) -> FieldSpec {
        FieldSpec {
            kind: FieldKind::Signature,
            label: label.to_string(),
            required: true,
            placement: FieldPlacement {
                page: 1,
                x: 10.0,
                y: 20.0,
                width: 120.0,
                height: 40.0,
            },
        }
    }

    fn invite(email: &str, name: &str) -> SignerInvite {
        SignerInvite {
            email: email.to_string(),
            name: name.to_string(),
        }
    }

    async fn sent_document(
        engine: &WorkflowEngine,
        owner: &Actor,
        signer_emails: &[&str],
    ) -> (Document, Vec<Signature>) {
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();
        let invites = signer_emails
            .iter()
            .map(|e| invite(e, "Test Signer"))
            .collect();
        let signatures = engine.send_document(doc.id, owner, invites).await.unwrap();
        (doc, signatures)
    }

    //-------------------------------------------------------------------------------------
    // Creation and validation
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn create_document_starts_as_draft() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_eq!(doc.sender_id, owner.user_id);
        assert!(doc.sent_at.is_none());
    }

    #[tokio::test]
    async fn create_document_rejects_blank_title_and_storage_key() {
        let (engine, _, _) = test_engine();
        let owner = sender();

        let mut blank_title = new_document("  ");
        blank_title.title = "  ".to_string();
        let err = engine
            .create_document(owner.user_id, blank_title)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let mut blank_key = new_document("NDA");
        blank_key.storage_key = String::new();
        let err = engine
            .create_document(owner.user_id, blank_key)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    //-------------------------------------------------------------------------------------
    // Field replacement
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn replace_fields_is_all_or_nothing() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        engine
            .replace_fields(doc.id, owner.user_id, vec![field("A"), field("B")])
            .await
            .unwrap();
        let installed = engine
            .replace_fields(doc.id, owner.user_id, vec![field("C")])
            .await
            .unwrap();

        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].label, "C");

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.fields.len(), 1);
        assert_eq!(bundle.fields[0].label, "C");
    }

    #[tokio::test]
    async fn replace_fields_requires_the_sender() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let stranger = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        let err = engine
            .replace_fields(doc.id, stranger.user_id, vec![field("A")])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Forbidden));
    }

    #[tokio::test]
    async fn replace_fields_is_frozen_after_send() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, _) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let err = engine
            .replace_fields(doc.id, owner.user_id, vec![field("A")])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    //-------------------------------------------------------------------------------------
    // Sending
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn send_creates_pending_signatures_and_marks_sent() {
        let (engine, _, events) = test_engine();
        let owner = sender();
        let (doc, signatures) =
            sent_document(&engine, &owner, &["a@example.com", "b@example.com"]).await;

        assert_eq!(signatures.len(), 2);
        assert!(signatures
            .iter()
            .all(|s| s.status == SignatureStatus::Pending));

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::Sent);
        assert!(bundle.document.sent_at.is_some());

        let recorded = events.events.lock().unwrap();
        assert!(matches!(
            recorded.as_slice(),
            [DocumentEvent::DocumentSent { signature_ids, .. }] if signature_ids.len() == 2
        ));
    }

    #[tokio::test]
    async fn send_requires_at_least_one_signer() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        let err = engine
            .send_document(doc.id, &owner, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn send_rejects_duplicate_emails_in_one_request() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        let err = engine
            .send_document(
                doc.id,
                &owner,
                vec![invite("a@example.com", "A"), invite("A@Example.com", "A")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        // Nothing was created for the rejected request.
        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert!(bundle.signatures.is_empty());
        assert_eq!(bundle.document.status, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn resend_rejects_an_already_invited_signer() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, _) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let err = engine
            .send_document(doc.id, &owner, vec![invite("a@example.com", "A")])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn send_after_completion_is_rejected() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) = sent_document(&engine, &owner, &["a@example.com"]).await;

        // The only signer signs, completing the document.
        engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a",
                SigningAudit::default(),
            )
            .await
            .unwrap();

        let err = engine
            .send_document(doc.id, &owner, vec![invite("b@example.com", "B")])
            .await
            .unwrap_err();
        // Completed documents accept no further signers.
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn resend_on_partially_signed_document_reads_in_progress() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) =
            sent_document(&engine, &owner, &["a@example.com", "b@example.com"]).await;

        engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a",
                SigningAudit::default(),
            )
            .await
            .unwrap();

        let created = engine
            .send_document(doc.id, &owner, vec![invite("c@example.com", "C")])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::InProgress);
        assert_eq!(bundle.signatures.len(), 3);
        // The earlier signed row is untouched.
        let signed: Vec<_> = bundle
            .signatures
            .iter()
            .filter(|s| s.status == SignatureStatus::Signed)
            .collect();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].id, signatures[0].id);
    }

    #[tokio::test]
    async fn admin_may_send_on_behalf_of_the_sender() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        let signatures = engine
            .send_document(doc.id, &admin, vec![invite("a@example.com", "A")])
            .await
            .unwrap();
        assert_eq!(signatures.len(), 1);

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::Sent);
    }

    #[tokio::test]
    async fn send_by_non_sender_is_forbidden() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let stranger = sender();
        let doc = engine
            .create_document(owner.user_id, new_document("NDA"))
            .await
            .unwrap();

        let err = engine
            .send_document(doc.id, &stranger, vec![invite("a@example.com", "A")])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Forbidden));
    }

    //-------------------------------------------------------------------------------------
    // Signing and completion
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn document_completes_exactly_when_every_signature_is_signed() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) =
            sent_document(&engine, &owner, &["a@example.com", "b@example.com"]).await;

        engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a",
                SigningAudit::default(),
            )
            .await
            .unwrap();

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::InProgress);
        assert!(bundle.document.completed_at.is_none());

        engine
            .sign_document(
                doc.id,
                signatures[1].signer_id,
                "sig-b",
                SigningAudit::default(),
            )
            .await
            .unwrap();

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::Completed);
        assert!(bundle.document.completed_at.is_some());
        assert!(bundle
            .signatures
            .iter()
            .all(|s| s.status == SignatureStatus::Signed));
    }

    #[tokio::test]
    async fn signing_records_payload_and_audit_fields() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let audit = SigningAudit {
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: Some("integration-test/1.0".to_string()),
        };
        let signed = engine
            .sign_document(doc.id, signatures[0].signer_id, "sig-a", audit)
            .await
            .unwrap();

        assert_eq!(signed.status, SignatureStatus::Signed);
        assert_eq!(signed.payload.as_deref(), Some("sig-a"));
        assert_eq!(signed.ip_address.as_deref(), Some("203.0.113.9"));
        assert!(signed.signed_at.is_some());
    }

    #[tokio::test]
    async fn signing_twice_is_not_found_and_never_resets_signed_at() {
        let (engine, repo, _) = test_engine();
        let owner = sender();
        let (doc, signatures) =
            sent_document(&engine, &owner, &["a@example.com", "b@example.com"]).await;

        let first = engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a",
                SigningAudit::default(),
            )
            .await
            .unwrap();

        let err = engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a-again",
                SigningAudit::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));

        let stored = repo
            .signatures_for_document(doc.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == first.id)
            .unwrap();
        assert_eq!(stored.signed_at, first.signed_at);
        assert_eq!(stored.payload.as_deref(), Some("sig-a"));
    }

    #[tokio::test]
    async fn signing_without_a_pending_row_is_not_found() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, _) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let err = engine
            .sign_document(doc.id, Uuid::new_v4(), "sig-x", SigningAudit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn signing_rejects_an_empty_payload() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let err = engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "   ",
                SigningAudit::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_last_two_signers_complete_exactly_once() {
        let (engine, _, events) = test_engine();
        let owner = sender();
        let (doc, signatures) =
            sent_document(&engine, &owner, &["a@example.com", "b@example.com"]).await;

        let a = {
            let engine = engine.clone();
            let signer = signatures[0].signer_id;
            let doc_id = doc.id;
            tokio::spawn(async move {
                engine
                    .sign_document(doc_id, signer, "sig-a", SigningAudit::default())
                    .await
            })
        };
        let b = {
            let engine = engine.clone();
            let signer = signatures[1].signer_id;
            let doc_id = doc.id;
            tokio::spawn(async move {
                engine
                    .sign_document(doc_id, signer, "sig-b", SigningAudit::default())
                    .await
            })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        assert!(ra.is_ok() && rb.is_ok());

        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::Completed);

        // Exactly one of the two signing events observed the completion.
        let recorded = events.events.lock().unwrap();
        let completions = recorded
            .iter()
            .filter(|e| matches!(e, DocumentEvent::DocumentSigned { completed: true, .. }))
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn resend_racing_the_completing_signature_creates_nothing() {
        let inner = Arc::new(MemoryRepo::default());
        let gated = Arc::new(GatedRepo::new(inner.clone()));
        let events = Arc::new(RecordingPublisher::default());
        let engine = WorkflowEngine::new(gated.clone(), inner, events);

        let owner = sender();
        let (doc, signatures) = sent_document(&engine, &owner, &["a@example.com"]).await;

        // The resend passes the Completed check against a not-yet-completed
        // document, then parks just before its signature insert.
        gated.armed.store(true, Ordering::SeqCst);
        let resend = {
            let engine = engine.clone();
            let doc_id = doc.id;
            tokio::spawn(async move {
                engine
                    .send_document(doc_id, &owner, vec![invite("b@example.com", "B")])
                    .await
            })
        };
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        // The only pending signer signs, completing the document while the
        // resend is parked. Then the resend is released.
        engine
            .sign_document(
                doc.id,
                signatures[0].signer_id,
                "sig-a",
                SigningAudit::default(),
            )
            .await
            .unwrap();
        gated.gate.add_permits(1);

        let result = resend.await.unwrap();
        assert!(matches!(result, Err(PortError::Conflict(_))));

        // The completed document holds no pending signature.
        let bundle = engine.get_document(doc.id, &owner).await.unwrap();
        assert_eq!(bundle.document.status, DocumentStatus::Completed);
        assert_eq!(bundle.signatures.len(), 1);
        assert!(bundle
            .signatures
            .iter()
            .all(|s| s.status == SignatureStatus::Signed));
    }

    //-------------------------------------------------------------------------------------
    // Access rules
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn get_document_grants_sender_signer_and_admin() {
        let (engine, _, _) = test_engine();
        let owner = sender();
        let (doc, signatures) = sent_document(&engine, &owner, &["a@example.com"]).await;

        let signer = Actor {
            user_id: signatures[0].signer_id,
            role: Role::Signer,
        };
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let stranger = sender();

        assert!(engine.get_document(doc.id, &owner).await.is_ok());
        assert!(engine.get_document(doc.id, &signer).await.is_ok());
        assert!(engine.get_document(doc.id, &admin).await.is_ok());

        let err = engine.get_document(doc.id, &stranger).await.unwrap_err();
        assert!(matches!(err, PortError::Forbidden));
    }

    #[tokio::test]
    async fn list_documents_shows_own_sends_only_and_everything_for_admin() {
        let (engine, _, _) = test_engine();
        let alice = sender();
        let bob = sender();
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };

        engine
            .create_document(alice.user_id, new_document("Alice's NDA"))
            .await
            .unwrap();
        let (_, signatures) = sent_document(&engine, &bob, &["alice-signs@example.com"]).await;

        assert_eq!(engine.list_documents(&alice).await.unwrap().len(), 1);
        assert_eq!(engine.list_documents(&bob).await.unwrap().len(), 1);
        assert_eq!(engine.list_documents(&admin).await.unwrap().len(), 2);

        // A signer sees nothing through listing; their documents are
        // reachable by id only.
        let signer = Actor {
            user_id: signatures[0].signer_id,
            role: Role::Signer,
        };
        assert!(engine.list_documents(&signer).await.unwrap().is_empty());
    }
}
