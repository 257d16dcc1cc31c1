//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the persistence ports from the `core` crate (`DocumentRepository`,
//! `SignerDirectory`, `AuthStore`). It handles all interactions with the
//! PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signflow_core::domain::{
    Actor, AiAnalysis, Document, DocumentAnalysis, DocumentField, DocumentStatus, FieldKind,
    FieldPlacement, FieldSpec, NewDocument, NewTemplate, Role, Signature, SignatureStatus,
    SigningAudit, Template, User, UserCredentials,
};
use signflow_core::ports::{
    AuthStore, DocumentRepository, PortError, PortResult, SignerDirectory, TemplateStore,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    sender_id: Uuid,
    title: String,
    description: Option<String>,
    original_file_name: String,
    storage_key: String,
    file_url: String,
    file_size: i64,
    mime_type: String,
    status: String,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    fn to_domain(self) -> PortResult<Document> {
        let status = DocumentStatus::parse(&self.status)
            .ok_or_else(|| PortError::Unexpected(format!("bad document status: {}", self.status)))?;
        Ok(Document {
            id: self.id,
            sender_id: self.sender_id,
            title: self.title,
            description: self.description,
            original_file_name: self.original_file_name,
            storage_key: self.storage_key,
            file_url: self.file_url,
            file_size: self.file_size,
            mime_type: self.mime_type,
            status,
            created_at: self.created_at,
            sent_at: self.sent_at,
            completed_at: self.completed_at,
        })
    }
}

const DOCUMENT_COLUMNS: &str = "id, sender_id, title, description, original_file_name, \
     storage_key, file_url, file_size, mime_type, status, created_at, sent_at, completed_at";

#[derive(FromRow)]
struct FieldRecord {
    id: Uuid,
    document_id: Uuid,
    kind: String,
    label: String,
    required: bool,
    page: i32,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl FieldRecord {
    fn to_domain(self) -> PortResult<DocumentField> {
        let kind = FieldKind::parse(&self.kind)
            .ok_or_else(|| PortError::Unexpected(format!("bad field kind: {}", self.kind)))?;
        Ok(DocumentField {
            id: self.id,
            document_id: self.document_id,
            kind,
            label: self.label,
            required: self.required,
            placement: FieldPlacement {
                page: self.page,
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            },
        })
    }
}

#[derive(FromRow)]
struct SignatureRecord {
    id: Uuid,
    document_id: Uuid,
    signer_id: Uuid,
    signer_email: String,
    signer_name: String,
    status: String,
    signed_at: Option<DateTime<Utc>>,
    payload: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl SignatureRecord {
    fn to_domain(self) -> PortResult<Signature> {
        let status = SignatureStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("bad signature status: {}", self.status))
        })?;
        Ok(Signature {
            id: self.id,
            document_id: self.document_id,
            signer_id: self.signer_id,
            signer_email: self.signer_email,
            signer_name: self.signer_name,
            status,
            signed_at: self.signed_at,
            payload: self.payload,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        })
    }
}

const SIGNATURE_COLUMNS: &str = "id, document_id, signer_id, signer_email, signer_name, \
     status, signed_at, payload, ip_address, user_agent";

#[derive(FromRow)]
struct AnalysisRecord {
    id: Uuid,
    document_id: Uuid,
    summary: String,
    risks: Vec<String>,
    compliance: Vec<String>,
    suggestions: Vec<String>,
    created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    fn to_domain(self) -> AiAnalysis {
        AiAnalysis {
            id: self.id,
            document_id: self.document_id,
            summary: self.summary,
            risks: self.risks,
            compliance: self.compliance,
            suggestions: self.suggestions,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct TemplateRecord {
    id: Uuid,
    creator_id: Uuid,
    name: String,
    description: Option<String>,
    file_url: String,
    // JSON-encoded Vec<FieldSpec>; the column stays opaque to Postgres.
    fields: String,
    is_public: bool,
    created_at: DateTime<Utc>,
}

impl TemplateRecord {
    fn to_domain(self) -> PortResult<Template> {
        let fields = serde_json::from_str(&self.fields)
            .map_err(|e| PortError::Unexpected(format!("bad template fields: {}", e)))?;
        Ok(Template {
            id: self.id,
            creator_id: self.creator_id,
            name: self.name,
            description: self.description,
            file_url: self.file_url,
            fields,
            is_public: self.is_public,
            created_at: self.created_at,
        })
    }
}

const TEMPLATE_COLUMNS: &str =
    "id, creator_id, name, description, file_url, fields, is_public, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
}

impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| PortError::Unexpected(format!("bad user role: {}", self.role)))?;
        Ok(User {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    role: String,
    password_hash: String,
}

#[derive(FromRow)]
struct SessionActorRecord {
    user_id: Uuid,
    role: String,
}

//=========================================================================================
// `DocumentRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentRepository for DbAdapter {
    async fn create_document(&self, sender_id: Uuid, new: NewDocument) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents \
             (id, sender_id, title, description, original_file_name, storage_key, file_url, file_size, mime_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(sender_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.original_file_name)
            .bind(&new.storage_key)
            .bind(&new.file_url)
            .bind(new.file_size)
            .bind(&new.mime_type)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_document(&self, document_id: Uuid) -> PortResult<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Document {} not found", document_id)))?;
        record.to_domain()
    }

    async fn list_all_documents(&self) -> PortResult<Vec<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC");
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_documents_by_sender(&self, sender_id: Uuid) -> PortResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE sender_id = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(sender_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn replace_fields(
        &self,
        document_id: Uuid,
        fields: Vec<FieldSpec>,
    ) -> PortResult<Vec<DocumentField>> {
        // Delete-then-insert inside one transaction so a concurrent reader
        // never sees a mix of old and new fields.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM document_fields WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let mut installed = Vec::with_capacity(fields.len());
        for field in &fields {
            let record = sqlx::query_as::<_, FieldRecord>(
                "INSERT INTO document_fields \
                 (id, document_id, kind, label, required, page, x, y, width, height) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 RETURNING id, document_id, kind, label, required, page, x, y, width, height",
            )
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(field.kind.as_str())
            .bind(&field.label)
            .bind(field.required)
            .bind(field.placement.page)
            .bind(field.placement.x)
            .bind(field.placement.y)
            .bind(field.placement.width)
            .bind(field.placement.height)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            installed.push(record.to_domain()?);
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(installed)
    }

    async fn fields_for_document(&self, document_id: Uuid) -> PortResult<Vec<DocumentField>> {
        let records = sqlx::query_as::<_, FieldRecord>(
            "SELECT id, document_id, kind, label, required, page, x, y, width, height \
             FROM document_fields WHERE document_id = $1 ORDER BY page, y, x",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn create_signature(
        &self,
        document_id: Uuid,
        signer: &User,
        signer_email: &str,
        signer_name: &str,
    ) -> PortResult<Signature> {
        // INSERT ... SELECT guarded on document status: the engine's own
        // completion check reads a possibly stale document, so the terminal
        // state must be re-verified in the same statement as the insert.
        let sql = format!(
            "INSERT INTO signatures (id, document_id, signer_id, signer_email, signer_name) \
             SELECT $1, d.id, $3, $4, $5 FROM documents d \
             WHERE d.id = $2 AND d.status <> 'COMPLETED' \
             RETURNING {SIGNATURE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SignatureRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(signer.id)
            .bind(signer_email)
            .bind(signer_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match &e {
                // The (document_id, signer_id) unique constraint: the signer
                // already holds a slot on this document.
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    PortError::Conflict("signer already invited to this document".into())
                }
                _ => unexpected(e),
            })?
            .ok_or_else(|| PortError::Conflict("document is already completed".into()))?;
        record.to_domain()
    }

    async fn signatures_for_document(&self, document_id: Uuid) -> PortResult<Vec<Signature>> {
        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM signatures WHERE document_id = $1 ORDER BY created_at"
        );
        let records = sqlx::query_as::<_, SignatureRecord>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_signature_signed(
        &self,
        signature_id: Uuid,
        payload: &str,
        audit: &SigningAudit,
        signed_at: DateTime<Utc>,
    ) -> PortResult<Signature> {
        // The status predicate is the optimistic precondition: of two
        // concurrent attempts on the same row, exactly one matches.
        let sql = format!(
            "UPDATE signatures \
             SET status = 'SIGNED', signed_at = $2, payload = $3, ip_address = $4, user_agent = $5 \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {SIGNATURE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SignatureRecord>(&sql)
            .bind(signature_id)
            .bind(signed_at)
            .bind(payload)
            .bind(&audit.ip_address)
            .bind(&audit.user_agent)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::Conflict("signature already signed".into()))?;
        record.to_domain()
    }

    async fn mark_sent(&self, document_id: Uuid, sent_at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query(
            "UPDATE documents SET status = 'SENT', sent_at = $2 WHERE id = $1 AND status = 'DRAFT'",
        )
        .bind(document_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn mark_in_progress(&self, document_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE documents SET status = 'IN_PROGRESS' WHERE id = $1 AND status = 'SENT'")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn complete_if_fully_signed(
        &self,
        document_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Single guarded UPDATE: the completion check and the transition are
        // one atomic statement, so concurrent last signers race to exactly
        // one affected row.
        let result = sqlx::query(
            "UPDATE documents SET status = 'COMPLETED', completed_at = $2 \
             WHERE id = $1 \
               AND status <> 'COMPLETED' \
               AND EXISTS (SELECT 1 FROM signatures WHERE document_id = $1) \
               AND NOT EXISTS \
                   (SELECT 1 FROM signatures WHERE document_id = $1 AND status <> 'SIGNED')",
        )
        .bind(document_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_analysis(
        &self,
        document_id: Uuid,
        analysis: &DocumentAnalysis,
    ) -> PortResult<AiAnalysis> {
        let record = sqlx::query_as::<_, AnalysisRecord>(
            "INSERT INTO ai_analyses (id, document_id, summary, risks, compliance, suggestions) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, document_id, summary, risks, compliance, suggestions, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(&analysis.summary)
        .bind(&analysis.risks)
        .bind(&analysis.compliance)
        .bind(&analysis.suggestions)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn analysis_for_document(&self, document_id: Uuid) -> PortResult<Option<AiAnalysis>> {
        let record = sqlx::query_as::<_, AnalysisRecord>(
            "SELECT id, document_id, summary, risks, compliance, suggestions, created_at \
             FROM ai_analyses WHERE document_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }
}

//=========================================================================================
// `TemplateStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TemplateStore for DbAdapter {
    async fn create_template(&self, creator_id: Uuid, new: NewTemplate) -> PortResult<Template> {
        let fields = serde_json::to_string(&new.fields)
            .map_err(|e| PortError::Unexpected(format!("unencodable template fields: {}", e)))?;

        let sql = format!(
            "INSERT INTO templates (id, creator_id, name, description, file_url, fields, is_public) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {TEMPLATE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, TemplateRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(creator_id)
            .bind(&new.name)
            .bind(&new.description)
            .bind(&new.file_url)
            .bind(&fields)
            .bind(new.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn list_templates_visible_to(&self, viewer_id: Uuid) -> PortResult<Vec<Template>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates \
             WHERE creator_id = $1 OR is_public \
             ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, TemplateRecord>(&sql)
            .bind(viewer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `SignerDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl SignerDirectory for DbAdapter {
    async fn resolve_or_provision(&self, email: &str, name: &str) -> PortResult<User> {
        let mut parts = name.split_whitespace();
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = parts.collect::<Vec<_>>().join(" ");

        // Upsert: the DO UPDATE arm is a no-op that only exists so RETURNING
        // yields the existing row when the email is already registered. Two
        // concurrent sends resolving the same email both get the same user.
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, first_name, last_name, role) \
             VALUES ($1, $2, $3, $4, 'SIGNER') \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id, email, first_name, last_name, role",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(&first_name)
        .bind(&last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }
}

//=========================================================================================
// `AuthStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        // The conditional DO UPDATE claims a passwordless placeholder account
        // that was provisioned when this email was invited to sign. An
        // account that already has a password cannot be claimed again.
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, first_name, last_name, role, password_hash) \
             VALUES ($1, $2, $3, $4, 'SENDER', $5) \
             ON CONFLICT (email) DO UPDATE \
               SET password_hash = EXCLUDED.password_hash, \
                   first_name = EXCLUDED.first_name, \
                   last_name = EXCLUDED.last_name \
               WHERE users.password_hash IS NULL \
             RETURNING id, email, first_name, last_name, role",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(hashed_password)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::Conflict("email is already registered".into()))?;
        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, role, password_hash \
             FROM users WHERE email = $1 AND password_hash IS NOT NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;

        let role = Role::parse(&record.role)
            .ok_or_else(|| PortError::Unexpected(format!("bad user role: {}", record.role)))?;
        Ok(UserCredentials {
            user_id: record.id,
            email: record.email,
            role,
            hashed_password: record.password_hash,
        })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Actor> {
        let record = sqlx::query_as::<_, SessionActorRecord>(
            "SELECT s.user_id, u.role \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Forbidden)?;

        let role = Role::parse(&record.role)
            .ok_or_else(|| PortError::Unexpected(format!("bad user role: {}", record.role)))?;
        Ok(Actor {
            user_id: record.user_id,
            role,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
