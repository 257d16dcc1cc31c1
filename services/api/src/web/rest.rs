//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signflow_core::domain::{
    Actor, AiAnalysis, Document, DocumentField, FieldKind, FieldPlacement, FieldSpec, NewDocument,
    NewTemplate, Signature, SignerInvite, SigningAudit, Template,
};
use signflow_core::ports::PortError;
use signflow_core::workflow::DocumentBundle;
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        upload_document_handler,
        list_documents_handler,
        get_document_handler,
        replace_fields_handler,
        send_document_handler,
        sign_document_handler,
        list_templates_handler,
        create_template_handler,
        analyze_document_handler,
        detect_fields_handler,
        generate_contract_handler,
    ),
    components(
        schemas(
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
            DocumentResponse,
            DocumentDetailResponse,
            FieldResponse,
            SignatureResponse,
            AnalysisResponse,
            FieldSuggestionResponse,
            ReplaceFieldsRequest,
            FieldSpecBody,
            TemplateResponse,
            CreateTemplateRequest,
            SendDocumentRequest,
            SignerInviteRequest,
            SignRequest,
            AnalyzeRequest,
            GenerateContractRequest,
            GeneratedContractResponse,
        )
    ),
    tags(
        (name = "Signature Workflow API", description = "API endpoints for the document signature workflow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A document as returned by the list and detail endpoints.
#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub original_file_name: String,
    pub file_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentResponse {
    fn from_domain(doc: Document) -> Self {
        Self {
            id: doc.id,
            sender_id: doc.sender_id,
            title: doc.title,
            description: doc.description,
            original_file_name: doc.original_file_name,
            file_url: doc.file_url,
            file_size: doc.file_size,
            mime_type: doc.mime_type,
            status: doc.status.as_str().to_string(),
            created_at: doc.created_at,
            sent_at: doc.sent_at,
            completed_at: doc.completed_at,
        }
    }
}

/// A fillable field on a document, with its placement flattened.
#[derive(Serialize, ToSchema)]
pub struct FieldResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub required: bool,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FieldResponse {
    fn from_domain(field: DocumentField) -> Self {
        Self {
            id: field.id,
            kind: field.kind.as_str().to_string(),
            label: field.label,
            required: field.required,
            page: field.placement.page,
            x: field.placement.x,
            y: field.placement.y,
            width: field.placement.width,
            height: field.placement.height,
        }
    }
}

/// One signer's slot on a document. The signature payload itself is not
/// echoed back through the API.
#[derive(Serialize, ToSchema)]
pub struct SignatureResponse {
    pub id: Uuid,
    pub signer_id: Uuid,
    pub signer_email: String,
    pub signer_name: String,
    pub status: String,
    pub signed_at: Option<DateTime<Utc>>,
}

impl SignatureResponse {
    fn from_domain(sig: Signature) -> Self {
        Self {
            id: sig.id,
            signer_id: sig.signer_id,
            signer_email: sig.signer_email,
            signer_name: sig.signer_name,
            status: sig.status.as_str().to_string(),
            signed_at: sig.signed_at,
        }
    }
}

/// A persisted AI analysis of a document.
#[derive(Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub summary: String,
    pub risks: Vec<String>,
    pub compliance: Vec<String>,
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResponse {
    fn from_domain(analysis: AiAnalysis) -> Self {
        Self {
            id: analysis.id,
            document_id: analysis.document_id,
            summary: analysis.summary,
            risks: analysis.risks,
            compliance: analysis.compliance,
            suggestions: analysis.suggestions,
            created_at: analysis.created_at,
        }
    }
}

/// The full detail view: the document plus its fields, signatures, and the
/// latest AI analysis if one exists.
#[derive(Serialize, ToSchema)]
pub struct DocumentDetailResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub fields: Vec<FieldResponse>,
    pub signatures: Vec<SignatureResponse>,
    pub analysis: Option<AnalysisResponse>,
}

impl DocumentDetailResponse {
    fn from_bundle(bundle: DocumentBundle) -> Self {
        Self {
            document: DocumentResponse::from_domain(bundle.document),
            fields: bundle
                .fields
                .into_iter()
                .map(FieldResponse::from_domain)
                .collect(),
            signatures: bundle
                .signatures
                .into_iter()
                .map(SignatureResponse::from_domain)
                .collect(),
            analysis: bundle.analysis.map(AnalysisResponse::from_domain),
        }
    }
}

/// One AI-suggested field, returned by the detection endpoint.
#[derive(Serialize, ToSchema)]
pub struct FieldSuggestionResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub required: bool,
    pub suggested_position: Option<String>,
}

/// One field specification as it crosses the API, placement flattened. Used
/// both for replacing a document's fields and inside template payloads.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FieldSpecBody {
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub kind: FieldKind,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FieldSpecBody {
    fn into_domain(self) -> FieldSpec {
        FieldSpec {
            kind: self.kind,
            label: self.label,
            required: self.required,
            placement: FieldPlacement {
                page: self.page,
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            },
        }
    }

    fn from_domain(spec: FieldSpec) -> Self {
        Self {
            kind: spec.kind,
            label: spec.label,
            required: spec.required,
            page: spec.placement.page,
            x: spec.placement.x,
            y: spec.placement.y,
            width: spec.placement.width,
            height: spec.placement.height,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ReplaceFieldsRequest {
    pub fields: Vec<FieldSpecBody>,
}

/// A reusable template as returned by the templates endpoints.
#[derive(Serialize, ToSchema)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_url: String,
    pub fields: Vec<FieldSpecBody>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl TemplateResponse {
    fn from_domain(template: Template) -> Self {
        Self {
            id: template.id,
            creator_id: template.creator_id,
            name: template.name,
            description: template.description,
            file_url: template.file_url,
            fields: template
                .fields
                .into_iter()
                .map(FieldSpecBody::from_domain)
                .collect(),
            is_public: template.is_public,
            created_at: template.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub fields: Vec<FieldSpecBody>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct SignerInviteRequest {
    pub email: String,
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SendDocumentRequest {
    pub signers: Vec<SignerInviteRequest>,
}

#[derive(Deserialize, ToSchema)]
pub struct SignRequest {
    /// The rendered signature, e.g. a data URL of the drawn strokes.
    pub signature_data: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Text to analyze. When omitted, the document's title and description
    /// are used as the best available text.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateContractRequest {
    pub prompt: String,
    #[serde(default = "default_contract_type")]
    pub contract_type: String,
}

fn default_contract_type() -> String {
    "general".to_string()
}

#[derive(Serialize, ToSchema)]
pub struct GeneratedContractResponse {
    pub content: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a core port error onto the HTTP status it corresponds to.
pub fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Dependency(msg) => {
            error!("Dependency failure: {}", msg);
            (StatusCode::BAD_GATEWAY, "Upstream dependency failed".to_string())
        }
        PortError::Unexpected(msg) => {
            error!("Unexpected error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            )
        }
    }
}

//=========================================================================================
// Document Handlers
//=========================================================================================

/// Upload a document and create it as a draft.
///
/// Accepts a multipart/form-data request with a `file` part and optional
/// `title` and `description` text parts. The title falls back to the
/// uploaded file's name.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document created successfully", body = DocumentResponse),
        (status = 400, description = "Bad request (e.g., missing file part)"),
        (status = 401, description = "Not authenticated"),
        (status = 502, description = "Storage upload failed"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("untitled").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read file bytes: {}", e),
                    )
                })?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            Some("title") => {
                title = field.text().await.ok().filter(|t| !t.trim().is_empty());
            }
            Some("description") => {
                description = field.text().await.ok().filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) = file.ok_or((
        StatusCode::BAD_REQUEST,
        "Multipart form must include a file".to_string(),
    ))?;
    let file_size = data.len() as i64;

    let stored = state
        .storage
        .put(data, &file_name, &content_type)
        .await
        .map_err(port_error_response)?;

    let new = NewDocument {
        title: title.unwrap_or_else(|| file_name.clone()),
        description,
        original_file_name: file_name,
        storage_key: stored.key,
        file_url: stored.url,
        file_size,
        mime_type: content_type,
    };

    let document = state
        .engine
        .create_document(actor.user_id, new)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::from_domain(document)),
    ))
}

/// List documents visible to the caller.
///
/// Admins see every document; everyone else sees the documents they sent.
/// Documents a caller is only a signer on are reached through their direct
/// link, not through this listing.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "List of documents", body = [DocumentResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let documents = state
        .engine
        .list_documents(&actor)
        .await
        .map_err(port_error_response)?;

    let response: Vec<DocumentResponse> = documents
        .into_iter()
        .map(DocumentResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// Fetch one document with its fields, signatures, and analysis.
///
/// The returned file URL is a freshly signed download link.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document detail", body = DocumentDetailResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to this document"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut bundle = state
        .engine
        .get_document(id, &actor)
        .await
        .map_err(port_error_response)?;

    // Stored URLs expire; issue a fresh one for this response. If signing
    // fails, the stale URL is still the best answer available.
    match state
        .storage
        .signed_url(
            &bundle.document.storage_key,
            state.config.signed_url_ttl_secs,
        )
        .await
    {
        Ok(url) => bundle.document.file_url = url,
        Err(e) => warn!("Failed to sign download URL for {}: {:?}", id, e),
    }

    Ok(Json(DocumentDetailResponse::from_bundle(bundle)))
}

/// Replace the draft document's field set.
#[utoipa::path(
    post,
    path = "/documents/{id}/fields",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = ReplaceFieldsRequest,
    responses(
        (status = 200, description = "Fields replaced", body = [FieldResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not the sender"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document is no longer a draft")
    )
)]
pub async fn replace_fields_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceFieldsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let specs: Vec<FieldSpec> = req
        .fields
        .into_iter()
        .map(FieldSpecBody::into_domain)
        .collect();

    let fields = state
        .engine
        .replace_fields(id, actor.user_id, specs)
        .await
        .map_err(port_error_response)?;

    let response: Vec<FieldResponse> = fields.into_iter().map(FieldResponse::from_domain).collect();
    Ok(Json(response))
}

/// Send a document to a set of signers.
///
/// Creates one pending signature per invited signer, provisioning accounts
/// for emails that have never logged in. Re-sending an in-progress document
/// appends new signers without touching existing signatures.
#[utoipa::path(
    post,
    path = "/documents/{id}/send",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = SendDocumentRequest,
    responses(
        (status = 200, description = "Document sent", body = [SignatureResponse]),
        (status = 400, description = "No signers, or an invalid or duplicate email"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not the sender"),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document is completed or a signer is already invited")
    )
)]
pub async fn send_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendDocumentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let invites: Vec<SignerInvite> = req
        .signers
        .into_iter()
        .map(|s| SignerInvite {
            email: s.email,
            name: s.name,
        })
        .collect();

    let signatures = state
        .engine
        .send_document(id, &actor, invites)
        .await
        .map_err(port_error_response)?;

    let response: Vec<SignatureResponse> = signatures
        .into_iter()
        .map(SignatureResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// Sign a document as the authenticated signer.
///
/// Records the caller's IP address and user agent alongside the signature.
#[utoipa::path(
    post,
    path = "/documents/{id}/sign",
    params(("id" = Uuid, Path, description = "Document ID")),
    request_body = SignRequest,
    responses(
        (status = 200, description = "Signature recorded", body = SignatureResponse),
        (status = 400, description = "Empty signature payload"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No pending signature for this caller"),
        (status = 409, description = "Signature was signed concurrently")
    )
)]
pub async fn sign_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SignRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let audit = SigningAudit {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    };

    let signature = state
        .engine
        .sign_document(id, actor.user_id, &req.signature_data, audit)
        .await
        .map_err(port_error_response)?;

    Ok(Json(SignatureResponse::from_domain(signature)))
}

//=========================================================================================
// Template Handlers
//=========================================================================================

/// List the templates the caller may use: their own plus any public ones.
#[utoipa::path(
    get,
    path = "/templates",
    responses(
        (status = 200, description = "List of visible templates", body = [TemplateResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_templates_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let templates = state
        .templates
        .list_templates(actor.user_id)
        .await
        .map_err(port_error_response)?;

    let response: Vec<TemplateResponse> = templates
        .into_iter()
        .map(TemplateResponse::from_domain)
        .collect();
    Ok(Json(response))
}

/// Save a reusable template owned by the caller.
#[utoipa::path(
    post,
    path = "/templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created successfully", body = TemplateResponse),
        (status = 400, description = "Missing name or file URL"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_template_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let new = NewTemplate {
        name: req.name,
        description: req.description,
        file_url: req.file_url,
        fields: req
            .fields
            .into_iter()
            .map(FieldSpecBody::into_domain)
            .collect(),
        is_public: req.is_public,
    };

    let template = state
        .templates
        .create_template(actor.user_id, new)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(TemplateResponse::from_domain(template)),
    ))
}

//=========================================================================================
// AI Handlers
//=========================================================================================

/// Run an AI analysis of a document and persist the result.
#[utoipa::path(
    post,
    path = "/ai/analyze/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis complete", body = AnalysisResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to this document"),
        (status = 404, description = "Document not found"),
        (status = 502, description = "AI provider failed")
    )
)]
pub async fn analyze_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Access control is the engine's: whoever may read the document may
    // analyze it.
    let bundle = state
        .engine
        .get_document(document_id, &actor)
        .await
        .map_err(port_error_response)?;

    let text = document_text(&req.text, &bundle);

    let analysis = state
        .ai
        .analyze(&text)
        .await
        .map_err(port_error_response)?;

    let saved = state
        .repo
        .save_analysis(document_id, &analysis)
        .await
        .map_err(port_error_response)?;

    Ok(Json(AnalysisResponse::from_domain(saved)))
}

/// Suggest fillable field placements for a document.
#[utoipa::path(
    post,
    path = "/ai/detect-fields/{document_id}",
    params(("document_id" = Uuid, Path, description = "Document ID")),
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Suggested fields", body = [FieldSuggestionResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has no access to this document"),
        (status = 404, description = "Document not found"),
        (status = 502, description = "AI provider failed")
    )
)]
pub async fn detect_fields_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bundle = state
        .engine
        .get_document(document_id, &actor)
        .await
        .map_err(port_error_response)?;

    let text = document_text(&req.text, &bundle);

    let suggestions = state
        .ai
        .detect_fields(&text)
        .await
        .map_err(port_error_response)?;

    let response: Vec<FieldSuggestionResponse> = suggestions
        .into_iter()
        .map(|s| FieldSuggestionResponse {
            kind: s.kind.as_str().to_string(),
            label: s.label,
            required: s.required,
            suggested_position: s.suggested_position,
        })
        .collect();
    Ok(Json(response))
}

/// Generate contract text from a prompt.
#[utoipa::path(
    post,
    path = "/ai/generate-contract",
    request_body = GenerateContractRequest,
    responses(
        (status = 200, description = "Generated contract text", body = GeneratedContractResponse),
        (status = 400, description = "Empty prompt"),
        (status = 401, description = "Not authenticated"),
        (status = 502, description = "AI provider failed")
    )
)]
pub async fn generate_contract_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateContractRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Prompt must not be empty".to_string()));
    }

    let content = state
        .ai
        .generate_contract(&req.prompt, &req.contract_type)
        .await
        .map_err(port_error_response)?;

    Ok(Json(GeneratedContractResponse { content }))
}

/// Best available text for the AI endpoints: the caller's text if supplied,
/// otherwise the document's title and description.
fn document_text(requested: &Option<String>, bundle: &DocumentBundle) -> String {
    match requested {
        Some(text) if !text.trim().is_empty() => text.clone(),
        _ => match &bundle.document.description {
            Some(desc) => format!("{}\n\n{}", bundle.document.title, desc),
            None => bundle.document.title.clone(),
        },
    }
}
