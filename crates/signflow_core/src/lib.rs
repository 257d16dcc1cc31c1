pub mod domain;
pub mod ports;
pub mod templates;
pub mod workflow;

pub use domain::{
    Actor, AiAnalysis, Document, DocumentAnalysis, DocumentEvent, DocumentField, DocumentStatus,
    FieldKind, FieldPlacement, FieldSpec, FieldSuggestion, NewDocument, NewTemplate, Role,
    Signature, SignatureStatus, SignerInvite, SigningAudit, StoredFile, Template, User,
    UserCredentials,
};
pub use ports::{
    AuthStore, ContractAnalysisService, DocumentRepository, EventPublisher, PortError, PortResult,
    SignerDirectory, StorageService, TemplateStore,
};
pub use templates::TemplateCatalog;
pub use workflow::{DocumentBundle, WorkflowEngine};
