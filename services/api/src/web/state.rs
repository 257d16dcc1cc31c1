//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::BroadcastPublisher;
use crate::config::Config;
use signflow_core::ports::{AuthStore, ContractAnalysisService, DocumentRepository, StorageService};
use signflow_core::templates::TemplateCatalog;
use signflow_core::workflow::WorkflowEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The workflow engine; all document lifecycle mutations go through it.
    pub engine: WorkflowEngine,
    /// Reusable template catalog, separate from the document state machine.
    pub templates: TemplateCatalog,
    /// Direct repository handle for the non-workflow AI artifact reads/writes.
    pub repo: Arc<dyn DocumentRepository>,
    pub auth: Arc<dyn AuthStore>,
    pub storage: Arc<dyn StorageService>,
    pub ai: Arc<dyn ContractAnalysisService>,
    /// Concrete publisher so the WebSocket layer can subscribe to the stream
    /// the engine publishes into.
    pub events: BroadcastPublisher,
    pub config: Arc<Config>,
}
