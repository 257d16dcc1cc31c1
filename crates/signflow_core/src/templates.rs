//! crates/signflow_core/src/templates.rs
//!
//! Reusable document templates: named files with a saved field layout that
//! senders can start new documents from. Templates sit outside the document
//! state machine; this catalog only validates input and applies the
//! creator-or-public visibility rule through its store.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{NewTemplate, Template};
use crate::ports::{PortError, PortResult, TemplateStore};

/// Create and list reusable templates.
#[derive(Clone)]
pub struct TemplateCatalog {
    store: Arc<dyn TemplateStore>,
}

impl TemplateCatalog {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Saves a new template owned by `creator`.
    pub async fn create_template(
        &self,
        creator: Uuid,
        new: NewTemplate,
    ) -> PortResult<Template> {
        if new.name.trim().is_empty() {
            return Err(PortError::Validation(
                "template name must not be empty".into(),
            ));
        }
        if new.file_url.trim().is_empty() {
            return Err(PortError::Validation(
                "template file URL must not be empty".into(),
            ));
        }
        self.store.create_template(creator, new).await
    }

    /// Lists the templates `viewer` may use: their own plus any public ones.
    pub async fn list_templates(&self, viewer: Uuid) -> PortResult<Vec<Template>> {
        self.store.list_templates_visible_to(viewer).await
    }
}
