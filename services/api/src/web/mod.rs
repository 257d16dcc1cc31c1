pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary needs to build the web server router.
pub use middleware::require_auth;
pub use rest::{
    analyze_document_handler, create_template_handler, detect_fields_handler,
    generate_contract_handler, get_document_handler, list_documents_handler,
    list_templates_handler, replace_fields_handler, send_document_handler, sign_document_handler,
    upload_document_handler,
};
pub use ws_handler::ws_handler;
