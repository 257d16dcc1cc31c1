//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for live document status updates.

use serde::{Deserialize, Serialize};
use signflow_core::domain::DocumentEvent;
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribes the connection to one document's workflow events. This must
    /// be the first message sent on the connection.
    Watch { document_id: Uuid },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the subscription, echoing the document's current status so
    /// the client does not start from a stale view.
    Watching { document_id: Uuid, status: String },

    /// The document was sent and pending signatures were created.
    DocumentSent {
        document_id: Uuid,
        signature_ids: Vec<Uuid>,
    },

    /// One signature was recorded. `completed` is true on the signature that
    /// completed the document.
    DocumentSigned {
        document_id: Uuid,
        signature_id: Uuid,
        completed: bool,
    },

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}

impl From<DocumentEvent> for ServerMessage {
    fn from(event: DocumentEvent) -> Self {
        match event {
            DocumentEvent::DocumentSent {
                document_id,
                signature_ids,
            } => ServerMessage::DocumentSent {
                document_id,
                signature_ids,
            },
            DocumentEvent::DocumentSigned {
                document_id,
                signature_id,
                completed,
            } => ServerMessage::DocumentSigned {
                document_id,
                signature_id,
                completed,
            },
        }
    }
}
