//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point and control loop for a WebSocket connection. A
//! client watches one document per connection and receives its workflow
//! events as they are published by the engine.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use signflow_core::domain::Actor;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, actor))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, actor: Actor) {
    info!("New WebSocket connection established for user: {}", actor.user_id);

    let (mut sender, mut receiver) = socket.split();

    // --- 1. Subscription Phase ---
    // The first message must be Watch; document access is checked with the
    // same rule the REST detail endpoint uses.
    let document_id: Uuid = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(&init_json) {
                Ok(ClientMessage::Watch { document_id }) => document_id,
                Err(e) => {
                    warn!("First message was not a valid Watch message: {}", e);
                    return;
                }
            }
        }
        _ => {
            warn!("Client disconnected before sending Watch message.");
            return;
        }
    };

    // Subscribe before the status snapshot so no event between the two is lost.
    let mut events: broadcast::Receiver<_> = app_state.events.subscribe();

    let status = match app_state.engine.get_document(document_id, &actor).await {
        Ok(bundle) => bundle.document.status.as_str().to_string(),
        Err(e) => {
            info!("Rejecting watch on document {}: {:?}", document_id, e);
            let err_msg = ServerMessage::Error {
                message: "Document not found or access denied.".to_string(),
            };
            send_message(&mut sender, &err_msg).await;
            return;
        }
    };

    let watching = ServerMessage::Watching {
        document_id,
        status,
    };
    if !send_message(&mut sender, &watching).await {
        return;
    }

    // --- 2. Main Loop ---
    // Forward matching events until either side goes away.
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if event.document_id() != document_id {
                        continue;
                    }
                    if !send_message(&mut sender, &ServerMessage::from(event)).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The client can refetch the document to resynchronize.
                    warn!("Event stream lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("Event stream closed while a watcher was connected.");
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client disconnected.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }

    info!("WebSocket connection closed.");
}

/// Serializes and sends one message, returning whether the socket is still usable.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}
