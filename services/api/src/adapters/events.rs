//! services/api/src/adapters/events.rs
//!
//! In-process implementation of the `EventPublisher` port over a tokio
//! broadcast channel. The WebSocket layer subscribes to the same channel to
//! push workflow events to watching clients.

use async_trait::async_trait;
use signflow_core::domain::DocumentEvent;
use signflow_core::ports::EventPublisher;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans workflow events out to any number of subscribed watchers.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DocumentEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// A new subscription receiving every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: DocumentEvent) {
        // send only fails when there are no subscribers, which is the normal
        // state whenever nobody is watching; the workflow does not care.
        if self.sender.send(event).is_err() {
            debug!("Document event published with no active watchers");
        }
    }
}
