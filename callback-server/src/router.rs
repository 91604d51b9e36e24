//! Stream registry deciding which pushed bodies are accepted.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

/// A pushed body, undecoded, with the stream it was posted for.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// Stream ID as it appeared in the request path
    pub stream_id: String,
    pub body: String,
}

/// Set of stream IDs the server accepts bodies for.
///
/// IDs are compared case-insensitively: streamer handles are not
/// case-sensitive, and relays are inconsistent about casing.
///
/// ```
/// use callback_server::router::{EventRouter, NotificationPayload};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
/// let router = EventRouter::new(tx);
///
/// router.register("Streamer".to_string()).await;
/// assert!(router.route_event("streamer".to_string(), "{}".to_string()).await);
/// assert_eq!(rx.recv().await.unwrap().stream_id, "streamer");
/// # }
/// ```
#[derive(Clone)]
pub struct EventRouter {
    streams: Arc<RwLock<HashSet<String>>>,
    sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    pub fn new(sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashSet::new())),
            sender,
        }
    }

    pub async fn register(&self, stream_id: String) {
        tracing::debug!("accepting comments for {}", stream_id);
        self.streams.write().await.insert(stream_id.to_lowercase());
    }

    pub async fn unregister(&self, stream_id: &str) {
        self.streams.write().await.remove(&stream_id.to_lowercase());
    }

    pub async fn is_registered(&self, stream_id: &str) -> bool {
        self.streams.read().await.contains(&stream_id.to_lowercase())
    }

    /// Forward `body` if `stream_id` is registered. Returns whether it was.
    pub async fn route_event(&self, stream_id: String, body: String) -> bool {
        if !self.is_registered(&stream_id).await {
            tracing::debug!("dropping body for unregistered stream {}", stream_id);
            return false;
        }

        // The receiving client may already be gone while shutting down
        let _ = self.sender.send(NotificationPayload { stream_id, body });
        true
    }
}
