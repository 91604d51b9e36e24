//! Push backend fed by comment relays posting to a local HTTP receiver.
//!
//! Each client owns a current-thread runtime and a [`CallbackServer`]. A relay
//! posts `{"user": {"nickname": ..}, "comment": ..}` to
//! `/comments/<user>`; the client's run-loop decodes every body and hands it
//! to the registered comment listeners on the client's own thread.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;

use callback_server::{CallbackServer, NotificationPayload};
use serde::Deserialize;
use tokio::sync::{mpsc, Notify};

use super::push::{
    CommentCallback, PushBackend, PushCapability, PushClient, PushCloseHandle, PushComment,
};
use crate::error::AdapterError;

#[derive(Debug, Deserialize)]
struct WebhookComment {
    user: WebhookUser,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct WebhookUser {
    nickname: String,
}

/// Push backend backed by the local callback server.
#[derive(Debug, Clone)]
pub struct WebhookPushBackend {
    port_range: (u16, u16),
}

impl WebhookPushBackend {
    pub fn new(port_range: (u16, u16)) -> Self {
        Self { port_range }
    }
}

impl PushBackend for WebhookPushBackend {
    fn check_capability(&self) -> PushCapability {
        let (start, end) = self.port_range;
        let free = (start..=end).any(|port| {
            TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
        });

        if free {
            PushCapability::Available
        } else {
            PushCapability::Unavailable {
                reason: format!("no free callback port in {start}-{end}"),
            }
        }
    }

    fn connect(&self, target: &str) -> Result<Box<dyn PushClient>, AdapterError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AdapterError::Unavailable(format!("push runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let server = runtime
            .block_on(CallbackServer::new(self.port_range, tx))
            .map_err(|e| AdapterError::Connection(e.to_string()))?;

        runtime.block_on(server.router().register(target.to_string()));
        let url = server.comments_url(target);
        tracing::debug!("Push client for {} registered at {}", target, url);

        let closer = Arc::new(Notify::new());
        let close = {
            let closer = closer.clone();
            // notify_one stores a permit, so a close issued before `run` still ends it
            PushCloseHandle::new(move || closer.notify_one())
        };

        Ok(Box::new(WebhookPushClient {
            runtime,
            server: Some(server),
            rx,
            listeners: Vec::new(),
            closer,
            close,
            url,
        }))
    }
}

/// Client whose run-loop drains bodies routed by its callback server.
pub struct WebhookPushClient {
    runtime: tokio::runtime::Runtime,
    server: Option<CallbackServer>,
    rx: mpsc::UnboundedReceiver<NotificationPayload>,
    listeners: Vec<CommentCallback>,
    closer: Arc<Notify>,
    close: PushCloseHandle,
    url: String,
}

impl WebhookPushClient {
    fn dispatch(listeners: &[CommentCallback], payload: &NotificationPayload) {
        match serde_json::from_str::<WebhookComment>(&payload.body) {
            Ok(comment) => {
                let comment = PushComment::new(comment.user.nickname, comment.comment);
                for listener in listeners {
                    listener(comment.clone());
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Dropping malformed comment for {}: {}",
                    payload.stream_id,
                    e
                );
            }
        }
    }
}

impl PushClient for WebhookPushClient {
    fn add_comment_listener(&mut self, callback: CommentCallback) {
        self.listeners.push(callback);
    }

    fn close_handle(&self) -> PushCloseHandle {
        self.close.clone()
    }

    fn run(&mut self) -> Result<(), AdapterError> {
        let Self {
            runtime,
            server,
            rx,
            listeners,
            closer,
            ..
        } = self;

        runtime.block_on(async {
            loop {
                tokio::select! {
                    _ = closer.notified() => {
                        tracing::debug!("Push client closed");
                        break;
                    }
                    payload = rx.recv() => match payload {
                        Some(payload) => Self::dispatch(listeners, &payload),
                        None => break,
                    },
                }
            }

            if let Some(server) = server.take() {
                if let Err(e) = server.shutdown().await {
                    tracing::warn!("Callback server shutdown failed: {}", e);
                }
            }
        });

        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn post(url: &str, body: &'static str) -> reqwest::StatusCode {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            reqwest::Client::new()
                .post(url)
                .body(body)
                .send()
                .await
                .unwrap()
                .status()
        })
    }

    #[test]
    fn test_capability_reports_busy_range() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let backend = WebhookPushBackend::new((port, port));
        assert!(!backend.check_capability().is_available());
        assert!(matches!(
            backend.connect("streamer"),
            Err(AdapterError::Connection(_))
        ));
    }

    #[test]
    fn test_pushed_comments_reach_listeners() {
        let backend = WebhookPushBackend::new((53000, 53100));
        assert!(backend.check_capability().is_available());

        let mut client = backend.connect("streamer").unwrap();
        let url = client.describe();
        assert!(url.ends_with("/comments/streamer"));

        let received = Arc::new(Mutex::new(Vec::new()));
        let close = client.close_handle();
        {
            let received = received.clone();
            let close = close.clone();
            client.add_comment_listener(Box::new(move |comment| {
                received.lock().unwrap().push(comment);
                close.close();
            }));
        }

        let poster = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let malformed = post(&url, "not json");
            let ok = post(&url, r#"{"user":{"nickname":"carol"},"comment":"first!"}"#);
            (malformed, ok)
        });

        client.run().unwrap();
        let (malformed, ok) = poster.join().unwrap();

        // Routing succeeds; decoding failures are the client's concern
        assert_eq!(malformed, 200);
        assert_eq!(ok, 200);
        assert_eq!(
            received.lock().unwrap().as_slice(),
            &[PushComment::new("carol", "first!")]
        );
    }

    #[test]
    fn test_close_before_run_returns_immediately() {
        let backend = WebhookPushBackend::new((53100, 53200));
        let mut client = backend.connect("someone").unwrap();
        client.close_handle().close();
        assert_eq!(client.run(), Ok(()));
    }
}
