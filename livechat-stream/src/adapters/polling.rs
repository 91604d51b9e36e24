//! Pull-based polling adapter.
//!
//! Opens a chat session for the target, then alternates between fetching a
//! batch and sleeping a fixed interval until the session ends or the listener
//! is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::AdapterContext;
use crate::error::AdapterError;
use crate::types::ListenerState;

/// One message pulled from a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatItem {
    pub author: String,
    pub message: String,
}

impl ChatItem {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }
}

/// An open live-chat session.
#[async_trait]
pub trait ChatSession: Send {
    /// Whether the chat is still live. Checked before every fetch.
    fn is_alive(&self) -> bool;

    /// Next batch of items, oldest first. May be empty.
    async fn fetch_batch(&mut self) -> Result<Vec<ChatItem>, AdapterError>;
}

/// Opens [`ChatSession`]s for a target.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    async fn open(&self, target: &str) -> Result<Box<dyn ChatSession>, AdapterError>;
}

/// YouTube chat listener.
pub struct PollingAdapter {
    opener: Arc<dyn SessionOpener>,
    interval: Duration,
}

impl PollingAdapter {
    pub fn new(opener: Arc<dyn SessionOpener>, interval: Duration) -> Self {
        Self { opener, interval }
    }

    /// Run until the session ends, fails, or the listener is cancelled.
    pub async fn run(&self, ctx: &AdapterContext) -> Result<(), AdapterError> {
        ctx.transition(ListenerState::Connecting);
        let target = ctx.spec().target();

        let mut session = match ctx
            .cancel()
            .run_until_signaled(self.opener.open(target))
            .await
        {
            Some(session) => session?,
            None => return Err(AdapterError::Cancelled),
        };

        ctx.transition(ListenerState::Streaming);
        ctx.notice_info(format!("Polling live chat for {target}"));
        tracing::info!("Polling {} every {:?}", ctx.spec(), self.interval);

        loop {
            if ctx.cancel().is_signaled() {
                return Err(AdapterError::Cancelled);
            }

            if !session.is_alive() {
                tracing::info!("Live chat for {} ended", ctx.spec());
                ctx.notice_info("Live chat ended");
                return Ok(());
            }

            let batch = match ctx.cancel().run_until_signaled(session.fetch_batch()).await {
                Some(batch) => batch?,
                None => return Err(AdapterError::Cancelled),
            };

            if !batch.is_empty() {
                tracing::debug!("{} item(s) from {}", batch.len(), ctx.spec());
            }
            for item in batch {
                ctx.emit_chat(item.author, item.message);
            }

            if ctx
                .cancel()
                .run_until_signaled(tokio::time::sleep(self.interval))
                .await
                .is_none()
            {
                return Err(AdapterError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationController;
    use crate::sink::EventSink;
    use crate::types::{ListenerSpec, Platform, SinkEvent};
    use std::collections::VecDeque;

    /// Session serving scripted batches, then reporting not-alive.
    struct Scripted {
        batches: VecDeque<Result<Vec<ChatItem>, AdapterError>>,
    }

    #[async_trait]
    impl ChatSession for Scripted {
        fn is_alive(&self) -> bool {
            !self.batches.is_empty()
        }

        async fn fetch_batch(&mut self) -> Result<Vec<ChatItem>, AdapterError> {
            self.batches.pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    struct Opener(std::sync::Mutex<Option<Scripted>>);

    impl Opener {
        fn new(batches: Vec<Result<Vec<ChatItem>, AdapterError>>) -> Arc<Self> {
            Arc::new(Self(std::sync::Mutex::new(Some(Scripted {
                batches: batches.into(),
            }))))
        }
    }

    #[async_trait]
    impl SessionOpener for Opener {
        async fn open(&self, target: &str) -> Result<Box<dyn ChatSession>, AdapterError> {
            match self.0.lock().unwrap().take() {
                Some(session) => Ok(Box::new(session)),
                None => Err(AdapterError::Session(format!("{target} already opened"))),
            }
        }
    }

    fn context(sink: EventSink, cancel: CancellationController) -> AdapterContext {
        AdapterContext::new(ListenerSpec::new(Platform::YouTube, "vid1"), sink, cancel)
    }

    fn chat_authors(events: &crate::sink::EventStream) -> Vec<String> {
        events
            .try_iter()
            .filter_map(|e| match e {
                SinkEvent::Chat(chat) => Some(chat.author().to_string()),
                SinkEvent::Notice(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_emits_in_batch_order_until_session_ends() {
        let opener = Opener::new(vec![
            Ok(vec![ChatItem::new("a", "1"), ChatItem::new("b", "2")]),
            Ok(vec![]),
            Ok(vec![ChatItem::new("c", "3")]),
        ]);
        let adapter = PollingAdapter::new(opener, Duration::from_millis(5));
        let (sink, events) = EventSink::channel();
        let ctx = context(sink, CancellationController::new());

        assert_eq!(adapter.run(&ctx).await, Ok(()));
        assert_eq!(chat_authors(&events), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_error_is_session_error() {
        let opener = Opener::new(vec![
            Ok(vec![ChatItem::new("a", "1")]),
            Err(AdapterError::Session("HTTP 500".into())),
        ]);
        let adapter = PollingAdapter::new(opener, Duration::from_millis(5));
        let (sink, events) = EventSink::channel();
        let ctx = context(sink, CancellationController::new());

        assert_eq!(
            adapter.run(&ctx).await,
            Err(AdapterError::Session("HTTP 500".into()))
        );
        assert_eq!(chat_authors(&events), vec!["a"]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let opener = Opener::new(vec![Ok(vec![]), Ok(vec![])]);
        let adapter = PollingAdapter::new(opener, Duration::from_secs(60));
        let cancel = CancellationController::new();
        let ctx = context(EventSink::discard(), cancel.clone());

        let run = tokio::spawn(async move { adapter.run(&ctx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.signal();

        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("adapter should observe cancellation")
            .unwrap();
        assert_eq!(result, Err(AdapterError::Cancelled));
    }
}
