//! Push-event adapter for TikTok comments.
//!
//! The client behind a [`PushBackend`] owns its run-loop and invokes comment
//! callbacks on its own execution context. The adapter therefore runs on a
//! dedicated OS thread. Every callback checks the cancellation signal and,
//! once it is set, closes the client synchronously instead of emitting.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::AdapterContext;
use crate::error::AdapterError;
use crate::types::{ChatEvent, ListenerState};

/// One pushed comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushComment {
    pub author: String,
    pub comment: String,
}

impl PushComment {
    pub fn new(author: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            comment: comment.into(),
        }
    }
}

/// Callback invoked by a push client for every comment.
pub type CommentCallback = Box<dyn Fn(PushComment) + Send + Sync>;

/// Requests a push client's run-loop to return.
///
/// Closing never blocks and only the first call has an effect.
#[derive(Clone)]
pub struct PushCloseHandle {
    closed: Arc<AtomicBool>,
    close: Arc<dyn Fn() + Send + Sync>,
}

impl PushCloseHandle {
    pub fn new<F>(close: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            close: Arc::new(close),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            (self.close)();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PushCloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// An event-driven comment client with a blocking run-loop.
pub trait PushClient: Send {
    fn add_comment_listener(&mut self, callback: CommentCallback);

    /// Handle that makes [`run`](PushClient::run) return. Valid before and during `run`.
    fn close_handle(&self) -> PushCloseHandle;

    /// Block the calling thread, dispatching comments until closed.
    fn run(&mut self) -> Result<(), AdapterError>;

    /// Human readable description of where comments come from.
    fn describe(&self) -> String {
        "push client".to_string()
    }
}

/// Whether a push backend can be used in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCapability {
    Available,
    Unavailable { reason: String },
}

impl PushCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, PushCapability::Available)
    }
}

/// Creates push clients.
pub trait PushBackend: Send + Sync {
    /// Checked once when the supervisor is built.
    fn check_capability(&self) -> PushCapability;

    fn connect(&self, target: &str) -> Result<Box<dyn PushClient>, AdapterError>;
}

/// Backend used when no push client is compiled in.
#[derive(Debug, Clone)]
pub struct UnavailablePushBackend {
    reason: String,
}

impl UnavailablePushBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PushBackend for UnavailablePushBackend {
    fn check_capability(&self) -> PushCapability {
        PushCapability::Unavailable {
            reason: self.reason.clone(),
        }
    }

    fn connect(&self, _target: &str) -> Result<Box<dyn PushClient>, AdapterError> {
        Err(AdapterError::Unavailable(self.reason.clone()))
    }
}

/// Slot through which the supervisor reaches a running client's close handle.
pub type CloseSlot = Arc<Mutex<Option<PushCloseHandle>>>;

/// TikTok comment listener.
pub struct PushAdapter {
    backend: Arc<dyn PushBackend>,
}

impl PushAdapter {
    pub fn new(backend: Arc<dyn PushBackend>) -> Self {
        Self { backend }
    }

    /// Run the client's loop on the calling thread.
    ///
    /// `close_slot` receives the client's close handle as soon as it exists.
    pub fn run_blocking(
        &self,
        ctx: &AdapterContext,
        close_slot: &CloseSlot,
    ) -> Result<(), AdapterError> {
        ctx.transition(ListenerState::Connecting);

        if ctx.cancel().is_signaled() {
            return Err(AdapterError::Cancelled);
        }

        let target = ctx.spec().target().to_string();
        let mut client = self.backend.connect(&target)?;
        let close = client.close_handle();

        if let Ok(mut slot) = close_slot.lock() {
            *slot = Some(close.clone());
        }
        // stop may have run between connect and publishing the handle
        if ctx.cancel().is_signaled() {
            close.close();
        }

        let platform = ctx.spec().platform();
        let cancel = ctx.cancel().clone();
        let sink = ctx.sink().clone();
        let callback_close = close.clone();
        client.add_comment_listener(Box::new(move |comment: PushComment| {
            if cancel.is_signaled() {
                callback_close.close();
                return;
            }
            sink.emit(ChatEvent::new(platform, comment.author, comment.comment));
        }));

        ctx.transition(ListenerState::Streaming);
        let source = client.describe();
        ctx.notice_info(format!("Listening for comments via {source}"));
        tracing::info!("{} listening via {}", ctx.spec(), source);

        let result = client.run();

        if ctx.cancel().is_signaled() {
            return Err(AdapterError::Cancelled);
        }
        result
    }
}
