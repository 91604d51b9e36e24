//! Per-platform protocol adapters
//!
//! Every adapter runs against an [`AdapterContext`], which carries the
//! listener's spec, the shared sink, the session's cancellation controller
//! and the listener's state cell. Adapters report how they ended through an
//! `AdapterError`; [`finish`] turns that into the terminal state and, for
//! failures, an error notice on the sink.

pub mod irc;
pub mod polling;
pub mod push;
#[cfg(feature = "push-webhook")]
pub mod webhook;
pub mod websocket;
pub mod youtube;

use std::sync::{Arc, Mutex};

use crate::cancel::CancellationController;
use crate::error::AdapterError;
use crate::sink::EventSink;
use crate::types::{ChatEvent, ListenerSpec, ListenerState, Notice, NoticeLevel};

/// Shared, validated listener state.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<ListenerState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ListenerState::Idle),
        }
    }

    pub(crate) fn get(&self) -> ListenerState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `next` if the transition is legal. Illegal transitions are ignored.
    pub(crate) fn transition(&self, next: ListenerState) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.can_transition_to(&next) {
            tracing::trace!("listener state {} -> {}", *state, next);
            *state = next;
            true
        } else {
            tracing::debug!("ignoring listener transition {} -> {}", *state, next);
            false
        }
    }
}

/// Everything an adapter needs while running.
#[derive(Clone)]
pub struct AdapterContext {
    spec: ListenerSpec,
    sink: EventSink,
    cancel: CancellationController,
    state: Arc<StateCell>,
}

impl AdapterContext {
    /// A context with its own fresh state cell, starting in `Idle`.
    pub fn new(spec: ListenerSpec, sink: EventSink, cancel: CancellationController) -> Self {
        Self::with_state(spec, sink, cancel, Arc::new(StateCell::new()))
    }

    pub(crate) fn with_state(
        spec: ListenerSpec,
        sink: EventSink,
        cancel: CancellationController,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            spec,
            sink,
            cancel,
            state,
        }
    }

    pub fn spec(&self) -> &ListenerSpec {
        &self.spec
    }

    pub fn cancel(&self) -> &CancellationController {
        &self.cancel
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Current listener state.
    pub fn state(&self) -> ListenerState {
        self.state.get()
    }

    pub fn transition(&self, next: ListenerState) -> bool {
        self.state.transition(next)
    }

    /// Emit one chat event stamped now.
    pub fn emit_chat(&self, author: impl Into<String>, message: impl Into<String>) {
        self.sink
            .emit(ChatEvent::new(self.spec.platform(), author, message));
    }

    pub fn notice_info(&self, message: impl Into<String>) {
        self.sink
            .emit(Notice::new(&self.spec, NoticeLevel::Info, message));
    }

    pub fn notice_error(&self, message: impl Into<String>) {
        self.sink
            .emit(Notice::new(&self.spec, NoticeLevel::Error, message));
    }
}

/// Settle the listener's terminal state from how its adapter returned.
///
/// `Ok` and `Cancelled` end in `Stopped`. Anything else ends in `Failed` and
/// is reported to the sink with its cause.
pub fn finish(ctx: &AdapterContext, result: Result<(), AdapterError>) {
    match result {
        Ok(()) | Err(AdapterError::Cancelled) => {
            if ctx.state() != ListenerState::Stopping {
                ctx.transition(ListenerState::Stopping);
            }
            ctx.transition(ListenerState::Stopped);
            tracing::info!("{} stopped", ctx.spec());
        }
        Err(e) => {
            tracing::warn!("{} failed: {}", ctx.spec(), e);
            if ctx.transition(ListenerState::Failed(e.to_string())) {
                ctx.notice_error(format!(
                    "{} listener for {} failed: {}",
                    ctx.spec().platform(),
                    ctx.spec().target(),
                    e
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Platform, SinkEvent};

    fn context() -> (AdapterContext, crate::sink::EventStream) {
        let (sink, events) = EventSink::channel();
        let ctx = AdapterContext::new(
            ListenerSpec::new(Platform::YouTube, "vid1"),
            sink,
            CancellationController::new(),
        );
        (ctx, events)
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let (ctx, _events) = context();
        assert!(!ctx.transition(ListenerState::Streaming));
        assert_eq!(ctx.state(), ListenerState::Idle);
        assert!(ctx.transition(ListenerState::Connecting));
        assert!(ctx.transition(ListenerState::Streaming));
    }

    #[test]
    fn test_finish_ok_stops() {
        let (ctx, events) = context();
        ctx.transition(ListenerState::Connecting);
        ctx.transition(ListenerState::Streaming);

        finish(&ctx, Ok(()));
        assert_eq!(ctx.state(), ListenerState::Stopped);
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_finish_cancelled_after_stopping() {
        let (ctx, _events) = context();
        ctx.transition(ListenerState::Stopping);

        finish(&ctx, Err(AdapterError::Cancelled));
        assert_eq!(ctx.state(), ListenerState::Stopped);
    }

    #[test]
    fn test_finish_error_fails_and_notifies() {
        let (ctx, events) = context();
        ctx.transition(ListenerState::Connecting);

        finish(&ctx, Err(AdapterError::Session("quota exceeded".into())));
        assert!(matches!(ctx.state(), ListenerState::Failed(cause) if cause.contains("quota")));

        match events.try_recv() {
            Some(SinkEvent::Notice(notice)) => {
                assert!(notice.is_error());
                assert_eq!(notice.platform, Platform::YouTube);
                assert!(notice.message.contains("YouTube listener for vid1 failed"));
            }
            other => panic!("expected error notice, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_does_not_overwrite_terminal_state() {
        let (ctx, events) = context();
        ctx.transition(ListenerState::Failed("did not stop".into()));

        finish(&ctx, Err(AdapterError::Connection("late".into())));
        assert_eq!(ctx.state(), ListenerState::Failed("did not stop".into()));
        assert!(events.try_recv().is_none());
    }
}
