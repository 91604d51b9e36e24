//! Handles and reports exchanged with the supervisor.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::Sender;

use crate::adapters::push::CloseSlot;
use crate::adapters::{AdapterContext, StateCell};
use crate::types::{ListenerId, ListenerSpec, ListenerState, SessionId};

/// Identifies a started session. Returned by `start`, consumed by `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub(crate) id: SessionId,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Point-in-time view of one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSnapshot {
    pub id: ListenerId,
    pub spec: ListenerSpec,
    pub state: ListenerState,
}

/// Outcome of a clean `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub session_id: SessionId,
    /// Final state of every listener, in start order
    pub listeners: Vec<ListenerSnapshot>,
}

impl StopReport {
    pub(crate) fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            listeners: Vec::new(),
        }
    }

    /// True when the handle was stale and nothing was stopped.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ListenerSnapshot> {
        self.listeners
            .iter()
            .filter(|l| matches!(l.state, ListenerState::Failed(_)))
    }
}

/// Supervisor-side record of a live listener.
#[derive(Debug, Clone)]
pub(crate) struct ListenerHandle {
    pub(crate) spec: ListenerSpec,
    pub(crate) state: Arc<StateCell>,
}

/// How a listener is executing.
pub(crate) enum ExecutionUnit {
    /// Cooperative task on the session's scheduler
    Task(tokio::task::AbortHandle),
    /// Dedicated thread running a push client
    Thread {
        join: JoinHandle<()>,
        close: CloseSlot,
    },
    /// Never started, already terminal
    Inert,
}

impl ExecutionUnit {
    /// Ask the unit to return promptly. Only push threads need this.
    pub(crate) fn request_close(&self) {
        if let ExecutionUnit::Thread { close, .. } = self {
            if let Some(handle) = close.lock().ok().and_then(|slot| slot.clone()) {
                handle.close();
            }
        }
    }

    /// Forcibly terminate. Threads cannot be killed, so they are closed and detached.
    pub(crate) fn terminate(self) {
        match self {
            ExecutionUnit::Task(abort) => abort.abort(),
            ExecutionUnit::Thread { join, close } => {
                if let Some(handle) = close.lock().ok().and_then(|slot| slot.clone()) {
                    handle.close();
                }
                tracing::debug!(
                    "detaching push thread {:?}",
                    join.thread().name().unwrap_or("unnamed")
                );
                drop(join);
            }
            ExecutionUnit::Inert => {}
        }
    }

    /// Reap a unit that has already reported completion.
    pub(crate) fn reap(self) {
        if let ExecutionUnit::Thread { join, .. } = self {
            if join.join().is_err() {
                tracing::warn!("push thread panicked");
            }
        }
    }
}

/// Reports a listener's completion when its execution unit drops it.
///
/// Dropped on normal return, on panic, and when an aborted task is dropped.
/// A listener that never reached a terminal state is marked failed and the
/// failure is reported to the sink.
pub(crate) struct CompletionGuard {
    id: ListenerId,
    ctx: AdapterContext,
    done: Sender<ListenerId>,
}

impl CompletionGuard {
    pub(crate) fn new(id: ListenerId, ctx: AdapterContext, done: Sender<ListenerId>) -> Self {
        Self { id, ctx, done }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.ctx.state().is_terminal() {
            let cause = if std::thread::panicking() {
                "listener panicked"
            } else {
                "listener ended unexpectedly"
            };
            if self.ctx.transition(ListenerState::Failed(cause.to_string())) {
                tracing::error!("{} {}", self.ctx.spec(), cause);
                self.ctx.notice_error(format!(
                    "{} listener for {} failed: {}",
                    self.ctx.spec().platform(),
                    self.ctx.spec().target(),
                    cause
                ));
            }
        }
        let _ = self.done.send(self.id);
    }
}
