//! Aggregation supervisor
//!
//! Starts one adapter per listener spec and fans their output into a single
//! sink. Two execution regimes are bridged:
//!
//! - IRC and polling adapters run as cooperative tasks on a per-session
//!   current-thread runtime, driven by a dedicated `livechat-coop` thread.
//! - Push adapters run on their own `livechat-push` thread, because their
//!   client blocks inside its run-loop.
//!
//! Every execution unit reports completion on one channel. `stop` signals the
//! session's cancellation controller once, waits on that channel up to the
//! grace period, then force-terminates whatever is left.

mod builder;
mod handle;

pub use builder::SupervisorBuilder;
pub use handle::{ListenerSnapshot, SessionHandle, StopReport};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::adapters::irc::{IrcAdapter, LineConnector};
use crate::adapters::polling::{PollingAdapter, SessionOpener};
use crate::adapters::push::{CloseSlot, PushAdapter, PushBackend, PushCapability};
use crate::adapters::{finish, AdapterContext, StateCell};
use crate::cancel::CancellationController;
use crate::config::StreamConfig;
use crate::credentials::Credentials;
use crate::error::{AdapterError, Result, SupervisorError};
use crate::sink::EventSink;
use crate::types::{
    AdapterKind, ListenerId, ListenerSpec, ListenerState, Notice, NoticeLevel, Platform, SessionId,
};
use handle::{CompletionGuard, ExecutionUnit, ListenerHandle};

/// How long the cooperative driver thread gets to wind down after `stop`.
const COOP_SHUTDOWN_WAIT: Duration = Duration::from_millis(500);

/// Current-thread runtime driven by a dedicated thread.
struct CooperativeDomain {
    handle: tokio::runtime::Handle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
    /// Disconnects once the driver thread has finished
    exited: Receiver<()>,
}

impl CooperativeDomain {
    fn start(session: SessionId) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SupervisorError::Runtime(format!("cooperative runtime: {e}")))?;

        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (exited_tx, exited) = channel::bounded::<()>(1);

        let driver = thread::Builder::new()
            .name("livechat-coop".to_string())
            .spawn(move || {
                let _exited = exited_tx;
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                // Remaining tasks are dropped here
                runtime.shutdown_timeout(COOP_SHUTDOWN_WAIT);
                tracing::debug!("cooperative runtime for {} shut down", session);
            })
            .map_err(|e| SupervisorError::Runtime(format!("cooperative driver thread: {e}")))?;

        Ok(Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
            driver: Some(driver),
            exited,
        })
    }

    /// Stop driving tasks and join the driver, waiting at most `wait`.
    fn shutdown(&mut self, wait: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(driver) = self.driver.take() {
            match self.exited.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("cooperative driver did not exit in {:?}, detaching", wait);
                }
                _ => {
                    let _ = driver.join();
                }
            }
        }
    }
}

impl Drop for CooperativeDomain {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

/// Everything owned by one start..stop session.
struct ActiveSession {
    id: SessionId,
    cancel: CancellationController,
    sink: EventSink,
    /// Execution units in start order
    units: Vec<(ListenerId, ExecutionUnit)>,
    completions: Receiver<ListenerId>,
    coop: CooperativeDomain,
}

/// Starts, tracks and stops listener sessions.
///
/// At most one session is active at a time. All methods take `&self`, so a
/// supervisor can be shared across threads behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use livechat_stream::{EventSink, ListenerSpec, Platform, Supervisor};
///
/// let supervisor = Supervisor::builder().build()?;
/// let (sink, events) = EventSink::channel();
///
/// let session = supervisor.start(
///     vec![
///         ListenerSpec::new(Platform::Twitch, "somechannel"),
///         ListenerSpec::new(Platform::YouTube, "dQw4w9WgXcQ"),
///     ],
///     sink,
/// )?;
///
/// for event in events.timeout_iter(std::time::Duration::from_secs(30)) {
///     println!("{event}");
/// }
///
/// supervisor.stop(session)?;
/// ```
pub struct Supervisor {
    config: StreamConfig,
    credentials: Credentials,
    connector: Arc<dyn LineConnector>,
    opener: Arc<dyn SessionOpener>,
    push_backend: Arc<dyn PushBackend>,
    push_capability: PushCapability,
    active: Mutex<Option<ActiveSession>>,
    listeners: DashMap<ListenerId, ListenerHandle>,
    next_listener_id: AtomicU64,
}

impl Supervisor {
    /// Supervisor with default configuration and production backends.
    pub fn new() -> Result<Self> {
        SupervisorBuilder::new().build()
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    pub(crate) fn from_parts(
        config: StreamConfig,
        credentials: Credentials,
        connector: Arc<dyn LineConnector>,
        opener: Arc<dyn SessionOpener>,
        push_backend: Arc<dyn PushBackend>,
        push_capability: PushCapability,
    ) -> Self {
        Self {
            config,
            credentials,
            connector,
            opener,
            push_backend,
            push_capability,
            active: Mutex::new(None),
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Result of the push backend capability check made at build time.
    pub fn push_capability(&self) -> &PushCapability {
        &self.push_capability
    }

    /// Start one listener per spec, delivering everything to `sink`.
    ///
    /// Fails with `SessionAlreadyActive` while a previous session has not been
    /// stopped. Duplicate specs are started once.
    pub fn start(&self, specs: Vec<ListenerSpec>, sink: EventSink) -> Result<SessionHandle> {
        let mut active = self.lock_active();
        if active.is_some() {
            return Err(SupervisorError::SessionAlreadyActive);
        }

        if specs.is_empty() {
            return Err(SupervisorError::NoListeners);
        }
        if let Some(invalid) = specs.iter().find(|spec| !spec.is_valid()) {
            return Err(SupervisorError::InvalidSpec(format!(
                "{} has an empty target",
                invalid.platform()
            )));
        }

        let mut seen = HashSet::new();
        let specs: Vec<ListenerSpec> = specs
            .into_iter()
            .filter(|spec| {
                let first = seen.insert(spec.clone());
                if !first {
                    tracing::warn!("Ignoring duplicate listener {}", spec);
                }
                first
            })
            .collect();

        let session_id = SessionId::new();
        let cancel = CancellationController::new();
        let coop = CooperativeDomain::start(session_id)?;
        let (done_tx, done_rx) = channel::unbounded();

        let mut units = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = ListenerId::new(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
            let state = Arc::new(StateCell::new());
            let ctx = AdapterContext::with_state(
                spec.clone(),
                sink.clone(),
                cancel.clone(),
                state.clone(),
            );
            let guard = CompletionGuard::new(id, ctx.clone(), done_tx.clone());

            tracing::debug!("Starting {} as {}", spec, id);
            let unit = match spec.platform().kind() {
                AdapterKind::Irc => self.spawn_irc(&coop, ctx, guard),
                AdapterKind::Polling => self.spawn_polling(&coop, ctx, guard),
                AdapterKind::Push => self.spawn_push(ctx, guard),
            };

            self.listeners.insert(id, ListenerHandle { spec, state });
            units.push((id, unit));
        }

        tracing::info!("Session {} started with {} listener(s)", session_id, units.len());

        *active = Some(ActiveSession {
            id: session_id,
            cancel,
            sink,
            units,
            completions: done_rx,
            coop,
        });

        Ok(SessionHandle { id: session_id })
    }

    fn spawn_irc(
        &self,
        coop: &CooperativeDomain,
        ctx: AdapterContext,
        guard: CompletionGuard,
    ) -> ExecutionUnit {
        let adapter = IrcAdapter::new(
            self.connector.clone(),
            self.config.irc_endpoint.clone(),
            self.credentials.token(Platform::Twitch),
            self.credentials.nickname(),
        );
        let task = coop.handle.spawn(async move {
            let _guard = guard;
            let result = adapter.run(&ctx).await;
            finish(&ctx, result);
        });
        ExecutionUnit::Task(task.abort_handle())
    }

    fn spawn_polling(
        &self,
        coop: &CooperativeDomain,
        ctx: AdapterContext,
        guard: CompletionGuard,
    ) -> ExecutionUnit {
        let adapter = PollingAdapter::new(self.opener.clone(), self.config.poll_interval);
        let task = coop.handle.spawn(async move {
            let _guard = guard;
            let result = adapter.run(&ctx).await;
            finish(&ctx, result);
        });
        ExecutionUnit::Task(task.abort_handle())
    }

    fn spawn_push(&self, ctx: AdapterContext, guard: CompletionGuard) -> ExecutionUnit {
        if let PushCapability::Unavailable { reason } = &self.push_capability {
            finish(&ctx, Err(AdapterError::Unavailable(reason.clone())));
            return ExecutionUnit::Inert;
        }

        let adapter = PushAdapter::new(self.push_backend.clone());
        let close = CloseSlot::default();
        let thread_close = close.clone();
        let thread_ctx = ctx.clone();

        let spawned = thread::Builder::new()
            .name("livechat-push".to_string())
            .spawn(move || {
                let _guard = guard;
                let result = adapter.run_blocking(&thread_ctx, &thread_close);
                finish(&thread_ctx, result);
            });

        match spawned {
            Ok(join) => ExecutionUnit::Thread { join, close },
            Err(e) => {
                finish(&ctx, Err(AdapterError::Unavailable(format!("push thread: {e}"))));
                ExecutionUnit::Inert
            }
        }
    }

    /// Stop the session identified by `handle`.
    ///
    /// Signals cancellation once, then waits up to the grace period for every
    /// listener. Stragglers are terminated, reported to the sink and returned
    /// in `ForcedTermination`. A stale or already stopped handle is a no-op.
    pub fn stop(&self, handle: SessionHandle) -> Result<StopReport> {
        let mut active = self.lock_active();
        let mut session = match active.take() {
            Some(session) if session.id == handle.id => session,
            other => {
                *active = other;
                tracing::debug!("stop for inactive session {}", handle.id);
                return Ok(StopReport::empty(handle.id));
            }
        };

        tracing::info!("Stopping session {}", session.id);
        session.cancel.signal();

        for (id, unit) in &session.units {
            if let Some(listener) = self.listeners.get(id) {
                if !listener.state.get().is_terminal() {
                    listener.state.transition(ListenerState::Stopping);
                }
            }
            unit.request_close();
        }

        let mut pending: HashSet<ListenerId> = session.units.iter().map(|(id, _)| *id).collect();
        let deadline = Instant::now() + self.config.grace_period;
        while !pending.is_empty() {
            match session.completions.recv_deadline(deadline) {
                Ok(id) => {
                    pending.remove(&id);
                }
                Err(_) => break,
            }
        }

        let mut forced = Vec::new();
        let mut snapshots = Vec::with_capacity(session.units.len());
        for (id, unit) in std::mem::take(&mut session.units) {
            let Some((_, listener)) = self.listeners.remove(&id) else {
                continue;
            };

            if pending.contains(&id) {
                listener.state.transition(ListenerState::Failed(
                    "did not stop within grace period".to_string(),
                ));
                session.sink.emit(Notice::new(
                    &listener.spec,
                    NoticeLevel::Error,
                    format!(
                        "{} listener for {} did not stop within {:?} and was terminated",
                        listener.spec.platform(),
                        listener.spec.target(),
                        self.config.grace_period
                    ),
                ));
                tracing::warn!("Forcing termination of {} ({})", listener.spec, id);
                unit.terminate();
                forced.push(listener.spec.clone());
            } else {
                unit.reap();
            }

            snapshots.push(ListenerSnapshot {
                id,
                spec: listener.spec,
                state: listener.state.get(),
            });
        }

        session.coop.shutdown(COOP_SHUTDOWN_WAIT);

        if !forced.is_empty() {
            return Err(SupervisorError::ForcedTermination { listeners: forced });
        }

        tracing::info!("Session {} stopped", session.id);
        Ok(StopReport {
            session_id: session.id,
            listeners: snapshots,
        })
    }

    /// Snapshot of the active session's listeners, in start order.
    pub fn listeners(&self) -> Vec<ListenerSnapshot> {
        let mut snapshots: Vec<ListenerSnapshot> = self
            .listeners
            .iter()
            .map(|entry| ListenerSnapshot {
                id: *entry.key(),
                spec: entry.spec.clone(),
                state: entry.state.get(),
            })
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// True when every listener of the active session is `Stopped` or `Failed`.
    pub fn all_finished(&self) -> bool {
        self.listeners
            .iter()
            .all(|entry| entry.state.get().is_terminal())
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Handle of the active session, if any.
    pub fn active_session(&self) -> Option<SessionHandle> {
        self.lock_active()
            .as_ref()
            .map(|session| SessionHandle { id: session.id })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.active_session() {
            if let Err(e) = self.stop(handle) {
                tracing::warn!("Stopping session on drop: {}", e);
            }
        }
    }
}
