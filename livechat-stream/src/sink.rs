//! Event sink and blocking event stream
//!
//! The sink is the single fan-in point for every listener. It is invoked from
//! cooperative tasks and from push threads alike, so it must be `Send + Sync`
//! and must not block.
//!
//! # Example
//!
//! ```rust,ignore
//! use livechat_stream::EventSink;
//!
//! let (sink, events) = EventSink::channel();
//! // ... start a session with `sink` ...
//!
//! // Blocking iteration
//! for event in events.clone() {
//!     println!("{event}");
//! }
//!
//! // Non-blocking drain
//! for event in events.try_iter() {
//!     println!("{event}");
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use crate::types::SinkEvent;

/// Fire-and-forget destination for normalized events.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(SinkEvent) + Send + Sync>,
}

impl EventSink {
    /// Wrap a callback. It must return quickly; it runs on listener contexts.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(SinkEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(f),
        }
    }

    /// A sink backed by an unbounded channel, plus the receiving end.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx): (Sender<SinkEvent>, Receiver<SinkEvent>) = channel::unbounded();
        let sink = Self::from_fn(move |event| {
            // Consumer may have gone away; events are fire-and-forget
            let _ = tx.send(event);
        });
        (sink, EventStream { rx })
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::from_fn(|_| {})
    }

    /// Deliver one event.
    pub fn emit(&self, event: impl Into<SinkEvent>) {
        (self.deliver)(event.into());
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Blocking stream of sink events
///
/// All methods are synchronous. Clones share the same queue, each event is
/// received by exactly one of them.
#[derive(Clone)]
pub struct EventStream {
    rx: Receiver<SinkEvent>,
}

impl EventStream {
    /// Block until the next event is available
    ///
    /// Returns `None` once every sink clone has been dropped and the queue is empty.
    pub fn recv(&self) -> Option<SinkEvent> {
        self.rx.recv().ok()
    }

    /// Block until the next event or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SinkEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<SinkEvent> {
        self.rx.try_recv().ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Blocking iterator that stops after `timeout` without an event
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Iterator for EventStream {
    type Item = SinkEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIter<'a> {
    inner: &'a EventStream,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = SinkEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIter<'a> {
    inner: &'a EventStream,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIter<'a> {
    type Item = SinkEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatEvent, Platform};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn chat(author: &str) -> ChatEvent {
        ChatEvent::new(Platform::Twitch, author, "hi")
    }

    #[test]
    fn test_from_fn_is_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = {
            let count = count.clone();
            EventSink::from_fn(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        sink.emit(chat("a"));
        sink.clone().emit(chat("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_channel_preserves_order() {
        let (sink, events) = EventSink::channel();
        for author in ["a", "b", "c"] {
            sink.emit(chat(author));
        }

        let authors: Vec<String> = events
            .try_iter()
            .filter_map(|e| e.as_chat().map(|c| c.author().to_string()))
            .collect();
        assert_eq!(authors, vec!["a", "b", "c"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_sink, events) = EventSink::channel();
        let start = Instant::now();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_emit_from_other_thread() {
        let (sink, events) = EventSink::channel();
        thread::spawn(move || sink.emit(chat("remote")));

        let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(event.as_chat().unwrap().author(), "remote");
    }

    #[test]
    fn test_stream_ends_when_sinks_dropped() {
        let (sink, events) = EventSink::channel();
        sink.emit(chat("last"));
        drop(sink);

        let collected: Vec<SinkEvent> = events.collect();
        assert_eq!(collected.len(), 1);
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, events) = EventSink::channel();
        drop(events);
        sink.emit(chat("nobody listening"));
        EventSink::discard().emit(chat("void"));
    }
}
