//! Multi-platform live chat aggregation
//!
//! `livechat-stream` listens to Twitch (IRC over WebSocket), YouTube (polled
//! Data API) and TikTok (pushed comments) at the same time and delivers every
//! chat line to one [`EventSink`] as a normalized [`ChatEvent`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livechat_stream::{Credentials, EventSink, ListenerSpec, Platform, Supervisor};
//!
//! let supervisor = Supervisor::builder()
//!     .with_credentials(Credentials::load("api_keys.json"))
//!     .build()?;
//!
//! let (sink, events) = EventSink::channel();
//! let session = supervisor.start(
//!     vec![
//!         ListenerSpec::new(Platform::Twitch, "somechannel"),
//!         ListenerSpec::new(Platform::TikTok, "someone"),
//!     ],
//!     sink,
//! )?;
//!
//! for event in events.try_iter() {
//!     println!("{event}");
//! }
//!
//! supervisor.stop(session)?;
//! ```
//!
//! # Architecture
//!
//! - **Adapters**: one per platform family, see [`adapters`]
//! - **Supervisor**: owns the session, its cancellation controller and every
//!   execution unit, see [`Supervisor`]
//! - **Sink**: thread-safe fan-in for chat events and listener notices

pub mod adapters;
pub mod cancel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod sink;
pub mod supervisor;
pub mod types;

pub use adapters::irc::{parse_line, IrcLine, LineConnector, LineTransport, TWITCH_IRC_URL};
pub use adapters::polling::{ChatItem, ChatSession, SessionOpener};
pub use adapters::push::{
    CommentCallback, PushBackend, PushCapability, PushClient, PushCloseHandle, PushComment,
    UnavailablePushBackend,
};
#[cfg(feature = "push-webhook")]
pub use adapters::webhook::WebhookPushBackend;
pub use adapters::AdapterContext;
pub use cancel::{CancelState, CancellationController};
pub use config::StreamConfig;
pub use credentials::Credentials;
pub use error::{AdapterError, Result, SupervisorError};
pub use sink::{EventSink, EventStream};
pub use supervisor::{ListenerSnapshot, SessionHandle, StopReport, Supervisor, SupervisorBuilder};
pub use types::{
    AdapterKind, ChatEvent, ListenerId, ListenerSpec, ListenerState, Notice, NoticeLevel, Platform,
    SessionId, SinkEvent,
};
