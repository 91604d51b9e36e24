//! Local HTTP receiver for pushed live comments.
//!
//! Some comment relays push to us instead of being polled. This crate runs
//! the endpoint they push to and hands each accepted body to a channel. It
//! knows nothing about any relay's payload format.
//!
//! - [`CallbackServer`] binds the first free port in a range and serves
//!   `POST /comments/<stream-id>`.
//! - [`EventRouter`] holds the stream IDs that are currently accepted.
//! - [`NotificationPayload`] is what arrives on the channel: the stream ID
//!   from the path and the raw body.
//!
//! Empty bodies are answered with 400, unregistered streams with 404. Decoding
//! is left to the consumer.
//!
//! Internal to the livechat workspace, not published.

mod error;
pub mod router;
mod server;

pub use error::CallbackServerError;
pub use router::{EventRouter, NotificationPayload};
pub use server::{CallbackServer, COMMENTS_PATH};
