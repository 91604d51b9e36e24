//! IRC adapter for Twitch chat.
//!
//! Text-line protocol over a persistent connection. The handshake is sent
//! without waiting for acknowledgement, `PING` is answered before anything
//! else, and `PRIVMSG` lines become chat events. There is no reconnect: a
//! dropped connection fails the listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::AdapterContext;
use crate::error::AdapterError;
use crate::types::ListenerState;

/// Twitch IRC over secure WebSocket.
pub const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Reply to every server `PING`.
pub const PONG_LINE: &str = "PONG :tmi.twitch.tv";

/// Upper bound for the close handshake once the loop has ended.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Classification of one received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcLine {
    /// Keep-alive ping, must be answered with [`PONG_LINE`]
    Ping,
    /// A chat message
    PrivMsg { author: String, message: String },
    /// Anything else, including malformed `PRIVMSG` lines
    Ignored,
}

/// Classify a single IRC line.
///
/// A `PRIVMSG` line is split on its first two `:` separators. With three
/// pieces, the author is the second piece up to `!` and the message is the
/// third piece without its line terminator. Tags-prefixed lines get no
/// special treatment.
pub fn parse_line(line: &str) -> IrcLine {
    if line.starts_with("PING") {
        return IrcLine::Ping;
    }

    if !line.contains("PRIVMSG") {
        return IrcLine::Ignored;
    }

    let mut parts = line.splitn(3, ':');
    let (Some(_), Some(prefix), Some(message)) = (parts.next(), parts.next(), parts.next()) else {
        return IrcLine::Ignored;
    };

    let author = prefix.split('!').next().unwrap_or(prefix);
    IrcLine::PrivMsg {
        author: author.to_string(),
        message: message.trim_end_matches(['\r', '\n']).to_string(),
    }
}

/// A connected line-oriented transport.
#[async_trait]
pub trait LineTransport: Send {
    /// Send one line. The transport adds framing.
    async fn send_line(&mut self, line: &str) -> Result<(), AdapterError>;

    /// Next line without terminator, or `None` once the peer closed.
    ///
    /// Must be cancel-safe: dropping the future loses no line.
    async fn recv_line(&mut self) -> Result<Option<String>, AdapterError>;

    /// Best-effort close.
    async fn close(&mut self);
}

/// Opens [`LineTransport`]s.
#[async_trait]
pub trait LineConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn LineTransport>, AdapterError>;
}

/// Twitch chat listener.
pub struct IrcAdapter {
    connector: Arc<dyn LineConnector>,
    endpoint: String,
    token: String,
    nickname: String,
}

impl IrcAdapter {
    pub fn new(
        connector: Arc<dyn LineConnector>,
        endpoint: impl Into<String>,
        token: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            token: token.into(),
            nickname: nickname.into(),
        }
    }

    /// Run until cancelled or the connection fails.
    pub async fn run(&self, ctx: &AdapterContext) -> Result<(), AdapterError> {
        ctx.transition(ListenerState::Connecting);

        let mut transport = match ctx
            .cancel()
            .run_until_signaled(self.connector.connect(&self.endpoint))
            .await
        {
            Some(transport) => transport?,
            None => return Err(AdapterError::Cancelled),
        };

        let result = self.stream(ctx, transport.as_mut()).await;

        if tokio::time::timeout(CLOSE_TIMEOUT, transport.close())
            .await
            .is_err()
        {
            tracing::debug!("close handshake for {} timed out", ctx.spec());
        }

        result
    }

    async fn stream(
        &self,
        ctx: &AdapterContext,
        transport: &mut dyn LineTransport,
    ) -> Result<(), AdapterError> {
        let channel = ctx.spec().target();

        if self.token.is_empty() {
            tracing::warn!("No Twitch credential configured, joining #{} anonymously", channel);
        }

        send(ctx, transport, &format!("PASS {}", self.token)).await?;
        send(ctx, transport, &format!("NICK {}", self.nickname)).await?;
        send(ctx, transport, &format!("JOIN #{channel}")).await?;

        ctx.transition(ListenerState::Streaming);
        ctx.notice_info(format!("Connected to #{channel}"));
        tracing::info!("Joined #{} as {}", channel, self.nickname);

        loop {
            if ctx.cancel().is_signaled() {
                return Err(AdapterError::Cancelled);
            }

            let line = match ctx.cancel().run_until_signaled(transport.recv_line()).await {
                Some(line) => line?,
                None => return Err(AdapterError::Cancelled),
            };

            let Some(line) = line else {
                return Err(AdapterError::Connection(
                    "connection closed by server".to_string(),
                ));
            };

            match parse_line(&line) {
                IrcLine::Ping => {
                    send(ctx, transport, PONG_LINE).await?;
                    tracing::trace!("answered PING on #{}", channel);
                }
                IrcLine::PrivMsg { author, message } => {
                    tracing::debug!("#{} <{}> {}", channel, author, message);
                    ctx.emit_chat(author, message);
                }
                IrcLine::Ignored => {
                    if line.contains(" NOTICE ") {
                        tracing::warn!("Server notice on #{}: {}", channel, line);
                    }
                }
            }
        }
    }
}

/// Send one line unless cancellation is signaled first. A write stalled on
/// a dead peer must not hold up `stop`.
async fn send(
    ctx: &AdapterContext,
    transport: &mut dyn LineTransport,
    line: &str,
) -> Result<(), AdapterError> {
    match ctx.cancel().run_until_signaled(transport.send_line(line)).await {
        Some(result) => result,
        None => Err(AdapterError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationController;
    use crate::sink::EventSink;
    use crate::types::{ListenerSpec, Platform, SinkEvent};
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_parse_ping() {
        assert_eq!(parse_line("PING :tmi.twitch.tv"), IrcLine::Ping);
        assert_eq!(parse_line("PING"), IrcLine::Ping);
    }

    #[test]
    fn test_parse_privmsg() {
        assert_eq!(
            parse_line(":alice!alice@alice.tmi.twitch.tv PRIVMSG #chan1 :hello there\n"),
            IrcLine::PrivMsg {
                author: "alice".into(),
                message: "hello there".into()
            }
        );
    }

    #[test]
    fn test_parse_privmsg_keeps_colons_in_message() {
        assert_eq!(
            parse_line(":bob!bob@x PRIVMSG #chan :time is 12:30"),
            IrcLine::PrivMsg {
                author: "bob".into(),
                message: "time is 12:30".into()
            }
        );
    }

    #[test]
    fn test_parse_malformed_privmsg_is_ignored() {
        assert_eq!(parse_line("PRIVMSG #chan"), IrcLine::Ignored);
        assert_eq!(parse_line(":only-one PRIVMSG #chan"), IrcLine::Ignored);
    }

    #[test]
    fn test_parse_other_lines_are_ignored() {
        assert_eq!(
            parse_line(":tmi.twitch.tv 001 bot :Welcome, GLHF!"),
            IrcLine::Ignored
        );
        assert_eq!(parse_line(""), IrcLine::Ignored);
    }

    proptest! {
        #[test]
        fn prop_privmsg_roundtrip(
            author in "[a-z0-9_]{1,25}",
            channel in "[a-z0-9_]{1,25}",
            message in "[^\r\n]{0,200}",
        ) {
            let line = format!(":{author}!{author}@{author}.tmi.twitch.tv PRIVMSG #{channel} :{message}\r\n");
            prop_assert_eq!(
                parse_line(&line),
                IrcLine::PrivMsg { author: author.clone(), message: message.clone() }
            );
        }

        #[test]
        fn prop_ping_never_yields_chat(rest in "[^\r\n]{0,100}") {
            prop_assert_eq!(parse_line(&format!("PING{rest}")), IrcLine::Ping);
        }

        #[test]
        fn prop_lines_without_privmsg_are_ignored(line in "[^P][^\r\n]{0,100}") {
            prop_assume!(!line.contains("PRIVMSG"));
            prop_assert_eq!(parse_line(&line), IrcLine::Ignored);
        }
    }

    /// Transport replaying a fixed script, then reporting a closed peer.
    struct Scripted {
        incoming: VecDeque<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LineTransport for Scripted {
        async fn send_line(&mut self, line: &str) -> Result<(), AdapterError> {
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn recv_line(&mut self) -> Result<Option<String>, AdapterError> {
            Ok(self.incoming.pop_front())
        }

        async fn close(&mut self) {}
    }

    struct ScriptedConnector {
        lines: Vec<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LineConnector for ScriptedConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn LineTransport>, AdapterError> {
            Ok(Box::new(Scripted {
                incoming: self.lines.iter().cloned().collect(),
                sent: self.sent.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_handshake_pong_and_chat() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let connector = Arc::new(ScriptedConnector {
            lines: vec![
                "PING :tmi.twitch.tv".into(),
                ":alice!alice@x PRIVMSG #chan1 :hello".into(),
                "garbage PRIVMSG".into(),
            ],
            sent: sent.clone(),
        });
        let adapter = IrcAdapter::new(connector, TWITCH_IRC_URL, "oauth:abc", "bot");

        let (sink, events) = EventSink::channel();
        let ctx = AdapterContext::new(
            ListenerSpec::new(Platform::Twitch, "chan1"),
            sink,
            CancellationController::new(),
        );

        let result = adapter.run(&ctx).await;
        assert_eq!(
            result,
            Err(AdapterError::Connection("connection closed by server".into()))
        );

        let sent = sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec!["PASS oauth:abc", "NICK bot", "JOIN #chan1", PONG_LINE]
        );

        let chats: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                SinkEvent::Chat(chat) => Some(chat),
                SinkEvent::Notice(_) => None,
            })
            .collect();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].author(), "alice");
        assert_eq!(chats[0].message(), "hello");
        assert_eq!(chats[0].platform(), Platform::Twitch);
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let connector = Arc::new(ScriptedConnector {
            lines: vec![],
            sent: Arc::new(Mutex::new(Vec::new())),
        });
        let adapter = IrcAdapter::new(connector, TWITCH_IRC_URL, "", "bot");
        let cancel = CancellationController::new();
        cancel.signal();

        let ctx = AdapterContext::new(
            ListenerSpec::new(Platform::Twitch, "chan"),
            EventSink::discard(),
            cancel,
        );
        assert_eq!(adapter.run(&ctx).await, Err(AdapterError::Cancelled));
    }
}
