//! Core types for the livechat-stream crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Streaming platforms a listener can attach to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Twitch chat over IRC
    Twitch,
    /// YouTube live chat, polled
    #[serde(rename = "youtube")]
    YouTube,
    /// TikTok live comments, pushed
    #[serde(rename = "tiktok")]
    TikTok,
}

impl Platform {
    /// All supported platforms.
    pub const ALL: [Platform; 3] = [Platform::Twitch, Platform::YouTube, Platform::TikTok];

    /// Which adapter family serves this platform.
    pub fn kind(&self) -> AdapterKind {
        match self {
            Platform::Twitch => AdapterKind::Irc,
            Platform::YouTube => AdapterKind::Polling,
            Platform::TikTok => AdapterKind::Push,
        }
    }

    /// Key of this platform's credential in the credentials file.
    pub fn credential_key(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Twitch => write!(f, "Twitch"),
            Platform::YouTube => write!(f, "YouTube"),
            Platform::TikTok => write!(f, "TikTok"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "youtube" => Ok(Platform::YouTube),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Concurrency/protocol family of an adapter.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum AdapterKind {
    /// Persistent text-line socket, runs as a cooperative task
    Irc,
    /// Pull-based fetch loop, runs as a cooperative task
    Polling,
    /// Callback-driven client with its own run-loop, runs on a dedicated thread
    Push,
}

impl AdapterKind {
    /// Whether the adapter shares the cooperative scheduler.
    pub fn is_cooperative(&self) -> bool {
        matches!(self, AdapterKind::Irc | AdapterKind::Polling)
    }
}

/// A (platform, target) pair the consumer wants to listen to.
///
/// The target is a channel name for Twitch, a video id for YouTube and a
/// user name for TikTok.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawListenerSpec")]
pub struct ListenerSpec {
    platform: Platform,
    target: String,
}

/// Wire form of [`ListenerSpec`]; deserialized specs are normalized like `new`.
#[derive(Deserialize)]
struct RawListenerSpec {
    platform: Platform,
    target: String,
}

impl From<RawListenerSpec> for ListenerSpec {
    fn from(raw: RawListenerSpec) -> Self {
        ListenerSpec::new(raw.platform, raw.target)
    }
}

impl ListenerSpec {
    /// Create a spec. The target is trimmed, and a leading `#` is dropped for
    /// Twitch channels since the join line adds it.
    pub fn new(platform: Platform, target: impl Into<String>) -> Self {
        let target = target.into();
        let trimmed = target.trim();
        let target = match platform {
            Platform::Twitch => trimmed.trim_start_matches('#').to_string(),
            _ => trimmed.to_string(),
        };
        Self { platform, target }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Specs are only validated for a non-empty target.
    pub fn is_valid(&self) -> bool {
        !self.target.trim().is_empty()
    }
}

impl fmt::Display for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.platform {
            Platform::Twitch => write!(f, "{} #{}", self.platform, self.target),
            _ => write!(f, "{} {}", self.platform, self.target),
        }
    }
}

/// Unique identifier for a listener within a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Identifier of one start..stop aggregation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle of a single listener.
///
/// `Idle → Connecting → Streaming → {Stopping → Stopped | Failed}`. Any
/// non-terminal state may also move to `Stopping` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum ListenerState {
    Idle,
    Connecting,
    Streaming,
    Stopping,
    Stopped,
    Failed(String),
}

impl ListenerState {
    /// `Stopped` and `Failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListenerState::Stopped | ListenerState::Failed(_))
    }

    pub fn can_transition_to(&self, next: &ListenerState) -> bool {
        use ListenerState::*;

        match (self, next) {
            (Stopped, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, Connecting) | (Connecting, Streaming) => true,
            (Idle | Connecting | Streaming, Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Idle => write!(f, "idle"),
            ListenerState::Connecting => write!(f, "connecting"),
            ListenerState::Streaming => write!(f, "streaming"),
            ListenerState::Stopping => write!(f, "stopping"),
            ListenerState::Stopped => write!(f, "stopped"),
            ListenerState::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}

/// One observed chat line or comment, normalized across platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    platform: Platform,
    timestamp: DateTime<Local>,
    author: String,
    message: String,
}

impl ChatEvent {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(platform: Platform, author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_timestamp(platform, Local::now(), author, message)
    }

    pub fn with_timestamp(
        platform: Platform,
        timestamp: DateTime<Local>,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            timestamp,
            author: author.into(),
            message: message.into(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}][{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.platform,
            self.author,
            self.message
        )
    }
}

/// Severity of a listener notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Informational or error message about a listener, delivered through the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub platform: Platform,
    pub target: String,
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl Notice {
    pub fn new(spec: &ListenerSpec, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            platform: spec.platform(),
            target: spec.target().to_string(),
            level,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            NoticeLevel::Info => "",
            NoticeLevel::Error => "error: ",
        };
        write!(
            f,
            "[{}][{}] {}{}",
            self.timestamp.format("%H:%M:%S"),
            self.platform,
            marker,
            self.message
        )
    }
}

/// Everything the sink receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkEvent {
    Chat(ChatEvent),
    Notice(Notice),
}

impl SinkEvent {
    pub fn platform(&self) -> Platform {
        match self {
            SinkEvent::Chat(event) => event.platform(),
            SinkEvent::Notice(notice) => notice.platform,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatEvent> {
        match self {
            SinkEvent::Chat(event) => Some(event),
            SinkEvent::Notice(_) => None,
        }
    }

    pub fn as_notice(&self) -> Option<&Notice> {
        match self {
            SinkEvent::Notice(notice) => Some(notice),
            SinkEvent::Chat(_) => None,
        }
    }
}

impl fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkEvent::Chat(event) => event.fmt(f),
            SinkEvent::Notice(notice) => notice.fmt(f),
        }
    }
}

impl From<ChatEvent> for SinkEvent {
    fn from(event: ChatEvent) -> Self {
        SinkEvent::Chat(event)
    }
}

impl From<Notice> for SinkEvent {
    fn from(notice: Notice) -> Self {
        SinkEvent::Notice(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("twitch", Platform::Twitch)]
    #[case("YouTube", Platform::YouTube)]
    #[case(" TIKTOK ", Platform::TikTok)]
    fn test_platform_from_str(#[case] input: &str, #[case] expected: Platform) {
        assert_eq!(input.parse::<Platform>().unwrap(), expected);
    }

    #[test]
    fn test_platform_from_str_unknown() {
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_kind() {
        assert_eq!(Platform::Twitch.kind(), AdapterKind::Irc);
        assert_eq!(Platform::YouTube.kind(), AdapterKind::Polling);
        assert_eq!(Platform::TikTok.kind(), AdapterKind::Push);
        assert!(AdapterKind::Irc.is_cooperative());
        assert!(!AdapterKind::Push.is_cooperative());
    }

    #[test]
    fn test_platform_serde_names() {
        assert_eq!(serde_json::to_string(&Platform::YouTube).unwrap(), "\"youtube\"");
        assert_eq!(serde_json::to_string(&Platform::TikTok).unwrap(), "\"tiktok\"");
        let parsed: Platform = serde_json::from_str("\"twitch\"").unwrap();
        assert_eq!(parsed, Platform::Twitch);
    }

    #[test]
    fn test_listener_spec_normalizes_target() {
        let spec = ListenerSpec::new(Platform::Twitch, "  #somechannel ");
        assert_eq!(spec.target(), "somechannel");
        assert_eq!(spec.to_string(), "Twitch #somechannel");

        let spec = ListenerSpec::new(Platform::YouTube, " abc123 ");
        assert_eq!(spec.target(), "abc123");
        assert!(spec.is_valid());

        assert!(!ListenerSpec::new(Platform::TikTok, "   ").is_valid());
    }

    #[test]
    fn test_listener_spec_deserialize_normalizes_target() {
        let spec: ListenerSpec =
            serde_json::from_str(r##"{"platform":"twitch","target":" #chan1 "}"##).unwrap();
        assert_eq!(spec, ListenerSpec::new(Platform::Twitch, "chan1"));
        assert_eq!(spec.target(), "chan1");

        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<ListenerSpec>(&json).unwrap(), spec);
    }

    #[test]
    fn test_listener_spec_equality_after_normalization() {
        assert_eq!(
            ListenerSpec::new(Platform::Twitch, "#chan"),
            ListenerSpec::new(Platform::Twitch, "chan")
        );
    }

    #[rstest]
    #[case(ListenerState::Idle, ListenerState::Connecting, true)]
    #[case(ListenerState::Connecting, ListenerState::Streaming, true)]
    #[case(ListenerState::Streaming, ListenerState::Stopping, true)]
    #[case(ListenerState::Stopping, ListenerState::Stopped, true)]
    #[case(ListenerState::Streaming, ListenerState::Failed("x".into()), true)]
    #[case(ListenerState::Idle, ListenerState::Failed("x".into()), true)]
    #[case(ListenerState::Idle, ListenerState::Streaming, false)]
    #[case(ListenerState::Streaming, ListenerState::Stopped, false)]
    #[case(ListenerState::Stopped, ListenerState::Connecting, false)]
    #[case(ListenerState::Failed("x".into()), ListenerState::Stopped, false)]
    fn test_state_transitions(
        #[case] from: ListenerState,
        #[case] to: ListenerState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_chat_event_display() {
        let timestamp = Local.with_ymd_and_hms(2024, 5, 1, 13, 4, 5).unwrap();
        let event = ChatEvent::with_timestamp(Platform::Twitch, timestamp, "alice", "hello");
        assert_eq!(event.to_string(), "[13:04:05][Twitch] alice: hello");
    }

    #[test]
    fn test_notice_display() {
        let spec = ListenerSpec::new(Platform::YouTube, "vid1");
        let notice = Notice::new(&spec, NoticeLevel::Error, "live chat ended");
        assert!(notice.is_error());
        assert!(notice.to_string().ends_with("[YouTube] error: live chat ended"));
    }

    #[test]
    fn test_sink_event_json_shape() {
        let event = SinkEvent::from(ChatEvent::new(Platform::TikTok, "carol", "hi"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["platform"], "tiktok");
        assert_eq!(json["author"], "carol");
        assert_eq!(event.platform(), Platform::TikTok);
        assert!(event.as_chat().is_some());
        assert!(event.as_notice().is_none());
    }
}
