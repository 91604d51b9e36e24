//! YouTube live chat over the Data API v3.
//!
//! Opening a session resolves the video's `activeLiveChatId`; each fetch then
//! pages `liveChat/messages` with the previous `nextPageToken`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use super::polling::{ChatItem, ChatSession, SessionOpener};
use crate::error::AdapterError;

/// Public Data API v3 endpoint.
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Error reasons that mean the chat is over rather than broken.
const ENDED_REASONS: [&str; 3] = ["liveChatEnded", "liveChatNotFound", "liveChatDisabled"];

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePage {
    next_page_token: Option<String>,
    polling_interval_millis: Option<u64>,
    offline_at: Option<String>,
    #[serde(default)]
    items: Vec<MessageItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageItem {
    snippet: Snippet,
    author_details: AuthorDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    display_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorDetails {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Opens [`YouTubeLiveSession`]s.
#[derive(Debug, Clone)]
pub struct YouTubeSessionOpener {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl YouTubeSessionOpener {
    /// Build an opener with its own HTTP client.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_base, api_key))
    }

    pub fn with_client(
        client: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SessionOpener for YouTubeSessionOpener {
    async fn open(&self, target: &str) -> Result<Box<dyn ChatSession>, AdapterError> {
        if self.api_key.is_empty() {
            tracing::warn!("No YouTube API key configured, requests for {} will likely fail", target);
        }

        let response = self
            .client
            .get(format!("{}/videos", self.api_base))
            .query(&[
                ("part", "liveStreamingDetails"),
                ("id", target),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Session(format!("video lookup for {target}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Session(format!(
                "video lookup for {target} returned HTTP {}: {}",
                status.as_u16(),
                api_error_message(&body)
            )));
        }

        let videos: VideoList = response
            .json()
            .await
            .map_err(|e| AdapterError::Session(format!("video lookup for {target}: {e}")))?;

        let live_chat_id = videos
            .items
            .into_iter()
            .find_map(|v| v.live_streaming_details.and_then(|d| d.active_live_chat_id))
            .ok_or_else(|| AdapterError::Session(format!("no active live chat for video {target}")))?;

        tracing::debug!("Resolved live chat {} for video {}", live_chat_id, target);

        Ok(Box::new(YouTubeLiveSession {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            live_chat_id,
            page_token: None,
            next_poll_at: None,
            alive: true,
        }))
    }
}

/// A paged live-chat session.
#[derive(Debug)]
pub struct YouTubeLiveSession {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    live_chat_id: String,
    page_token: Option<String>,
    next_poll_at: Option<Instant>,
    alive: bool,
}

impl YouTubeLiveSession {
    pub fn live_chat_id(&self) -> &str {
        &self.live_chat_id
    }
}

#[async_trait]
impl ChatSession for YouTubeLiveSession {
    fn is_alive(&self) -> bool {
        self.alive
    }

    async fn fetch_batch(&mut self) -> Result<Vec<ChatItem>, AdapterError> {
        // Honor the server's requested polling interval
        if let Some(at) = self.next_poll_at {
            if Instant::now() < at {
                return Ok(Vec::new());
            }
        }

        let mut query = vec![
            ("liveChatId", self.live_chat_id.as_str()),
            ("part", "snippet,authorDetails"),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = self.page_token.as_deref() {
            query.push(("pageToken", token));
        }

        let response = self
            .client
            .get(format!("{}/liveChat/messages", self.api_base))
            .query(&query)
            .send()
            .await
            .map_err(|e| AdapterError::Session(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if matches!(status.as_u16(), 403 | 404) && is_ended(&body) {
                tracing::info!("Live chat {} is no longer available", self.live_chat_id);
                self.alive = false;
                return Ok(Vec::new());
            }
            return Err(AdapterError::Session(format!(
                "HTTP {}: {}",
                status.as_u16(),
                api_error_message(&body)
            )));
        }

        let page: MessagePage = response
            .json()
            .await
            .map_err(|e| AdapterError::Session(format!("malformed message page: {e}")))?;

        if page.offline_at.is_some() {
            self.alive = false;
        }
        if let Some(token) = page.next_page_token {
            self.page_token = Some(token);
        }
        self.next_poll_at = page
            .polling_interval_millis
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        Ok(page
            .items
            .into_iter()
            .map(|item| ChatItem::new(item.author_details.display_name, item.snippet.display_message))
            .collect())
    }
}

fn parse_api_error(body: &str) -> Option<ApiError> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error)
}

fn is_ended(body: &str) -> bool {
    parse_api_error(body)
        .map(|e| e.errors.iter().any(|d| ENDED_REASONS.contains(&d.reason.as_str())))
        .unwrap_or(false)
}

fn api_error_message(body: &str) -> String {
    match parse_api_error(body) {
        Some(error) if !error.message.is_empty() => error.message,
        _ => body.chars().take(200).collect(),
    }
}
