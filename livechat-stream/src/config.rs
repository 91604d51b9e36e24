//! Configuration types for the livechat-stream crate
//!
//! `StreamConfig` controls endpoints, timing and the local port range used by
//! the push backend.

use std::time::Duration;

use crate::adapters::irc::TWITCH_IRC_URL;
use crate::adapters::youtube::YOUTUBE_API_BASE;
use crate::error::SupervisorError;

/// Configuration for the Supervisor and its adapters
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint of the IRC server
    /// Default: wss://irc-ws.chat.twitch.tv:443
    pub irc_endpoint: String,

    /// Idle interval between two polls of a chat session
    /// Default: 1 second
    pub poll_interval: Duration,

    /// How long `stop` waits for listeners before forcing termination
    /// Default: 5 seconds
    pub grace_period: Duration,

    /// Port range for the push callback server
    /// Default: (3400, 3500)
    pub callback_port_range: (u16, u16),

    /// Base URL of the YouTube Data API
    /// Default: https://www.googleapis.com/youtube/v3
    pub youtube_api_base: String,

    /// Timeout applied to every HTTP request made by the polling session
    /// Default: 10 seconds
    pub http_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            irc_endpoint: TWITCH_IRC_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(5),
            callback_port_range: (3400, 3500),
            youtube_api_base: YOUTUBE_API_BASE.to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short grace period and poll interval, for tests and interactive tools
    pub fn fast_shutdown() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            grace_period: Duration::from_millis(500),
            http_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.callback_port_range.0 > self.callback_port_range.1 {
            return Err(SupervisorError::Configuration(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.grace_period == Duration::ZERO {
            return Err(SupervisorError::Configuration(
                "Grace period must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval == Duration::ZERO {
            return Err(SupervisorError::Configuration(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.irc_endpoint).is_err() {
            return Err(SupervisorError::Configuration(format!(
                "Invalid IRC endpoint: {}",
                self.irc_endpoint
            )));
        }

        if url::Url::parse(&self.youtube_api_base).is_err() {
            return Err(SupervisorError::Configuration(format!(
                "Invalid YouTube API base: {}",
                self.youtube_api_base
            )));
        }

        Ok(())
    }

    pub fn with_irc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.irc_endpoint = endpoint.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_callback_ports(mut self, start: u16, end: u16) -> Self {
        self.callback_port_range = (start, end);
        self
    }

    pub fn with_youtube_api_base(mut self, base: impl Into<String>) -> Self {
        self.youtube_api_base = base.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.irc_endpoint, "wss://irc-ws.chat.twitch.tv:443");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.callback_port_range, (3400, 3500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = StreamConfig {
            callback_port_range: (3500, 3400),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = StreamConfig::new().with_grace_period(Duration::ZERO);
        assert!(invalid.validate().is_err());

        let invalid = StreamConfig::new().with_irc_endpoint("not a url");
        assert!(matches!(
            invalid.validate(),
            Err(SupervisorError::Configuration(_))
        ));
    }

    #[test]
    fn test_fast_shutdown_preset() {
        let fast = StreamConfig::fast_shutdown();
        assert!(fast.grace_period < StreamConfig::default().grace_period);
        assert!(fast.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = StreamConfig::new()
            .with_irc_endpoint("ws://127.0.0.1:9000")
            .with_poll_interval(Duration::from_millis(50))
            .with_grace_period(Duration::from_secs(2))
            .with_callback_ports(4000, 4000)
            .with_youtube_api_base("http://127.0.0.1:1234")
            .with_http_timeout(Duration::from_secs(1));

        assert_eq!(config.irc_endpoint, "ws://127.0.0.1:9000");
        assert_eq!(config.grace_period, Duration::from_secs(2));
        assert_eq!(config.callback_port_range, (4000, 4000));
        assert!(config.validate().is_ok());
    }
}
