//! Builder for creating and configuring the Supervisor.
//!
//! Production backends are used unless overridden, which is how tests inject
//! scripted transports, sessions and push clients.
//!
//! # Example
//!
//! ```rust,ignore
//! use livechat_stream::{Credentials, SupervisorBuilder};
//! use std::time::Duration;
//!
//! let supervisor = SupervisorBuilder::new()
//!     .with_credentials(Credentials::load("api_keys.json"))
//!     .with_grace_period(Duration::from_secs(3))
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::Supervisor;
use crate::adapters::irc::LineConnector;
use crate::adapters::polling::SessionOpener;
use crate::adapters::push::{PushBackend, PushCapability};
use crate::adapters::websocket::WebSocketConnector;
use crate::adapters::youtube::YouTubeSessionOpener;
use crate::config::StreamConfig;
use crate::credentials::Credentials;
use crate::error::{Result, SupervisorError};
use crate::types::Platform;

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    config: StreamConfig,
    credentials: Credentials,
    connector: Option<Arc<dyn LineConnector>>,
    opener: Option<Arc<dyn SessionOpener>>,
    push_backend: Option<Arc<dyn PushBackend>>,
}

impl SupervisorBuilder {
    /// Default configuration, empty credentials, production backends.
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
            credentials: Credentials::empty(),
            connector: None,
            opener: None,
            push_backend: None,
        }
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Shorthand for setting `StreamConfig::grace_period`.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    /// Replace the IRC transport.
    pub fn with_line_connector(mut self, connector: Arc<dyn LineConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the polling session source.
    pub fn with_session_opener(mut self, opener: Arc<dyn SessionOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Replace the push backend. Its capability is checked during `build`.
    pub fn with_push_backend(mut self, backend: Arc<dyn PushBackend>) -> Self {
        self.push_backend = Some(backend);
        self
    }

    /// Validate the configuration and create the supervisor.
    pub fn build(self) -> Result<Supervisor> {
        self.config.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        let opener = match self.opener {
            Some(opener) => opener,
            None => Arc::new(
                YouTubeSessionOpener::new(
                    self.config.youtube_api_base.clone(),
                    self.credentials.token(Platform::YouTube),
                    self.config.http_timeout,
                )
                .map_err(|e| SupervisorError::Configuration(format!("HTTP client: {e}")))?,
            ),
        };

        let push_backend = self
            .push_backend
            .unwrap_or_else(|| default_push_backend(&self.config));

        let push_capability = push_backend.check_capability();
        if let PushCapability::Unavailable { reason } = &push_capability {
            tracing::warn!("TikTok listeners unavailable: {}", reason);
        }

        Ok(Supervisor::from_parts(
            self.config,
            self.credentials,
            connector,
            opener,
            push_backend,
            push_capability,
        ))
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "push-webhook")]
fn default_push_backend(config: &StreamConfig) -> Arc<dyn PushBackend> {
    Arc::new(crate::adapters::webhook::WebhookPushBackend::new(
        config.callback_port_range,
    ))
}

#[cfg(not(feature = "push-webhook"))]
fn default_push_backend(_config: &StreamConfig) -> Arc<dyn PushBackend> {
    Arc::new(crate::adapters::push::UnavailablePushBackend::new(
        "built without the push-webhook feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::push::UnavailablePushBackend;

    #[test]
    fn test_build_with_defaults() {
        let supervisor = SupervisorBuilder::new()
            .with_push_backend(Arc::new(UnavailablePushBackend::new("off")))
            .build()
            .unwrap();
        assert!(!supervisor.is_active());
        assert_eq!(
            supervisor.push_capability(),
            &PushCapability::Unavailable { reason: "off".into() }
        );
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = SupervisorBuilder::new()
            .with_grace_period(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(SupervisorError::Configuration(_))));
    }
}
