//! Pass-through platform credentials.
//!
//! Credentials are opaque strings keyed by platform name. Nothing here
//! validates them; a missing key simply yields an empty string and the
//! adapter runs in degraded mode.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::types::Platform;

/// Nickname used for the IRC handshake when none is configured.
pub const DEFAULT_NICKNAME: &str = "your_twitch_username";

const NICKNAME_KEY: &str = "twitch_nickname";

/// Platform credentials as read from a JSON key file.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
}

impl Credentials {
    /// Empty credentials, every platform runs degraded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load credentials from a JSON object file.
    ///
    /// A missing or unreadable file is not an error: a warning is logged and
    /// empty credentials are returned.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(credentials) => {
                    tracing::debug!(
                        "Loaded {} credential(s) from {}",
                        credentials.values.len(),
                        path.display()
                    );
                    credentials
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed credentials file {}: {}", path.display(), e);
                    Self::empty()
                }
            },
            Err(e) => {
                tracing::warn!("Could not read credentials file {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    /// Parse credentials from a JSON object. Non-string values are skipped.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let values = raw
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }

    /// Set a raw credential value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Credential for a platform, or the empty string when absent.
    pub fn token(&self, platform: Platform) -> &str {
        self.values
            .get(platform.credential_key())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// IRC nickname, falling back to [`DEFAULT_NICKNAME`].
    pub fn nickname(&self) -> &str {
        self.values
            .get(NICKNAME_KEY)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_NICKNAME)
    }

    pub fn has(&self, platform: Platform) -> bool {
        !self.token(platform).is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Credentials")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str() {
        let credentials = Credentials::from_json_str(
            r#"{"twitch": "oauth:abc", "twitch_nickname": "bot", "youtube": "key", "extra": 3}"#,
        )
        .unwrap();

        assert_eq!(credentials.token(Platform::Twitch), "oauth:abc");
        assert_eq!(credentials.token(Platform::YouTube), "key");
        assert_eq!(credentials.nickname(), "bot");
        assert!(!credentials.has(Platform::TikTok));
    }

    #[test]
    fn test_missing_keys_are_empty() {
        let credentials = Credentials::empty();
        assert_eq!(credentials.token(Platform::Twitch), "");
        assert_eq!(credentials.nickname(), DEFAULT_NICKNAME);
    }

    #[test]
    fn test_load_missing_file() {
        let credentials = Credentials::load("/definitely/not/here/api_keys.json");
        assert_eq!(credentials.token(Platform::YouTube), "");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("livechat-creds-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"youtube": "from-file"}"#).unwrap();

        let credentials = Credentials::load(&path);
        assert_eq!(credentials.token(Platform::YouTube), "from-file");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_debug_redacts_values() {
        let credentials = Credentials::empty().with("twitch", "oauth:secret");
        let printed = format!("{credentials:?}");
        assert!(printed.contains("twitch"));
        assert!(!printed.contains("secret"));
    }
}
