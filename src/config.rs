//! Client configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration pointed at a local service.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ClientError;

/// Default WebSocket endpoint of the chat service.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001";

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the chat service.
    pub endpoint: String,
    /// Legacy `POST` endpoint. When set, the binary can run over HTTP instead.
    pub http_endpoint: Option<String>,
    /// Fixed session identifier. Generated once per client when absent.
    pub session_id: Option<String>,
    pub reconnect: ReconnectConfig,
    pub render: RenderConfig,
    pub reveal: RevealConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http_endpoint: None,
            session_id: None,
            reconnect: ReconnectConfig::default(),
            render: RenderConfig::default(),
            reveal: RevealConfig::default(),
        }
    }
}

/// Backoff parameters for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Automatic attempts before the client waits for a manual reconnect.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Convert message bodies from markdown. When false, text is shown as-is.
    pub markdown: bool,
    /// Bodies larger than this are not converted and fall back to raw text.
    pub max_bytes: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            markdown: true,
            max_bytes: 256 * 1024,
        }
    }
}

/// Gradual reveal of replies received over the legacy HTTP binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    /// Characters added per cumulative chunk.
    pub chunk_chars: usize,
    /// Delay between chunks.
    pub tick_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        RevealConfig {
            chunk_chars: 8,
            tick_ms: 3,
        }
    }
}

impl RevealConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl ClientConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ClientError> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    /// - [`ClientError::Io`] when the file cannot be read.
    /// - [`ClientError::ConfigParse`] when the TOML does not match the schema.
    /// - [`ClientError::Config`] when a value fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the connection layer cannot work with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ClientError::Config("reconnect.base_delay_ms must be > 0".into()));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ClientError::Config(format!(
                "reconnect.max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }
        if self.reveal.chunk_chars == 0 {
            return Err(ClientError::Config("reveal.chunk_chars must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_backoff_schedule() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.render.markdown);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            endpoint = "ws://chat.internal:9000/ws"

            [reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://chat.internal:9000/ws");
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.reveal.chunk_chars, 8);
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let err = ClientConfig::from_toml_str("[reconnect]\nbase_delay_ms = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_cap_below_base_rejected() {
        let err = ClientConfig::from_toml_str(
            "[reconnect]\nbase_delay_ms = 5000\nmax_delay_ms = 1000\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn test_zero_chunk_chars_rejected() {
        assert!(ClientConfig::from_toml_str("[reveal]\nchunk_chars = 0\n").is_err());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = ClientConfig::from_toml_str("[reconnect]\nmax_attempts = \"many\"\n").unwrap_err();
        assert!(matches!(err, ClientError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session_id = \"sessionid-12345\"").unwrap();
        writeln!(file, "http_endpoint = \"http://127.0.0.1:3000/chat\"").unwrap();
        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.session_id.as_deref(), Some("sessionid-12345"));
        assert_eq!(
            config.http_endpoint.as_deref(),
            Some("http://127.0.0.1:3000/chat")
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn test_duration_helpers() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.base_delay(), Duration::from_secs(1));
        assert_eq!(reconnect.max_delay(), Duration::from_secs(30));
        assert_eq!(RevealConfig::default().tick(), Duration::from_millis(3));
    }
}
