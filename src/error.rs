//! Crate-level error type.

use thiserror::Error;

/// Errors surfaced by the chat client library.
///
/// None of these are fatal to the process: the connection layer turns
/// transport failures into state transitions and the stream layer turns
/// service failures into transcript entries.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file was not valid TOML for [`crate::config::ClientConfig`].
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound frame could not be decoded. The frame is dropped and the
    /// connection stays open.
    #[error("malformed inbound frame: {detail}")]
    MalformedFrame { detail: String },

    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}
