//! Legacy HTTP binding.
//!
//! One `POST {sessionId, message}` per user message, answered with
//! `{reply}`. The reply is converted into the same inbound frames the
//! WebSocket service sends (`typing`, cumulative `chunk`s, `complete`), so
//! the stream layer does not know which transport delivered a response.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RevealConfig;
use crate::error::ClientError;
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::session::SessionId;

/// Shown when the service answers without usable text.
pub const NO_RESPONSE_TEXT: &str = "[No response from bot]";

/// Shown when the request itself fails.
pub const FETCH_FAILED_TEXT: &str = "Failed to fetch a response from the server.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpChatRequest {
    pub session_id: SessionId,
    pub message: String,
}

impl From<&OutboundFrame> for HttpChatRequest {
    fn from(frame: &OutboundFrame) -> Self {
        HttpChatRequest {
            session_id: frame.session_id.clone(),
            message: frame.message.clone(),
        }
    }
}

/// `reply` is kept loose: a missing or non-string value is a valid (empty)
/// answer, not a decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HttpChatReply {
    #[serde(default)]
    pub reply: Option<serde_json::Value>,
}

impl HttpChatReply {
    /// The reply text, when it is a non-blank string.
    pub fn text(&self) -> Option<&str> {
        match &self.reply {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Split a reply into the frame sequence of a streamed response.
///
/// Chunks are cumulative prefixes growing by `chunk_chars` characters; the
/// full text arrives in the final `complete`.
pub fn reveal_frames(reply: Option<&str>, chunk_chars: usize) -> Vec<InboundFrame> {
    let mut frames = vec![InboundFrame::Typing];
    let Some(text) = reply else {
        frames.push(InboundFrame::Complete {
            message: NO_RESPONSE_TEXT.to_string(),
        });
        return frames;
    };

    let step = chunk_chars.max(1);
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(step)
        .step_by(step)
        .collect();
    for end in boundaries {
        frames.push(InboundFrame::Chunk {
            full_response: text[..end].to_string(),
        });
    }
    frames.push(InboundFrame::Complete {
        message: text.to_string(),
    });
    frames
}

pub struct HttpFallback {
    endpoint: String,
    reveal: RevealConfig,
    client: reqwest::Client,
}

impl HttpFallback {
    pub fn new(endpoint: impl Into<String>, reveal: RevealConfig) -> Self {
        // Builder failure falls back to a default client instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        HttpFallback {
            endpoint: endpoint.into(),
            reveal,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn reveal(&self) -> &RevealConfig {
        &self.reveal
    }

    /// POST one message and decode the reply.
    ///
    /// # Errors
    /// [`ClientError::Http`] on connection failure, non-2xx status or an
    /// undecodable body.
    pub async fn post(&self, frame: &OutboundFrame) -> Result<HttpChatReply, ClientError> {
        let reply = self
            .client
            .post(&self.endpoint)
            .json(&HttpChatRequest::from(frame))
            .send()
            .await?
            .error_for_status()?
            .json::<HttpChatReply>()
            .await?;
        Ok(reply)
    }

    /// Exchange one message for the frames of its response. Never fails:
    /// transport problems become an `error` frame.
    pub async fn exchange(&self, frame: &OutboundFrame) -> Vec<InboundFrame> {
        match self.post(frame).await {
            Ok(reply) => reveal_frames(reply.text(), self.reveal.chunk_chars),
            Err(e) => {
                warn!(error = %e, endpoint = %self.endpoint, "http request failed");
                vec![InboundFrame::Error {
                    message: Some(FETCH_FAILED_TEXT.to_string()),
                }]
            }
        }
    }
}
