//! Wire frames exchanged with the chat service.
//!
//! All frames are JSON text. Inbound frames are discriminated by `type`,
//! outbound frames by `action`.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::session::SessionId;

/// Value of the `action` field on every outbound chat message.
pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

/// One decoded frame from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Diagnostic text. Never shown in the transcript.
    System {
        #[serde(default)]
        message: String,
    },
    /// The assistant started composing a response.
    Typing,
    /// Cumulative response text so far (not a delta).
    Chunk {
        #[serde(rename = "fullResponse")]
        full_response: String,
    },
    /// Final response text.
    Complete { message: String },
    /// Service-side failure. The message is optional.
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Any `type` this client does not know. Tolerated and ignored.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Decode a text frame.
    ///
    /// # Errors
    /// Returns [`ClientError::MalformedFrame`] when the text is not a JSON
    /// object, has no `type`, or a known type is missing a required field.
    pub fn decode(text: &str) -> Result<Self, ClientError> {
        let malformed = |e: serde_json::Error| ClientError::MalformedFrame {
            detail: e.to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(text).map_err(malformed)?;
        // Tagged enums also accept `["type", fields...]`; frames are objects only.
        if !value.is_object() {
            return Err(ClientError::MalformedFrame {
                detail: "frame is not a JSON object".into(),
            });
        }
        serde_json::from_value(value).map_err(malformed)
    }

    /// Short name of the frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::System { .. } => "system",
            InboundFrame::Typing => "typing",
            InboundFrame::Chunk { .. } => "chunk",
            InboundFrame::Complete { .. } => "complete",
            InboundFrame::Error { .. } => "error",
            InboundFrame::Unknown => "unknown",
        }
    }
}

/// `{ "action": "sendMessage", "message": ..., "sessionId": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub action: String,
    pub message: String,
    pub session_id: SessionId,
    /// Name of an attached file, when one accompanies the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl OutboundFrame {
    pub fn send_message(
        message: impl Into<String>,
        session_id: SessionId,
        attachment: Option<String>,
    ) -> Self {
        OutboundFrame {
            action: SEND_MESSAGE_ACTION.to_string(),
            message: message.into(),
            session_id,
            attachment,
        }
    }

    pub fn encode(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"type":"system","message":"connected"}"#, InboundFrame::System { message: "connected".into() })]
    #[case(r#"{"type":"typing"}"#, InboundFrame::Typing)]
    #[case(r#"{"type":"chunk","fullResponse":"Hel"}"#, InboundFrame::Chunk { full_response: "Hel".into() })]
    #[case(r#"{"type":"complete","message":"Hello"}"#, InboundFrame::Complete { message: "Hello".into() })]
    #[case(r#"{"type":"error","message":"quota"}"#, InboundFrame::Error { message: Some("quota".into()) })]
    #[case(r#"{"type":"error"}"#, InboundFrame::Error { message: None })]
    #[case(r#"{"type":"presence","users":3}"#, InboundFrame::Unknown)]
    fn test_decode_known_shapes(#[case] text: &str, #[case] expected: InboundFrame) {
        assert_eq!(InboundFrame::decode(text).unwrap(), expected);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let frame =
            InboundFrame::decode(r#"{"type":"typing","requestId":"r-1","ts":17}"#).unwrap();
        assert_eq!(frame, InboundFrame::Typing);
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"message":"no type"}"#)]
    #[case(r#"{"type":"chunk"}"#)]
    #[case(r#"{"type":"complete"}"#)]
    #[case(r#"["typing"]"#)]
    #[case(r#"["chunk","Hi"]"#)]
    #[case(r#"["complete","done"]"#)]
    #[case(r#""typing""#)]
    fn test_decode_malformed(#[case] text: &str) {
        let err = InboundFrame::decode(text).unwrap_err();
        assert!(matches!(err, ClientError::MalformedFrame { .. }), "{text}");
    }

    #[test]
    fn test_system_message_defaults_to_empty() {
        assert_eq!(
            InboundFrame::decode(r#"{"type":"system"}"#).unwrap(),
            InboundFrame::System { message: String::new() }
        );
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(InboundFrame::Typing.kind(), "typing");
        assert_eq!(InboundFrame::Unknown.kind(), "unknown");
        assert_eq!(
            InboundFrame::Chunk { full_response: String::new() }.kind(),
            "chunk"
        );
    }

    #[test]
    fn test_outbound_wire_shape() {
        let frame = OutboundFrame::send_message(
            "ping",
            SessionId::from_config(Some("sessionid-12345")),
            None,
        );
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "action": "sendMessage",
                "message": "ping",
                "sessionId": "sessionid-12345",
            })
        );
    }

    #[test]
    fn test_outbound_includes_attachment_when_present() {
        let frame = OutboundFrame::send_message(
            "",
            SessionId::from_config(Some("s")),
            Some("report.pdf".into()),
        );
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value["attachment"], "report.pdf");
        assert_eq!(value["message"], "");
    }
}
