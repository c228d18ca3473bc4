//! The chat client instance: one session, one connection, one stream slot
//! and the transcript they drive.
//!
//! `ChatClient` performs no I/O. Connection requests and transport reports
//! go in, [`Effect`]s for the driver come out, and transcript mutations are
//! collected for the UI via [`ChatClient::drain_changes`].

use std::path::Path;

use tracing::{debug, warn};

use crate::backoff::ReconnectPolicy;
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, Effect, Epoch};
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::render::{self, Renderer};
use crate::session::SessionId;
use crate::stream::StreamCoordinator;
use crate::transcript::{Role, Transcript, TranscriptChange};

/// User entry shown when only a file is sent.
pub const FILE_SENT_LABEL: &str = "File Sent";

/// Reference to a file sent alongside a message. Only the name travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>) -> Self {
        Attachment { name: name.into() }
    }

    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Attachment { name }
    }
}

pub struct ChatClient {
    session: SessionId,
    connection: ConnectionManager,
    stream: StreamCoordinator,
    transcript: Transcript,
    renderer: Box<dyn Renderer>,
    attachment: Option<Attachment>,
}

impl ChatClient {
    pub fn new(session: SessionId, policy: ReconnectPolicy, renderer: Box<dyn Renderer>) -> Self {
        ChatClient {
            session,
            connection: ConnectionManager::new(policy),
            stream: StreamCoordinator::new(),
            transcript: Transcript::new(),
            renderer,
            attachment: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            SessionId::from_config(config.session_id.as_deref()),
            ReconnectPolicy::from_config(&config.reconnect),
            render::from_config(&config.render),
        )
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn stream(&self) -> &StreamCoordinator {
        &self.stream
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn drain_changes(&mut self) -> Vec<TranscriptChange> {
        self.transcript.drain_changes()
    }

    pub fn connect(&mut self) -> Vec<Effect> {
        let effects = self.connection.connect();
        self.apply(effects)
    }

    pub fn manual_reconnect(&mut self) -> Vec<Effect> {
        let effects = self.connection.manual_reconnect();
        self.apply(effects)
    }

    pub fn disconnect(&mut self) -> Vec<Effect> {
        let effects = self.connection.disconnect();
        self.apply(effects)
    }

    /// Feed a transport report or timer expiry into the connection.
    pub fn on_connection_event(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        let effects = self.connection.handle(event);
        self.apply(effects)
    }

    /// Run the effects that touch client-owned state and pass the rest on.
    fn apply(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        effects
            .into_iter()
            .filter(|effect| match effect {
                Effect::DiscardStream => {
                    self.stream.discard(&mut self.transcript);
                    false
                }
                _ => true,
            })
            .collect()
    }

    /// Handle a raw text frame received on the transport of `epoch`.
    ///
    /// Frames from an earlier epoch and undecodable frames are dropped
    /// without touching the connection state.
    pub fn on_text(&mut self, epoch: Epoch, text: &str) {
        if epoch != self.connection.epoch() {
            debug!(%epoch, current = %self.connection.epoch(), "dropping frame from stale connection");
            return;
        }
        match InboundFrame::decode(text) {
            Ok(frame) => self.on_frame(&frame),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    /// Apply a decoded frame, whichever transport delivered it.
    pub fn on_frame(&mut self, frame: &InboundFrame) {
        debug!(kind = frame.kind(), "inbound frame");
        self.stream
            .handle_frame(frame, &mut self.transcript, self.renderer.as_ref());
    }

    /// Select a file to go with the next message.
    pub fn attach(&mut self, attachment: Attachment) {
        let label = format!("Selected File: {}", attachment.name);
        self.transcript.append(Role::User, label.clone(), label, false);
        self.attachment = Some(attachment);
    }

    /// Append the optimistic user entry and build the outbound frame.
    ///
    /// Returns `None` when there is neither text nor an attachment. The
    /// entry is appended before any delivery is attempted.
    pub fn compose(&mut self, text: &str) -> Option<OutboundFrame> {
        if text.is_empty() && self.attachment.is_none() {
            return None;
        }
        let shown = if text.is_empty() {
            FILE_SENT_LABEL
        } else {
            text
        };
        self.transcript.append(Role::User, shown, shown, false);

        let attachment = self.attachment.take().map(|a| a.name);
        Some(OutboundFrame::send_message(
            text,
            self.session.clone(),
            attachment,
        ))
    }

    /// Compose a message and hand it to the connection.
    ///
    /// Returns the [`Effect::Transmit`] to run, or `None` when there was
    /// nothing to send or the connection is not open. The user entry stays
    /// in the transcript either way; nothing is queued for later.
    pub fn send_message(&mut self, text: &str) -> Option<Effect> {
        let frame = self.compose(text)?;
        self.connection.send(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainRenderer;
    use crate::stream::StreamPhase;

    fn client() -> ChatClient {
        ChatClient::new(
            SessionId::from_config(Some("sessionid-12345")),
            ReconnectPolicy::default(),
            Box::new(PlainRenderer),
        )
    }

    fn connected() -> ChatClient {
        let mut c = client();
        c.connect();
        let epoch = c.connection().epoch();
        c.on_connection_event(ConnectionEvent::Opened { epoch });
        c
    }

    #[test]
    fn test_send_appends_user_entry_before_delivery() {
        let mut c = connected();
        let effect = c.send_message("ping").unwrap();
        assert_eq!(c.transcript().entries()[0].content, "ping");
        assert_eq!(c.transcript().entries()[0].role, Role::User);
        match effect {
            Effect::Transmit { payload, .. } => {
                let v: serde_json::Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(v["sessionId"], "sessionid-12345");
                assert_eq!(v["message"], "ping");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_send_while_disconnected_keeps_entry_and_drops_frame() {
        let mut c = client();
        assert!(c.send_message("hello?").is_none());
        assert_eq!(c.transcript().len(), 1);
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_empty_send_is_noop() {
        let mut c = connected();
        assert!(c.send_message("").is_none());
        assert!(c.transcript().is_empty());
    }

    #[test]
    fn test_whitespace_is_content() {
        let mut c = connected();
        c.attach(Attachment::new("a.txt"));
        assert!(c.send_message("  ").is_some());
        assert_eq!(c.transcript().entries()[1].content, "  ");
    }

    #[test]
    fn test_attachment_only_send_shows_file_sent() {
        let mut c = connected();
        c.attach(Attachment::from_path(Path::new("/tmp/notes/report.pdf")));
        assert_eq!(c.transcript().entries()[0].content, "Selected File: report.pdf");
        let effect = c.send_message("").unwrap();
        assert_eq!(c.transcript().entries()[1].content, FILE_SENT_LABEL);
        assert!(c.pending_attachment().is_none());
        let Effect::Transmit { payload, .. } = effect else {
            panic!("expected transmit");
        };
        assert!(payload.contains("\"attachment\":\"report.pdf\""));
    }

    #[test]
    fn test_stale_epoch_frames_dropped() {
        let mut c = connected();
        let old = c.connection().epoch();
        c.manual_reconnect();
        c.on_text(old, r#"{"type":"complete","message":"late"}"#);
        assert!(c.transcript().is_empty());
    }

    #[test]
    fn test_malformed_frame_keeps_connection() {
        let mut c = connected();
        let epoch = c.connection().epoch();
        c.on_text(epoch, "{{{");
        assert_eq!(c.state(), ConnectionState::Connected);
        assert!(c.transcript().is_empty());
    }

    #[test]
    fn test_reconnect_discards_stale_stream() {
        let mut c = connected();
        let epoch = c.connection().epoch();
        c.on_text(epoch, r#"{"type":"typing"}"#);
        assert_eq!(c.stream().phase(), StreamPhase::Typing);

        c.on_connection_event(ConnectionEvent::Closed { epoch, code: Some(1006) });
        let timer = c.connection().machine().pending_timer().unwrap();
        c.on_connection_event(ConnectionEvent::RetryDue { timer });
        c.on_connection_event(ConnectionEvent::Opened {
            epoch: c.connection().epoch(),
        });

        assert_eq!(c.stream().phase(), StreamPhase::Idle);
        assert_eq!(c.transcript().in_progress_count(), 0);
    }

    #[test]
    fn test_normal_close_abandons_stream() {
        let mut c = connected();
        let epoch = c.connection().epoch();
        c.on_text(epoch, r#"{"type":"typing"}"#);
        c.on_connection_event(ConnectionEvent::Closed {
            epoch,
            code: Some(crate::connection::NORMAL_CLOSURE),
        });
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.transcript().in_progress_count(), 0);
        assert!(c.stream().pending().is_none());
    }

    #[test]
    fn test_disconnect_abandons_stream() {
        let mut c = connected();
        let epoch = c.connection().epoch();
        c.on_text(epoch, r#"{"type":"chunk","fullResponse":"x"}"#);
        c.on_text(epoch, r#"{"type":"typing"}"#);
        c.on_text(epoch, r#"{"type":"chunk","fullResponse":"half"}"#);
        let effects = c.disconnect();
        assert!(!effects.contains(&Effect::DiscardStream));
        assert_eq!(c.transcript().in_progress_count(), 0);
        assert!(c.transcript().is_empty());
    }

    #[test]
    fn test_discard_stream_not_forwarded_to_driver() {
        let mut c = client();
        let effects = c.connect();
        assert!(!effects.contains(&Effect::DiscardStream));
        assert!(matches!(effects[0], Effect::Open { .. }));
    }

    #[test]
    fn test_session_stable_across_reconnects() {
        let mut c = connected();
        let before = c.session().clone();
        c.manual_reconnect();
        c.disconnect();
        c.connect();
        assert_eq!(c.session(), &before);
    }
}
