//! Reassembly of streamed assistant responses into the transcript.
//!
//! ## Guarantees
//! - At most one [`PendingStream`] exists. A new `typing` frame discards the
//!   previous one without leaving a partial entry behind.
//! - `chunk` frames carry the full text so far; the slot is replaced
//!   wholesale, never appended to.
//! - Every `complete` frame yields exactly one assistant entry, whether or
//!   not a stream was in progress.
//! - Rendering failures fall back to raw text and never drop content.

use tracing::{debug, info};

use crate::protocol::InboundFrame;
use crate::render::{render_or_raw, Renderer};
use crate::transcript::{Role, SlotId, Transcript};

/// Shown in a new assistant slot until the first chunk arrives.
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

/// Shown for an `error` frame without a message.
pub const ERROR_FALLBACK_MESSAGE: &str = "Sorry, something went wrong while generating a response.";

/// The assistant response currently being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStream {
    pub slot: SlotId,
    /// Latest cumulative text received.
    pub text: String,
    pub chunks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    /// Placeholder shown, no content yet.
    Typing,
    Streaming,
}

#[derive(Debug, Default)]
pub struct StreamCoordinator {
    pending: Option<PendingStream>,
}

impl StreamCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingStream> {
        self.pending.as_ref()
    }

    pub fn phase(&self) -> StreamPhase {
        match &self.pending {
            None => StreamPhase::Idle,
            Some(p) if p.chunks == 0 => StreamPhase::Typing,
            Some(_) => StreamPhase::Streaming,
        }
    }

    /// Remove the in-progress slot, if any. Returns whether one existed.
    pub fn discard(&mut self, transcript: &mut Transcript) -> bool {
        match self.pending.take() {
            Some(stream) => {
                transcript.discard_slot(stream.slot);
                debug!(slot = stream.slot.0, "discarded in-progress stream");
                true
            }
            None => false,
        }
    }

    /// Apply one inbound frame to the transcript.
    pub fn handle_frame(
        &mut self,
        frame: &InboundFrame,
        transcript: &mut Transcript,
        renderer: &dyn Renderer,
    ) {
        match frame {
            InboundFrame::System { message } => {
                info!(message = %message, "system frame");
            }
            InboundFrame::Typing => {
                self.discard(transcript);
                let slot = transcript.open_slot(Role::Assistant, THINKING_PLACEHOLDER);
                self.pending = Some(PendingStream {
                    slot,
                    text: String::new(),
                    chunks: 0,
                });
            }
            InboundFrame::Chunk { full_response } => {
                let Some(stream) = self.pending.as_mut() else {
                    debug!("chunk without an active stream, ignoring");
                    return;
                };
                stream.text.clone_from(full_response);
                stream.chunks += 1;
                let rendered = render_or_raw(renderer, full_response);
                transcript.update_slot(stream.slot, full_response.clone(), rendered);
            }
            InboundFrame::Complete { message } => {
                let rendered = render_or_raw(renderer, message);
                match self.pending.take() {
                    Some(stream) => {
                        transcript.finalize_slot(stream.slot, message.clone(), rendered, false);
                    }
                    None => {
                        transcript.append(Role::Assistant, message.clone(), rendered, false);
                    }
                }
            }
            InboundFrame::Error { message } => {
                self.discard(transcript);
                let text = match message.as_deref().map(str::trim) {
                    Some(m) if !m.is_empty() => m.to_string(),
                    _ => ERROR_FALLBACK_MESSAGE.to_string(),
                };
                transcript.append(Role::Assistant, text.clone(), text, true);
            }
            InboundFrame::Unknown => {
                debug!("ignoring frame of unknown type");
            }
        }
    }
}
