//! Client-side connection manager for a streaming chat service.
//!
//! Keeps one persistent WebSocket session to the service, reassembles
//! streamed responses into a transcript and reconnects with bounded
//! exponential backoff after transient loss.
//!
//! The core ([`connection`], [`stream`], [`client`]) is free of I/O; the
//! [`driver`] module runs it on tokio against tokio-tungstenite or the
//! legacy HTTP binding in [`http`].

pub mod backoff;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod http;
pub mod protocol;
pub mod render;
pub mod session;
pub mod stream;
pub mod transcript;

pub use client::{Attachment, ChatClient};
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, Effect, Epoch};
pub use error::ClientError;
pub use protocol::{InboundFrame, OutboundFrame};
pub use session::SessionId;
pub use stream::{StreamCoordinator, StreamPhase};
pub use transcript::{Role, Transcript, TranscriptChange, TranscriptEntry};
