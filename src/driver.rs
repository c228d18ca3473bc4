//! Event loops that connect a [`ChatClient`] to real I/O.
//!
//! [`WsDriver`] is single-task and cooperative: one `select!` multiplexes
//! user commands, the pending connection attempt, the open socket and the
//! retry timer. Each event is handled to completion before the next one is
//! polled, so no handler observes half-applied state.
//!
//! [`HttpDriver`] runs the legacy request/reply binding through the same
//! client and stream coordinator.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::client::{Attachment, ChatClient};
use crate::connection::{ConnectionEvent, ConnectionState, Effect, Epoch, TimerId};
use crate::http::HttpFallback;
use crate::protocol::InboundFrame;
use crate::transcript::TranscriptChange;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsError = tokio_tungstenite::tungstenite::Error;

// ---------------------------------------------------------------------------
// User commands and UI updates
// ---------------------------------------------------------------------------

/// A line of user input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Send(String),
    Attach(PathBuf),
    Connect,
    Reconnect,
    Disconnect,
    Quit,
}

impl UserCommand {
    /// `/connect`, `/reconnect`, `/disconnect`, `/attach <path>` and `/quit`
    /// are commands; any other non-empty line is a message.
    pub fn parse(line: &str) -> Option<UserCommand> {
        let trimmed = line.trim();
        match trimmed {
            "" => None,
            "/connect" => Some(UserCommand::Connect),
            "/reconnect" => Some(UserCommand::Reconnect),
            "/disconnect" => Some(UserCommand::Disconnect),
            "/quit" | "/exit" => Some(UserCommand::Quit),
            _ => match trimmed.strip_prefix("/attach ") {
                Some(path) if !path.trim().is_empty() => {
                    Some(UserCommand::Attach(PathBuf::from(path.trim())))
                }
                _ => Some(UserCommand::Send(line.to_string())),
            },
        }
    }
}

/// What the front end needs to redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    Transcript(TranscriptChange),
    Status {
        state: ConnectionState,
        attempts: u32,
        awaiting_manual: bool,
    },
    Notice(String),
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Forwards transcript changes and status changes to the UI channel.
struct Publisher {
    ui: mpsc::UnboundedSender<UiUpdate>,
    last_status: Option<(ConnectionState, u32, bool)>,
}

impl Publisher {
    fn new(ui: mpsc::UnboundedSender<UiUpdate>) -> Self {
        Publisher {
            ui,
            last_status: None,
        }
    }

    fn changes(&self, client: &mut ChatClient) {
        for change in client.drain_changes() {
            let _ = self.ui.send(UiUpdate::Transcript(change));
        }
    }

    fn status(&mut self, client: &ChatClient) {
        let machine = client.connection().machine();
        let status = (
            machine.state(),
            machine.attempts(),
            machine.awaiting_manual_reconnect(),
        );
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            let _ = self.ui.send(UiUpdate::Status {
                state: status.0,
                attempts: status.1,
                awaiting_manual: status.2,
            });
        }
    }

    fn notice(&self, text: impl Into<String>) {
        let _ = self.ui.send(UiUpdate::Notice(text.into()));
    }
}

// ---------------------------------------------------------------------------
// WebSocket driver
// ---------------------------------------------------------------------------

struct Transport {
    epoch: Epoch,
    ws: WsStream,
}

struct Opening {
    epoch: Epoch,
    fut: BoxFuture<'static, Result<WsStream, WsError>>,
}

struct RetryTimer {
    id: TimerId,
    sleep: Pin<Box<Sleep>>,
}

async fn poll_opening(opening: &mut Option<Opening>) -> (Epoch, Result<WsStream, WsError>) {
    match opening {
        Some(o) => {
            let result = (&mut o.fut).await;
            (o.epoch, result)
        }
        None => std::future::pending().await,
    }
}

async fn next_message(
    transport: &mut Option<Transport>,
) -> (Epoch, Option<Result<WsMessage, WsError>>) {
    match transport {
        Some(t) => (t.epoch, t.ws.next().await),
        None => std::future::pending().await,
    }
}

async fn wait_timer(timer: &mut Option<RetryTimer>) -> TimerId {
    match timer {
        Some(t) => {
            t.sleep.as_mut().await;
            t.id
        }
        None => std::future::pending().await,
    }
}

/// WebSocket event loop.
pub struct WsDriver {
    url: String,
    client: ChatClient,
    publisher: Publisher,
    transport: Option<Transport>,
    opening: Option<Opening>,
    timer: Option<RetryTimer>,
}

impl WsDriver {
    pub fn new(url: impl Into<String>, client: ChatClient, ui: mpsc::UnboundedSender<UiUpdate>) -> Self {
        WsDriver {
            url: url.into(),
            client,
            publisher: Publisher::new(ui),
            transport: None,
            opening: None,
            timer: None,
        }
    }

    /// Connect and process events until `/quit` or the command channel
    /// closes. Returns the client so its transcript can be inspected.
    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) -> ChatClient {
        info!(url = %self.url, session = %self.client.session(), "starting websocket client");
        let effects = self.client.connect();
        self.execute(effects).await;
        self.publish();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    None | Some(UserCommand::Quit) => {
                        let effects = self.client.disconnect();
                        self.execute(effects).await;
                        self.publish();
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                },
                (epoch, result) = poll_opening(&mut self.opening) => {
                    self.opening = None;
                    let event = match result {
                        Ok(ws) => {
                            debug!(%epoch, "websocket opened");
                            self.transport = Some(Transport { epoch, ws });
                            ConnectionEvent::Opened { epoch }
                        }
                        Err(e) => {
                            warn!(%epoch, error = %e, "websocket connect failed");
                            ConnectionEvent::Failed { epoch, detail: e.to_string() }
                        }
                    };
                    let effects = self.client.on_connection_event(event);
                    self.execute(effects).await;
                }
                (epoch, msg) = next_message(&mut self.transport) => {
                    self.on_message(epoch, msg).await;
                }
                timer = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    let effects = self.client.on_connection_event(ConnectionEvent::RetryDue { timer });
                    self.execute(effects).await;
                }
            }
            self.publish();
        }

        self.client
    }

    fn publish(&mut self) {
        self.publisher.changes(&mut self.client);
        self.publisher.status(&self.client);
    }

    async fn on_command(&mut self, cmd: UserCommand) {
        let effects = match cmd {
            UserCommand::Send(text) => match self.client.send_message(&text) {
                Some(effect) => vec![effect],
                None => {
                    if self.client.state() != ConnectionState::Connected {
                        self.publisher
                            .notice("not connected: message was not delivered (use /reconnect)");
                    }
                    Vec::new()
                }
            },
            UserCommand::Attach(path) => {
                attach(&mut self.client, &self.publisher, path).await;
                Vec::new()
            }
            UserCommand::Connect => self.client.connect(),
            UserCommand::Reconnect => self.client.manual_reconnect(),
            UserCommand::Disconnect => self.client.disconnect(),
            UserCommand::Quit => Vec::new(),
        };
        self.execute(effects).await;
    }

    async fn on_message(&mut self, epoch: Epoch, msg: Option<Result<WsMessage, WsError>>) {
        let event = match msg {
            Some(Ok(WsMessage::Text(text))) => {
                self.client.on_text(epoch, &text);
                return;
            }
            Some(Ok(WsMessage::Close(frame))) => {
                let code = frame.map(|f| u16::from(f.code));
                debug!(%epoch, ?code, "websocket closed by peer");
                ConnectionEvent::Closed { epoch, code }
            }
            Some(Ok(_)) => return, // binary / ping / pong
            Some(Err(e)) => {
                warn!(%epoch, error = %e, "websocket read failed");
                ConnectionEvent::Failed {
                    epoch,
                    detail: e.to_string(),
                }
            }
            None => ConnectionEvent::Closed { epoch, code: None },
        };
        self.transport = None;
        let effects = self.client.on_connection_event(event);
        self.execute(effects).await;
    }

    /// Run effects in order. Effects produced while running one (a failed
    /// write) are appended to the same queue.
    async fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Open { epoch } => {
                    self.transport = None;
                    let url = self.url.clone();
                    self.opening = Some(Opening {
                        epoch,
                        fut: async move {
                            tokio_tungstenite::connect_async(url.as_str())
                                .await
                                .map(|(ws, _response)| ws)
                        }
                        .boxed(),
                    });
                }
                Effect::Close { epoch, code } => {
                    if self.opening.as_ref().is_some_and(|o| o.epoch == epoch) {
                        self.opening = None;
                    }
                    if let Some(mut t) = self.transport.take_if(|t| t.epoch == epoch) {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if let Err(e) = t.ws.close(Some(frame)).await {
                            debug!(%epoch, error = %e, "close handshake failed");
                        }
                    }
                }
                Effect::ArmTimer { timer, delay } => {
                    self.timer = Some(RetryTimer {
                        id: timer,
                        sleep: Box::pin(tokio::time::sleep(delay)),
                    });
                }
                Effect::CancelTimer { timer } => {
                    if self.timer.as_ref().is_some_and(|t| t.id == timer) {
                        self.timer = None;
                    }
                }
                Effect::Transmit { epoch, payload } => {
                    let Some(t) = self.transport.as_mut().filter(|t| t.epoch == epoch) else {
                        debug!(%epoch, "no open transport for outbound frame");
                        continue;
                    };
                    if let Err(e) = t.ws.send(WsMessage::Text(payload)).await {
                        warn!(%epoch, error = %e, "websocket write failed");
                        self.transport = None;
                        queue.extend(self.client.on_connection_event(ConnectionEvent::Failed {
                            epoch,
                            detail: e.to_string(),
                        }));
                    }
                }
                Effect::RetriesExhausted { attempts } => {
                    self.publisher.notice(format!(
                        "connection lost after {attempts} reconnect attempts; use /reconnect to try again"
                    ));
                }
                Effect::DiscardStream => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn attach(client: &mut ChatClient, publisher: &Publisher, path: PathBuf) {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => client.attach(Attachment::from_path(&path)),
        Ok(_) => publisher.notice(format!("{} is not a file", path.display())),
        Err(e) => publisher.notice(format!("cannot attach {}: {e}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// HTTP driver
// ---------------------------------------------------------------------------

/// Request/reply event loop over the legacy HTTP binding.
pub struct HttpDriver {
    http: HttpFallback,
    client: ChatClient,
    publisher: Publisher,
}

impl HttpDriver {
    pub fn new(http: HttpFallback, client: ChatClient, ui: mpsc::UnboundedSender<UiUpdate>) -> Self {
        HttpDriver {
            http,
            client,
            publisher: Publisher::new(ui),
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<UserCommand>) -> ChatClient {
        info!(endpoint = %self.http.endpoint(), session = %self.client.session(), "starting http client");
        let tick = self.http.reveal().tick();

        while let Some(cmd) = commands.recv().await {
            match cmd {
                UserCommand::Quit => break,
                UserCommand::Send(text) => {
                    let Some(frame) = self.client.compose(&text) else {
                        continue;
                    };
                    self.publisher.changes(&mut self.client);
                    let frames = self.http.exchange(&frame).await;
                    self.play(&frames, tick).await;
                }
                UserCommand::Attach(path) => {
                    attach(&mut self.client, &self.publisher, path).await;
                    self.publisher.changes(&mut self.client);
                }
                UserCommand::Connect | UserCommand::Reconnect | UserCommand::Disconnect => {
                    self.publisher
                        .notice("the HTTP binding has no persistent connection");
                }
            }
        }

        self.client
    }

    /// Apply frames one by one, pausing `tick` before each chunk.
    async fn play(&mut self, frames: &[InboundFrame], tick: Duration) {
        for frame in frames {
            if matches!(frame, InboundFrame::Chunk { .. }) && !tick.is_zero() {
                tokio::time::sleep(tick).await;
            }
            self.client.on_frame(frame);
            self.publisher.changes(&mut self.client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/connect", Some(UserCommand::Connect))]
    #[case("  /reconnect ", Some(UserCommand::Reconnect))]
    #[case("/disconnect", Some(UserCommand::Disconnect))]
    #[case("/quit", Some(UserCommand::Quit))]
    #[case("/exit", Some(UserCommand::Quit))]
    #[case("/attach ./notes.md", Some(UserCommand::Attach(PathBuf::from("./notes.md"))))]
    #[case("hello there", Some(UserCommand::Send("hello there".into())))]
    #[case("/attach", Some(UserCommand::Send("/attach".into())))]
    #[case("   ", None)]
    fn test_parse_user_command(#[case] line: &str, #[case] expected: Option<UserCommand>) {
        assert_eq!(UserCommand::parse(line), expected);
    }

    #[test]
    fn test_publisher_deduplicates_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut publisher = Publisher::new(tx);
        let client = ChatClient::from_config(&crate::config::ClientConfig::default());
        publisher.status(&client);
        publisher.status(&client);
        assert!(matches!(rx.try_recv(), Ok(UiUpdate::Status { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_slots_stay_pending() {
        let mut opening = None;
        let mut fut = tokio_test::task::spawn(poll_opening(&mut opening));
        tokio_test::assert_pending!(fut.poll());

        let mut transport = None;
        let mut fut = tokio_test::task::spawn(next_message(&mut transport));
        tokio_test::assert_pending!(fut.poll());

        let mut timer = None;
        let mut fut = tokio_test::task::spawn(wait_timer(&mut timer));
        tokio_test::assert_pending!(fut.poll());
    }

    #[tokio::test]
    async fn test_http_driver_reports_fetch_failure_inline() {
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let client = ChatClient::from_config(&crate::config::ClientConfig::default());
        let http = HttpFallback::new("http://127.0.0.1:9/chat", Default::default());

        cmd_tx.send(UserCommand::Send("ping".into())).await.unwrap();
        cmd_tx.send(UserCommand::Quit).await.unwrap();
        let client = HttpDriver::new(http, client, ui_tx).run(cmd_rx).await;

        let entries = client.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "ping");
        assert!(entries[1].is_error);
        assert_eq!(entries[1].content, crate::http::FETCH_FAILED_TEXT);
        assert!(matches!(ui_rx.try_recv(), Ok(UiUpdate::Transcript(_))));
    }
}
