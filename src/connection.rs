//! Connection lifecycle state machine.
//!
//! ## Design
//! - [`transition`] is a pure function `(Machine, ConnectionEvent) -> (Machine, Vec<Effect>)`.
//!   It performs no I/O and can be tested without a socket.
//! - [`ConnectionManager`] owns the current [`Machine`], logs transitions and
//!   hands the resulting [`Effect`]s to whoever drives the transport.
//! - Every transport is tagged with an [`Epoch`]. Events carrying an older
//!   epoch are stale and change nothing, so a socket that was replaced can
//!   never schedule a retry or flip the state.
//! - At most one retry timer is outstanding. Scheduling a new one cancels the
//!   previous one first, and a [`ConnectionEvent::RetryDue`] for any timer
//!   other than the pending one is ignored.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::protocol::OutboundFrame;

/// WebSocket "normal closure" close code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Lifetime of one underlying transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one armed retry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// A transport exists (opening or open).
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Inputs to the state machine: requests from the UI and reports from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectRequested,
    /// User override. Resets the attempt counter from any state.
    ManualReconnect,
    /// Intentional close. Never retried.
    DisconnectRequested,
    Opened { epoch: Epoch },
    /// The transport closed. `code` is `None` when no close frame arrived.
    Closed { epoch: Epoch, code: Option<u16> },
    /// The transport failed to open or broke while open.
    Failed { epoch: Epoch, detail: String },
    RetryDue { timer: TimerId },
}

/// Work the state machine asks its driver (or owner) to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a new transport for `epoch`, dropping any previous one.
    Open { epoch: Epoch },
    Close { epoch: Epoch, code: u16 },
    ArmTimer { timer: TimerId, delay: Duration },
    CancelTimer { timer: TimerId },
    /// Write a text frame on the transport of `epoch`.
    Transmit { epoch: Epoch, payload: String },
    /// Drop any in-progress assistant stream. Emitted whenever a transport
    /// ends or a new one begins.
    DiscardStream,
    /// Automatic attempts are spent; only a manual reconnect continues.
    RetriesExhausted { attempts: u32 },
}

/// Complete connection state: lifecycle state, backoff counter, current
/// epoch and the pending retry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    state: ConnectionState,
    policy: ReconnectPolicy,
    epoch: Epoch,
    pending_timer: Option<TimerId>,
    next_timer: u64,
}

impl Machine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Machine {
            state: ConnectionState::Disconnected,
            policy,
            epoch: Epoch::default(),
            pending_timer: None,
            next_timer: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.policy.attempts()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// No transport, no timer and no budget left.
    pub fn awaiting_manual_reconnect(&self) -> bool {
        !self.state.is_active() && self.pending_timer.is_none() && self.policy.is_exhausted()
    }

    fn cancel_timer(&mut self, effects: &mut Vec<Effect>) {
        if let Some(timer) = self.pending_timer.take() {
            effects.push(Effect::CancelTimer { timer });
        }
    }

    fn begin_epoch(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_timer(effects);
        self.epoch = self.epoch.next();
        self.state = ConnectionState::Connecting;
        effects.push(Effect::DiscardStream);
        effects.push(Effect::Open { epoch: self.epoch });
    }

    fn schedule_retry(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_timer(effects);
        match self.policy.next_delay() {
            Some(delay) => {
                self.next_timer += 1;
                let timer = TimerId(self.next_timer);
                self.pending_timer = Some(timer);
                effects.push(Effect::ArmTimer { timer, delay });
            }
            None => {
                self.state = ConnectionState::Disconnected;
                effects.push(Effect::RetriesExhausted {
                    attempts: self.policy.attempts(),
                });
            }
        }
    }
}

/// Pure transition function of the connection state machine.
pub fn transition(machine: Machine, event: &ConnectionEvent) -> (Machine, Vec<Effect>) {
    let mut m = machine;
    let mut effects = Vec::new();

    match event {
        ConnectionEvent::ConnectRequested => {
            if !m.state.is_active() {
                m.begin_epoch(&mut effects);
            }
        }
        ConnectionEvent::ManualReconnect => {
            m.policy.reset();
            if m.state.is_active() {
                effects.push(Effect::Close {
                    epoch: m.epoch,
                    code: NORMAL_CLOSURE,
                });
            }
            m.begin_epoch(&mut effects);
        }
        ConnectionEvent::DisconnectRequested => {
            m.cancel_timer(&mut effects);
            if m.state.is_active() {
                effects.push(Effect::Close {
                    epoch: m.epoch,
                    code: NORMAL_CLOSURE,
                });
                effects.push(Effect::DiscardStream);
            }
            // Late reports from the closed transport become stale.
            m.epoch = m.epoch.next();
            m.state = ConnectionState::Disconnected;
        }
        ConnectionEvent::Opened { epoch } => {
            if *epoch == m.epoch && m.state == ConnectionState::Connecting {
                m.state = ConnectionState::Connected;
                m.policy.reset();
                m.cancel_timer(&mut effects);
                effects.push(Effect::DiscardStream);
            }
        }
        ConnectionEvent::Closed { epoch, code } => {
            if *epoch == m.epoch && m.state.is_active() {
                m.state = ConnectionState::Disconnected;
                effects.push(Effect::DiscardStream);
                if *code != Some(NORMAL_CLOSURE) {
                    m.schedule_retry(&mut effects);
                }
            }
        }
        ConnectionEvent::Failed { epoch, .. } => {
            if *epoch == m.epoch && m.state.is_active() {
                m.state = ConnectionState::Error;
                effects.push(Effect::DiscardStream);
                m.schedule_retry(&mut effects);
            }
        }
        ConnectionEvent::RetryDue { timer } => {
            if m.pending_timer == Some(*timer) {
                m.pending_timer = None;
                if !m.state.is_active() {
                    m.begin_epoch(&mut effects);
                }
            }
        }
    }

    (m, effects)
}

/// Owns exactly one logical connection and hides reconnection churn.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    machine: Machine,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        ConnectionManager {
            machine: Machine::new(policy),
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn attempts(&self) -> u32 {
        self.machine.attempts()
    }

    pub fn epoch(&self) -> Epoch {
        self.machine.epoch()
    }

    /// Feed one event through [`transition`] and return the effects to run.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        let before = self.machine.state();
        let (next, effects) = transition(self.machine, &event);
        self.machine = next;

        if before != next.state() {
            debug!(from = %before, to = %next.state(), epoch = %next.epoch(), ?event, "connection state changed");
        }
        for effect in &effects {
            match effect {
                Effect::ArmTimer { delay, .. } => info!(
                    attempt = next.attempts(),
                    max_attempts = next.policy().max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                ),
                Effect::RetriesExhausted { attempts } => warn!(
                    attempts,
                    "automatic reconnect attempts exhausted, waiting for manual reconnect"
                ),
                _ => {}
            }
        }
        effects
    }

    /// No-op when already connected or connecting.
    pub fn connect(&mut self) -> Vec<Effect> {
        self.handle(ConnectionEvent::ConnectRequested)
    }

    pub fn manual_reconnect(&mut self) -> Vec<Effect> {
        self.handle(ConnectionEvent::ManualReconnect)
    }

    pub fn disconnect(&mut self) -> Vec<Effect> {
        self.handle(ConnectionEvent::DisconnectRequested)
    }

    /// Prepare a frame for the open transport.
    ///
    /// Returns `None` (and logs) unless the state is `connected`. Nothing is
    /// queued for later delivery.
    pub fn send(&self, frame: &OutboundFrame) -> Option<Effect> {
        if self.state() != ConnectionState::Connected {
            warn!(state = %self.state(), "dropping outbound message, not connected");
            return None;
        }
        match frame.encode() {
            Ok(payload) => Some(Effect::Transmit {
                epoch: self.epoch(),
                payload,
            }),
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                None
            }
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
