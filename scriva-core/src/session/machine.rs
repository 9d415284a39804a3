//! Pure session protocol state machine.
//!
//! ## States
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──transport open──► Connected
//!      ▲                          │                              │
//!      │◄──── transport close ────┴──────────┐                   │
//!      │◄──── session_ended / disconnect() ──┼───────────────────┤
//!                                            │                   │
//!                  Error ◄─── transport error┴── / server error ─┘
//! ```
//!
//! `Error` is sticky: a transport close while in `Error` stays in `Error`,
//! and only an explicit new `connect()` leaves it. The machine is pure —
//! it owns no transport and performs no I/O. Every event produces a list
//! of [`Action`]s for the caller to execute, which is what makes the whole
//! protocol table testable without a socket.

use crate::protocol::{ServerMessage, TranscriptUpdate};

/// Lifecycle state of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport. Initial state, and terminal unless reconnected.
    Disconnected,
    /// Transport opening; handshake not yet sent.
    Connecting,
    /// Transport open, handshake sent; updates may arrive.
    Connected,
    /// Terminal failure until an explicit new `connect()`.
    Error,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Caller asked to open a session for `recording_id`.
    ConnectRequested { recording_id: String },
    /// The transport finished opening.
    TransportOpened,
    /// A parsed inbound server message.
    Inbound(ServerMessage),
    /// The transport failed (connect error, read/write error).
    TransportFailed { message: String },
    /// The transport closed.
    TransportClosed,
    /// Caller asked to end the session.
    DisconnectRequested,
}

/// Side effects the caller must perform after handling an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open the streaming transport.
    OpenTransport,
    /// Send the handshake frame binding the connection to a recording.
    SendHandshake { recording_id: String },
    /// Fold a transcript update into the document.
    ApplyUpdate(TranscriptUpdate),
    /// Send the `stop` control frame.
    SendStop,
    /// Close the transport with a normal-closure code.
    CloseTransport,
    /// The server ended the session; surface the reason.
    SessionEnded { reason: String },
    /// Surface a terminal error message to the UI layer.
    SurfaceError { message: String },
}

/// The protocol table. One instance per [`crate::session::Session`].
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    recording_id: Option<String>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            recording_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The recording this session is (or was last) bound to.
    pub fn recording_id(&self) -> Option<&str> {
        self.recording_id.as_deref()
    }

    /// Advance the machine by one event.
    ///
    /// Events that are invalid in the current state are discarded: a second
    /// `connect()` while a transport is open is a no-op (not queued, not an
    /// error), `disconnect()` outside `Connected` is a safe no-op, and
    /// inbound messages outside `Connected` are dropped.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        use SessionState::*;

        match (self.state, event) {
            // Connect is accepted from both terminal states. Anywhere else a
            // transport already exists, so the request is ignored.
            (Disconnected | Error, SessionEvent::ConnectRequested { recording_id }) => {
                self.state = Connecting;
                self.recording_id = Some(recording_id);
                vec![Action::OpenTransport]
            }
            (_, SessionEvent::ConnectRequested { .. }) => Vec::new(),

            (Connecting, SessionEvent::TransportOpened) => {
                self.state = Connected;
                let recording_id = self.recording_id.clone().unwrap_or_default();
                vec![Action::SendHandshake { recording_id }]
            }
            // A stale open racing a failure or close — nothing to do.
            (_, SessionEvent::TransportOpened) => Vec::new(),

            (Connected, SessionEvent::Inbound(message)) => self.handle_inbound(message),
            // Late or early inbound traffic — protocol violation, drop it.
            (_, SessionEvent::Inbound(_)) => Vec::new(),

            (Connected, SessionEvent::DisconnectRequested) => {
                self.state = Disconnected;
                vec![Action::SendStop, Action::CloseTransport]
            }
            (_, SessionEvent::DisconnectRequested) => Vec::new(),

            (_, SessionEvent::TransportFailed { message }) => {
                self.state = Error;
                vec![Action::SurfaceError { message }]
            }

            // Error is sticky across the eventual close of the failed
            // transport; everything else falls back to Disconnected.
            (Error, SessionEvent::TransportClosed) => Vec::new(),
            (_, SessionEvent::TransportClosed) => {
                self.state = Disconnected;
                Vec::new()
            }
        }
    }

    fn handle_inbound(&mut self, message: ServerMessage) -> Vec<Action> {
        match message {
            ServerMessage::TranscriptUpdate(update) => vec![Action::ApplyUpdate(update)],
            ServerMessage::SessionEnded { reason } => {
                // The server already ended the stream — close without stop.
                self.state = SessionState::Disconnected;
                vec![Action::SessionEnded { reason }, Action::CloseTransport]
            }
            ServerMessage::Error { message } => {
                // Terminal for this transport — tear the socket down too.
                self.state = SessionState::Error;
                vec![Action::SurfaceError { message }, Action::CloseTransport]
            }
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
