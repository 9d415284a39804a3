//! `Session` — the streaming session handle.
//!
//! One `Session` owns one recording's [`Document`], the protocol
//! [`machine::SessionMachine`], and the sole transport handle. There is no
//! ambient connection object: everything the transport task needs is threaded
//! through one shared context.
//!
//! ## Event flow
//!
//! ```text
//! capture collaborator ──send_audio()──► transport task ──► server
//! server ──text frame──► transport task ──parse──► SessionMachine
//!                                                      │
//!                                          Action::ApplyUpdate ─► Document
//!                                                      │
//!                                    broadcast status / document events
//! ```
//!
//! Inbound messages are applied strictly in arrival order (the transport is
//! a single task reading one FIFO stream), so the resulting document is
//! independent of any batching below the socket.

pub mod machine;
mod transport;

pub use machine::{Action, SessionEvent, SessionMachine, SessionState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::error::Result;
use crate::protocol::{ClientMessage, Handshake};
use crate::session::transport::OutboundFrame;

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the transcription server.
    pub endpoint: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:5000/ws/transcription".into(),
        }
    }
}

/// Emitted whenever the session state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    /// Human-readable detail (error message, server-ended reason).
    pub detail: Option<String>,
}

/// Emitted whenever the document changes.
///
/// Carries the new revision so consumers can pull a consistent snapshot via
/// [`Session::document`]; the sync coordinator uses the revision to decide
/// when its time index is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    pub revision: u64,
    pub segments: usize,
    pub change: DocumentChange,
}

/// What kind of mutation produced a [`DocumentEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentChange {
    /// New session started; the document is fresh.
    Reset,
    /// A server transcript update was merged.
    Merge,
    /// A local user edit was recorded.
    Edit,
}

/// Transport-level side effects produced by dispatching one event.
///
/// Document- and UI-level actions are consumed inside [`Shared::dispatch`];
/// only the operations that need the socket leak out.
#[derive(Debug, PartialEq)]
pub(crate) enum TransportDirective {
    Open,
    SendText(String),
    SendBinary(Vec<u8>),
    Close,
}

/// State shared between the session handle and its transport task.
pub(crate) struct Shared {
    machine: Mutex<SessionMachine>,
    document: Mutex<Document>,
    /// Present while a transport task is alive. Owning the only sender
    /// lets `send_audio`/`disconnect` reach the task without any global.
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    /// Current transport generation, bumped on every accepted connect.
    /// A transport task outliving its session (a stale socket winding down
    /// after a reconnect from `Error`) carries the generation it was
    /// spawned with; its events and cleanup are discarded once superseded.
    generation: AtomicU64,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    document_tx: broadcast::Sender<DocumentEvent>,
}

impl Shared {
    fn new() -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (document_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            machine: Mutex::new(SessionMachine::new()),
            document: Mutex::new(Document::new()),
            outbound: Mutex::new(None),
            generation: AtomicU64::new(0),
            status_tx,
            document_tx,
        }
    }

    /// Feed one event through the state machine and execute every action
    /// that can be handled without the socket. Returns the rest.
    pub(crate) fn dispatch(&self, event: SessionEvent) -> Vec<TransportDirective> {
        let (previous, actions, current) = {
            let mut machine = self.machine.lock();
            let previous = machine.state();
            let actions = machine.handle(event);
            (previous, actions, machine.state())
        };
        self.perform(previous, actions, current)
    }

    /// [`Shared::dispatch`] for transport tasks: the event is discarded when
    /// `generation` is no longer current, so a superseded task cannot move
    /// the machine or touch the document of the session that replaced it.
    /// The check happens under the machine lock, serializing it against
    /// [`Shared::begin_session`].
    pub(crate) fn dispatch_from(
        &self,
        generation: u64,
        event: SessionEvent,
    ) -> Vec<TransportDirective> {
        let (previous, actions, current) = {
            let mut machine = self.machine.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "discarding event from a superseded transport");
                return Vec::new();
            }
            let previous = machine.state();
            let actions = machine.handle(event);
            (previous, actions, machine.state())
        };
        self.perform(previous, actions, current)
    }

    /// Accept a connect request and fence out any previous transport task.
    ///
    /// Returns the generation for the new transport, or `None` when the
    /// machine ignored the request (a transport is already active). The
    /// generation is bumped under the machine lock, so no event from an
    /// old task can slip in between acceptance and the fence.
    fn begin_session(&self, recording_id: String) -> Option<u64> {
        let (generation, previous, current) = {
            let mut machine = self.machine.lock();
            let previous = machine.state();
            let actions = machine.handle(SessionEvent::ConnectRequested { recording_id });
            if !actions.contains(&Action::OpenTransport) {
                return None;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, previous, machine.state())
        };

        if current != previous {
            let _ = self.status_tx.send(SessionStatusEvent {
                state: current,
                detail: None,
            });
        }
        Some(generation)
    }

    fn perform(
        &self,
        previous: SessionState,
        actions: Vec<Action>,
        current: SessionState,
    ) -> Vec<TransportDirective> {
        let mut directives = Vec::new();
        let mut detail = None;

        for action in actions {
            match action {
                Action::OpenTransport => directives.push(TransportDirective::Open),
                Action::SendHandshake { recording_id } => {
                    match serde_json::to_string(&Handshake { recording_id }) {
                        Ok(json) => directives.push(TransportDirective::SendText(json)),
                        Err(e) => error!(error = %e, "failed to encode handshake"),
                    }
                }
                Action::SendStop => match serde_json::to_string(&ClientMessage::Stop) {
                    Ok(json) => directives.push(TransportDirective::SendText(json)),
                    Err(e) => error!(error = %e, "failed to encode stop message"),
                },
                Action::CloseTransport => directives.push(TransportDirective::Close),
                Action::ApplyUpdate(update) => self.apply_update(update),
                Action::SessionEnded { reason } => {
                    info!(%reason, "session ended by server");
                    detail = Some(reason);
                }
                Action::SurfaceError { message } => {
                    error!(%message, "session error");
                    detail = Some(message);
                }
            }
        }

        if current != previous {
            let _ = self.status_tx.send(SessionStatusEvent {
                state: current,
                detail,
            });
        }

        directives
    }

    /// Merge one inbound update under the document lock.
    ///
    /// An out-of-range segment index is a protocol violation: the single
    /// update is discarded and the session continues untouched.
    fn apply_update(&self, update: crate::protocol::TranscriptUpdate) {
        let mut document = self.document.lock();
        match document.apply(&update) {
            Ok(next) => {
                let event = DocumentEvent {
                    revision: next.revision(),
                    segments: next.len(),
                    change: DocumentChange::Merge,
                };
                *document = next;
                drop(document);
                let _ = self.document_tx.send(event);
            }
            Err(e) => warn!(error = %e, "discarding transcript update"),
        }
    }

    /// Drop the outbound sender installed for `generation`. A stale task's
    /// cleanup must not wipe the channel a newer session installed, so the
    /// generation is checked under the outbound lock.
    pub(crate) fn clear_outbound_from(&self, generation: u64) {
        let mut outbound = self.outbound.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        *outbound = None;
    }
}

/// Handle to one streaming transcription session.
///
/// `Session` is `Send + Sync` — all fields use interior mutability. Wrap in
/// `Arc<Session>` to share between the UI-facing side and async tasks.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Open a streaming session for `recording_id`.
    ///
    /// Resets the document (a new recording starts a fresh transcript) and
    /// spawns the transport task on the current tokio runtime. Calling
    /// `connect` while a transport is already open is a no-op; reconnecting
    /// after `Error` is allowed.
    pub fn connect(&self, recording_id: &str) {
        let Some(generation) = self.shared.begin_session(recording_id.to_string()) else {
            debug!("connect ignored — transport already active");
            return;
        };

        {
            let mut document = self.shared.document.lock();
            *document = Document::new();
        }
        let _ = self.shared.document_tx.send(DocumentEvent {
            revision: 0,
            segments: 1,
            change: DocumentChange::Reset,
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);

        info!(recording_id, endpoint = %self.config.endpoint, "opening session");
        tokio::spawn(transport::run(
            self.config.endpoint.clone(),
            Arc::clone(&self.shared),
            generation,
            outbound_rx,
        ));
    }

    /// End the session: send the `stop` control frame, then close with a
    /// normal-closure code. Safe to call at any time — a no-op outside
    /// `Connected`.
    pub fn disconnect(&self) {
        let directives = self.shared.dispatch(SessionEvent::DisconnectRequested);
        self.forward(directives);
    }

    /// Forward one captured audio frame to the server.
    ///
    /// Frames sent while not `Connected` are dropped — the capture
    /// collaborator routinely races the session teardown.
    pub fn send_audio(&self, frame: Vec<u8>) {
        if self.state() != SessionState::Connected {
            debug!(bytes = frame.len(), "dropping audio frame — not connected");
            return;
        }
        let outbound = self.shared.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => {
                let _ = tx.send(OutboundFrame::Audio(frame));
            }
            None => debug!("dropping audio frame — transport gone"),
        }
    }

    /// Record a local edit from the editing surface.
    ///
    /// # Errors
    /// [`crate::ScrivaError::UnknownWord`] if the id is not in the document.
    pub fn mark_edited(&self, id: &crate::document::WordId, new_text: &str) -> Result<()> {
        let mut document = self.shared.document.lock();
        let next = document.mark_edited(id, new_text)?;
        let event = DocumentEvent {
            revision: next.revision(),
            segments: next.len(),
            change: DocumentChange::Edit,
        };
        *document = next;
        drop(document);
        let _ = self.shared.document_tx.send(event);
        Ok(())
    }

    /// Snapshot of the current document for the rendering collaborator.
    pub fn document(&self) -> Document {
        self.shared.document.lock().clone()
    }

    /// Current session state (snapshot).
    pub fn state(&self) -> SessionState {
        self.shared.machine.lock().state()
    }

    /// Subscribe to session state changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to document change notifications.
    pub fn subscribe_documents(&self) -> broadcast::Receiver<DocumentEvent> {
        self.shared.document_tx.subscribe()
    }

    fn forward(&self, directives: Vec<TransportDirective>) {
        let outbound = self.shared.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return;
        };
        for directive in directives {
            let frame = match directive {
                TransportDirective::SendText(json) => OutboundFrame::Text(json),
                TransportDirective::SendBinary(bytes) => OutboundFrame::Audio(bytes),
                TransportDirective::Close => OutboundFrame::Close,
                TransportDirective::Open => continue,
            };
            let _ = tx.send(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerMessage, TranscriptUpdate, UpdateWord};

    fn update(segment_index: usize, text: &str, is_final: bool) -> TranscriptUpdate {
        TranscriptUpdate {
            recording_id: "rec-1".into(),
            segment_index,
            transcript: text.into(),
            words: vec![UpdateWord {
                text: text.into(),
                start: segment_index as f64,
                end: segment_index as f64 + 0.5,
            }],
            is_final,
            start: 0.0,
            end: 0.0,
        }
    }

    fn connected_shared() -> Shared {
        let shared = Shared::new();
        shared.dispatch(SessionEvent::ConnectRequested {
            recording_id: "rec-1".into(),
        });
        shared.dispatch(SessionEvent::TransportOpened);
        shared
    }

    #[test]
    fn transport_open_produces_handshake_json() {
        let shared = Shared::new();
        shared.dispatch(SessionEvent::ConnectRequested {
            recording_id: "rec-9".into(),
        });
        let directives = shared.dispatch(SessionEvent::TransportOpened);
        assert_eq!(
            directives,
            vec![TransportDirective::SendText(
                r#"{"recordingId":"rec-9"}"#.into()
            )]
        );
    }

    #[test]
    fn inbound_update_mutates_the_shared_document() {
        let shared = connected_shared();
        let mut document_rx = shared.document_tx.subscribe();

        let directives = shared.dispatch(SessionEvent::Inbound(ServerMessage::TranscriptUpdate(
            update(0, "hello", false),
        )));
        assert!(directives.is_empty());
        assert_eq!(shared.document.lock().text(), "hello");

        let event = document_rx.try_recv().expect("document event");
        assert_eq!(event.change, DocumentChange::Merge);
        assert_eq!(event.revision, 1);
    }

    #[test]
    fn out_of_range_update_is_discarded_without_state_change() {
        let shared = connected_shared();
        let before = shared.document.lock().clone();

        shared.dispatch(SessionEvent::Inbound(ServerMessage::TranscriptUpdate(
            update(5, "ghost", false),
        )));

        assert_eq!(*shared.document.lock(), before);
        assert_eq!(shared.machine.lock().state(), SessionState::Connected);
    }

    #[test]
    fn batched_and_sequential_dispatch_yield_the_same_document() {
        let updates = [
            update(0, "one", true),
            update(1, "two", false),
            update(1, "two!", true),
        ];

        let sequential = connected_shared();
        for u in &updates {
            sequential.dispatch(SessionEvent::Inbound(ServerMessage::TranscriptUpdate(
                u.clone(),
            )));
        }

        let batched = connected_shared();
        let events: Vec<_> = updates
            .iter()
            .map(|u| SessionEvent::Inbound(ServerMessage::TranscriptUpdate(u.clone())))
            .collect();
        for e in events {
            batched.dispatch(e);
        }

        assert_eq!(*sequential.document.lock(), *batched.document.lock());
    }

    #[test]
    fn server_ended_session_emits_disconnected_status_with_reason() {
        let shared = connected_shared();
        let mut status_rx = shared.status_tx.subscribe();

        let directives = shared.dispatch(SessionEvent::Inbound(ServerMessage::SessionEnded {
            reason: "done".into(),
        }));
        assert_eq!(directives, vec![TransportDirective::Close]);

        let event = status_rx.try_recv().expect("status event");
        assert_eq!(event.state, SessionState::Disconnected);
        assert_eq!(event.detail.as_deref(), Some("done"));
    }

    #[test]
    fn disconnect_emits_stop_then_close() {
        let shared = connected_shared();
        let directives = shared.dispatch(SessionEvent::DisconnectRequested);
        assert_eq!(
            directives,
            vec![
                TransportDirective::SendText(r#"{"type":"stop"}"#.into()),
                TransportDirective::Close,
            ]
        );
    }

    #[test]
    fn server_error_closes_the_transport_and_reconnect_gets_a_new_generation() {
        let shared = Shared::new();
        let gen1 = shared.begin_session("rec-1".into()).expect("first connect");
        shared.dispatch_from(gen1, SessionEvent::TransportOpened);

        let directives = shared.dispatch_from(
            gen1,
            SessionEvent::Inbound(ServerMessage::Error {
                message: "boom".into(),
            }),
        );
        assert_eq!(directives, vec![TransportDirective::Close]);
        assert_eq!(shared.machine.lock().state(), SessionState::Error);

        let gen2 = shared
            .begin_session("rec-2".into())
            .expect("reconnect from error");
        assert!(gen2 > gen1);

        // The old task winding down must not move the new session's machine.
        assert!(shared
            .dispatch_from(gen1, SessionEvent::TransportClosed)
            .is_empty());
        assert_eq!(shared.machine.lock().state(), SessionState::Connecting);
    }

    #[test]
    fn stale_transport_cleanup_leaves_the_new_outbound_channel_in_place() {
        let shared = Shared::new();
        let gen1 = shared.begin_session("rec-1".into()).expect("first connect");
        shared.dispatch_from(gen1, SessionEvent::TransportOpened);
        shared.dispatch_from(
            gen1,
            SessionEvent::Inbound(ServerMessage::Error {
                message: "boom".into(),
            }),
        );

        let gen2 = shared.begin_session("rec-2".into()).expect("reconnect");
        let (tx, _rx) = mpsc::unbounded_channel();
        *shared.outbound.lock() = Some(tx);

        shared.clear_outbound_from(gen1);
        assert!(shared.outbound.lock().is_some());

        shared.clear_outbound_from(gen2);
        assert!(shared.outbound.lock().is_none());
    }

    #[test]
    fn status_events_fire_only_on_state_changes() {
        let shared = connected_shared();
        let mut status_rx = shared.status_tx.subscribe();

        // No state change: update applied while Connected
        shared.dispatch(SessionEvent::Inbound(ServerMessage::TranscriptUpdate(
            update(0, "hello", false),
        )));
        assert!(status_rx.try_recv().is_err());

        shared.dispatch(SessionEvent::TransportFailed {
            message: "reset".into(),
        });
        let event = status_rx.try_recv().expect("error status");
        assert_eq!(event.state, SessionState::Error);
        assert_eq!(event.detail.as_deref(), Some("reset"));
    }
}
