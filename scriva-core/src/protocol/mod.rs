//! Wire messages exchanged with the transcription server.
//!
//! ## Message flow
//!
//! | Direction | Frame | Shape |
//! |-----------|-------|-------|
//! | client → server, once on open | text | [`Handshake`] |
//! | client → server, every 500 ms | binary | raw encoded audio |
//! | client → server, on disconnect | text | [`ClientMessage::Stop`] |
//! | server → client | text | [`ServerMessage`] |
//!
//! All text frames are JSON with camelCase field names. Inbound frames that
//! fail to deserialize (unknown `type`, missing fields) are a protocol
//! violation: the single frame is discarded and the session continues.

use serde::{Deserialize, Serialize};

/// Outbound audio frame cadence in milliseconds.
///
/// The capture collaborator slices encoded audio on this interval and hands
/// each slice to [`crate::session::Session::send_audio`]. Inbound message
/// timing is independent of this cadence.
pub const AUDIO_FRAME_INTERVAL_MS: u64 = 500;

/// First client→server frame after the transport opens.
///
/// Binds this connection to one recording. The `recordingId` is allocated
/// out of band (HTTP) before `connect()` and is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub recording_id: String,
}

/// Client→server control messages sent after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to finalize the recording and end the session.
    Stop,
}

/// Server→client messages, dispatched on the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A partial or final revision of one transcript segment.
    TranscriptUpdate(TranscriptUpdate),
    /// The server finished the recording on its side; no further updates
    /// will arrive and the client should close without sending `stop`.
    SessionEnded { reason: String },
    /// Server-reported failure. Terminal for the session.
    Error { message: String },
}

impl ServerMessage {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    /// [`crate::ScrivaError::MalformedMessage`] for invalid JSON, an unknown
    /// `type` tag, or missing fields.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One revision of a transcript segment, identified by `segment_index`.
///
/// Updates for the same index are last-write-wins: the recognizer revises
/// in-progress segments wholesale, so each update carries the complete
/// word list for its segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    pub recording_id: String,
    /// Position of the revised segment. Equal to the current document
    /// length means "append"; greater is a protocol violation.
    pub segment_index: usize,
    /// Plain-text rendering of the segment. Informational — `words` is
    /// the authoritative content.
    pub transcript: String,
    pub words: Vec<UpdateWord>,
    /// `true` once the recognizer does not expect to revise this segment
    /// further. Informational, not a lock: later updates still replace.
    #[serde(alias = "is_final")]
    pub is_final: bool,
    /// Segment-level start time in seconds.
    pub start: f64,
    /// Segment-level end time in seconds.
    pub end: f64,
}

/// A recognized word inside a [`TranscriptUpdate`].
///
/// Servers may attach extra per-word fields (provisional ids, trust hints);
/// they are ignored — word identity and trust are derived client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateWord {
    pub text: String,
    /// Start time in seconds from the beginning of the recording.
    pub start: f64,
    /// End time in seconds. `0` means the word is not yet timed.
    pub end: f64,
}
