//! # scriva-core
//!
//! Client-side engine keeping a live, editable transcript synchronized with
//! a streaming speech recognizer and with audio playback.
//!
//! ## Architecture
//!
//! ```text
//! capture collaborator ──audio frames──► Session ──WebSocket──► server
//!                                           │
//!                               transcript updates (FIFO)
//!                                           │
//!                                     merge engine
//!                                           │
//!                                       Document ──► rendering collaborator
//!                                           │
//! playback ticks ──► SyncCoordinator ── TimeIndex ──► active word id
//! ```
//!
//! The document is exclusively owned by the single active session; the time
//! index is a derived, disposable cache rebuilt whenever the word set
//! changes. One session serves one end user — this is a dictation editor
//! engine, not a collaboration layer.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod timeline;

// Convenience re-exports for downstream crates
pub use document::{Document, Segment, SegmentId, Word, WordId};
pub use error::{Result, ScrivaError};
pub use protocol::{
    ClientMessage, Handshake, ServerMessage, TranscriptUpdate, UpdateWord,
    AUDIO_FRAME_INTERVAL_MS,
};
pub use session::{
    DocumentChange, DocumentEvent, Session, SessionConfig, SessionState, SessionStatusEvent,
};
pub use sync::{PlaybackControl, SyncCoordinator};
pub use timeline::{format_timestamp, TimeIndex};
