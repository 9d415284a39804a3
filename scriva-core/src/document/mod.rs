//! The transcript document model.
//!
//! A [`Document`] is an ordered list of [`Segment`]s, positionally addressed
//! by the server-assigned segment index. Each segment holds at least one
//! [`Word`] — a placeholder with empty text until the recognizer produces
//! anything. Every mutation (merge or local edit) yields a new `Document`
//! with a bumped revision; the revision is the memoization key for the
//! derived time index.

pub mod merge;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrivaError};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(0);

fn next_document_id() -> u64 {
    NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of a word, unique within one document.
///
/// Derived from `(segment_index, position)` at merge time, so replacing a
/// segment rebuilds all of its ids and uniqueness holds document-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordId(String);

impl WordId {
    pub fn derived(segment_index: usize, position: usize) -> Self {
        Self(format!("{segment_index}-{position}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a segment, derived deterministically from its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn derived(segment_index: usize) -> Self {
        Self(format!("segment-{segment_index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single recognized or user-edited token with timing and a trust flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: WordId,
    /// Display text. Empty for an untimed placeholder.
    pub text: String,
    /// Start time in seconds. `0` for an untimed placeholder.
    pub start: f64,
    /// End time in seconds. `0` means not yet seekable/clickable.
    pub end: f64,
    /// `true` while the text exactly matches server recognition output;
    /// flips to `false` on local edit and never reverts.
    pub trusted: bool,
}

impl Word {
    /// An empty untimed word holding a segment's insertion point.
    pub fn placeholder(segment_index: usize) -> Self {
        Self {
            id: WordId::derived(segment_index, 0),
            text: String::new(),
            start: 0.0,
            end: 0.0,
            trusted: true,
        }
    }

    /// Whether playback can seek to this word (it carries real timing).
    pub fn is_seekable(&self) -> bool {
        self.end > 0.0
    }
}

/// A contiguous span of recognized speech. Always contains ≥ 1 word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub words: Vec<Word>,
}

impl Segment {
    /// An empty segment holding one placeholder word.
    pub fn placeholder(segment_index: usize) -> Self {
        Self {
            id: SegmentId::derived(segment_index),
            words: vec![Word::placeholder(segment_index)],
        }
    }

    /// Whether this segment holds only its placeholder word.
    pub fn is_placeholder(&self) -> bool {
        self.words.len() == 1 && self.words[0].text.is_empty() && !self.words[0].is_seekable()
    }
}

/// The authoritative transcript state for one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Process-unique lineage id, assigned in [`Document::new`] and stable
    /// across merges and edits. Revisions restart at 0 for every fresh
    /// document, so derived caches must key on `(id, revision)` — two
    /// documents from consecutive sessions can share a revision.
    #[serde(skip, default = "next_document_id")]
    id: u64,
    segments: Vec<Segment>,
    /// Bumped on every merge or edit within one lineage.
    revision: u64,
}

// Equality is content equality; the lineage id only keys caches.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments && self.revision == other.revision
    }
}

impl Document {
    /// A fresh document: one placeholder segment, revision 0.
    ///
    /// Created when a recording session starts; discarded when a new
    /// session starts.
    pub fn new() -> Self {
        Self {
            id: next_document_id(),
            segments: vec![Segment::placeholder(0)],
            revision: 0,
        }
    }

    /// Process-unique id of this document lineage. Fresh for every
    /// [`Document::new`], stable across merges and edits.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments, i.e. the next appendable segment index.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// A document is never structurally empty (it always holds at least a
    /// placeholder segment), so this reports whether any real content exists.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Segment::is_placeholder)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All words across all segments, in speech order.
    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.segments.iter().flat_map(|s| s.words.iter())
    }

    /// Look up a word by id.
    pub fn word(&self, id: &WordId) -> Option<&Word> {
        self.words().find(|w| &w.id == id)
    }

    /// Plain-text rendering of the whole transcript.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for word in self.words() {
            if word.text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&word.text);
        }
        out
    }

    /// Record a local edit to a word's displayed text.
    ///
    /// Pure: returns a new document with the word's text replaced and its
    /// `trusted` flag cleared. The flag is monotonic — once `false` it never
    /// reverts, even if the user types the original text back.
    ///
    /// # Errors
    /// [`ScrivaError::UnknownWord`] if `id` is not in the document.
    pub fn mark_edited(&self, id: &WordId, new_text: &str) -> Result<Document> {
        let mut next = self.clone();
        let word = next
            .segments
            .iter_mut()
            .flat_map(|s| s.words.iter_mut())
            .find(|w| &w.id == id)
            .ok_or_else(|| ScrivaError::UnknownWord(id.to_string()))?;

        word.text = new_text.to_string();
        word.trusted = false;
        next.revision = self.revision + 1;
        Ok(next)
    }

    pub(crate) fn with_segments(&self, segments: Vec<Segment>) -> Document {
        Document {
            id: self.id,
            segments,
            revision: self.revision + 1,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
