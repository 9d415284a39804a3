//! Incremental merge of server transcript updates into the document.
//!
//! ## Merge policy
//!
//! 1. Build a candidate segment from the update's words (ids derived from
//!    `(segment_index, position)`, `trusted = true`, timings verbatim apart
//!    from overlap clamping). An empty word list yields a placeholder.
//! 2. `segment_index == len` → append the candidate.
//! 3. `segment_index < len` → replace that segment wholly. Recognizers
//!    revise in-progress segments wholesale, so whole-segment replacement
//!    keeps the merge O(segment size) and branch-free — no word-level diff.
//! 4. A final update to the last segment appends one trailing placeholder
//!    segment, guaranteeing an insertion point for the next utterance.
//!
//! Updates to the same segment are last-write-wins, and finality is not a
//! lock: an update for an already-final segment still replaces it.
//!
//! Whole-segment replacement discards local edits made to words in the
//! replaced segment. That is the deliberate policy here — trust flags style
//! the words, they do not guard the merge. An edit watermark per segment is
//! the known alternative if edit preservation is ever required.

use tracing::debug;

use crate::document::{Document, Segment, SegmentId, Word, WordId};
use crate::error::{Result, ScrivaError};
use crate::protocol::TranscriptUpdate;

impl Document {
    /// Fold one transcript update into the document.
    ///
    /// Pure and deterministic: the input document is not mutated, and
    /// applying the same update sequence always yields the same document
    /// regardless of transport batching.
    ///
    /// # Errors
    /// [`ScrivaError::SegmentOutOfRange`] when `segment_index` is strictly
    /// greater than the document length. The policy is to reject — missing
    /// segments are never silently padded in, because a gap means the
    /// transport dropped or reordered an update and the document would
    /// diverge from the server's numbering.
    pub fn apply(&self, update: &TranscriptUpdate) -> Result<Document> {
        let len = self.len();
        let index = update.segment_index;
        if index > len {
            return Err(ScrivaError::SegmentOutOfRange { index, len });
        }

        let candidate = build_candidate(update);
        let mut segments = self.segments().to_vec();

        if index == len {
            segments.push(candidate);
        } else {
            segments[index] = candidate;
        }

        // A final update to the last segment opens the next insertion point.
        if update.is_final && index + 1 == segments.len() {
            segments.push(Segment::placeholder(index + 1));
        }

        debug!(
            segment_index = index,
            words = update.words.len(),
            is_final = update.is_final,
            segments = segments.len(),
            "applied transcript update"
        );

        Ok(self.with_segments(segments))
    }
}

/// Build the replacement segment for one update.
///
/// Adjacent word intervals inside the candidate are forced non-overlapping:
/// a timed word starting before the previous word ended is clamped forward.
/// This keeps the time index's containment query unambiguous.
fn build_candidate(update: &TranscriptUpdate) -> Segment {
    let index = update.segment_index;
    if update.words.is_empty() {
        return Segment::placeholder(index);
    }

    let mut words = Vec::with_capacity(update.words.len());
    let mut prev_end = 0.0f64;
    for (position, word) in update.words.iter().enumerate() {
        let (start, end) = if word.end > 0.0 {
            let start = word.start.max(prev_end);
            let end = word.end.max(start);
            prev_end = end;
            (start, end)
        } else {
            // Untimed word — leave as-is, it never enters the query index.
            (word.start, word.end)
        };

        words.push(Word {
            id: WordId::derived(index, position),
            text: word.text.clone(),
            start,
            end,
            trusted: true,
        });
    }

    Segment {
        id: SegmentId::derived(index),
        words,
    }
}
