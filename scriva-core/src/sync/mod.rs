//! Playback ↔ transcript synchronization.
//!
//! The coordinator turns playback-time ticks into the id of the word being
//! spoken at that instant, rebuilding its [`TimeIndex`] lazily whenever the
//! document revision moves. Ticks arrive at whatever bounded rate the
//! playback collaborator produces them — one index query per tick, no
//! debouncing.

use tracing::debug;

use crate::document::{Document, Word, WordId};
use crate::timeline::TimeIndex;

/// Explicit seam to the playback collaborator.
///
/// Owned by whoever controls the audio element; passed in rather than
/// discovered, so the coordinator never reaches into playback state.
pub trait PlaybackControl {
    /// Move the playhead to `seconds`.
    fn seek_to(&self, seconds: f64);
}

/// Maps playback time to the active word.
pub struct SyncCoordinator {
    cache: Option<CachedIndex>,
}

struct CachedIndex {
    document_id: u64,
    revision: u64,
    index: TimeIndex,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Answer one playback-time tick.
    ///
    /// Returns the id of the word whose interval contains `seconds`, or
    /// `None` between words. The index is memoized on the document's lineage
    /// id plus revision, so a completed merge is always visible to the next
    /// tick, a fresh document from a new session never reuses the previous
    /// session's index, and unchanged documents cost two integer comparisons.
    pub fn on_playback_time(&mut self, document: &Document, seconds: f64) -> Option<WordId> {
        let index = self.index_for(document);
        index.query(seconds).map(|w| w.id.clone())
    }

    /// All words ordered by start time, from the current index.
    pub fn words_by_start(&mut self, document: &Document) -> &[Word] {
        self.index_for(document).all_sorted()
    }

    /// Handle a word click from the editing surface: seek playback to the
    /// word's start. Untimed words (placeholders, `end == 0`) are not
    /// seekable; returns whether a seek was issued.
    pub fn seek_to_word(
        &mut self,
        document: &Document,
        id: &WordId,
        playback: &dyn PlaybackControl,
    ) -> bool {
        match document.word(id) {
            Some(word) if word.is_seekable() => {
                playback.seek_to(word.start);
                true
            }
            Some(_) => false,
            None => false,
        }
    }

    fn index_for(&mut self, document: &Document) -> &TimeIndex {
        let document_id = document.id();
        let revision = document.revision();
        if self
            .cache
            .as_ref()
            .map_or(true, |c| c.document_id != document_id || c.revision != revision)
        {
            debug!(document_id, revision, "rebuilding time index");
            self.cache = None;
        }
        let cache = self.cache.get_or_insert_with(|| CachedIndex {
            document_id,
            revision,
            index: TimeIndex::build(document.words()),
        });
        &cache.index
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::protocol::{TranscriptUpdate, UpdateWord};

    struct RecordingPlayback {
        last_seek: Cell<Option<f64>>,
    }

    impl RecordingPlayback {
        fn new() -> Self {
            Self {
                last_seek: Cell::new(None),
            }
        }
    }

    impl PlaybackControl for RecordingPlayback {
        fn seek_to(&self, seconds: f64) {
            self.last_seek.set(Some(seconds));
        }
    }

    fn doc_with_hello_world() -> Document {
        Document::new()
            .apply(&TranscriptUpdate {
                recording_id: "rec-1".into(),
                segment_index: 0,
                transcript: "hello world".into(),
                words: vec![
                    UpdateWord {
                        text: "hello".into(),
                        start: 0.0,
                        end: 0.5,
                    },
                    UpdateWord {
                        text: "world".into(),
                        start: 0.5,
                        end: 1.0,
                    },
                ],
                is_final: false,
                start: 0.0,
                end: 1.0,
            })
            .expect("apply update")
    }

    #[test]
    fn ticks_resolve_to_the_active_word() {
        let doc = doc_with_hello_world();
        let mut sync = SyncCoordinator::new();

        assert_eq!(
            sync.on_playback_time(&doc, 0.3),
            Some(WordId::derived(0, 0))
        );
        assert_eq!(
            sync.on_playback_time(&doc, 0.7),
            Some(WordId::derived(0, 1))
        );
        assert_eq!(sync.on_playback_time(&doc, 2.0), None);
    }

    #[test]
    fn index_refreshes_after_a_merge() {
        let doc = doc_with_hello_world();
        let mut sync = SyncCoordinator::new();
        assert!(sync.on_playback_time(&doc, 1.5).is_none());

        let doc = doc
            .apply(&TranscriptUpdate {
                recording_id: "rec-1".into(),
                segment_index: 1,
                transcript: "again".into(),
                words: vec![UpdateWord {
                    text: "again".into(),
                    start: 1.2,
                    end: 1.8,
                }],
                is_final: false,
                start: 1.2,
                end: 1.8,
            })
            .expect("apply second segment");

        // The very next tick sees the post-merge word set.
        assert_eq!(
            sync.on_playback_time(&doc, 1.5),
            Some(WordId::derived(1, 0))
        );
    }

    #[test]
    fn index_is_not_reused_across_documents_sharing_a_revision() {
        // A new session starts a fresh document whose revisions restart at
        // 0, so two consecutive sessions reach equal revisions with
        // different content.
        let first = doc_with_hello_world();
        let second = Document::new()
            .apply(&TranscriptUpdate {
                recording_id: "rec-2".into(),
                segment_index: 0,
                transcript: "goodbye".into(),
                words: vec![UpdateWord {
                    text: "goodbye".into(),
                    start: 5.0,
                    end: 5.5,
                }],
                is_final: false,
                start: 5.0,
                end: 5.5,
            })
            .expect("apply update");
        assert_eq!(first.revision(), second.revision());

        let mut sync = SyncCoordinator::new();
        assert_eq!(
            sync.on_playback_time(&first, 0.3),
            Some(WordId::derived(0, 0))
        );
        assert_eq!(sync.on_playback_time(&second, 0.3), None);
        assert_eq!(
            sync.on_playback_time(&second, 5.2),
            Some(WordId::derived(0, 0))
        );
    }

    #[test]
    fn words_by_start_is_sorted() {
        let doc = doc_with_hello_world();
        let mut sync = SyncCoordinator::new();
        let starts: Vec<f64> = sync.words_by_start(&doc).iter().map(|w| w.start).collect();
        assert!(starts.windows(2).all(|p| p[0] <= p[1]));
    }

    #[test]
    fn word_click_seeks_to_word_start() {
        let doc = doc_with_hello_world();
        let mut sync = SyncCoordinator::new();
        let playback = RecordingPlayback::new();

        let sought = sync.seek_to_word(&doc, &WordId::derived(0, 1), &playback);
        assert!(sought);
        assert_eq!(playback.last_seek.get(), Some(0.5));
    }

    #[test]
    fn untimed_words_are_not_seekable() {
        let doc = Document::new();
        let mut sync = SyncCoordinator::new();
        let playback = RecordingPlayback::new();
        let placeholder_id = doc.segments()[0].words[0].id.clone();

        assert!(!sync.seek_to_word(&doc, &placeholder_id, &playback));
        assert_eq!(playback.last_seek.get(), None);
    }

    #[test]
    fn unknown_word_click_is_ignored() {
        let doc = doc_with_hello_world();
        let mut sync = SyncCoordinator::new();
        let playback = RecordingPlayback::new();

        assert!(!sync.seek_to_word(&doc, &WordId::derived(9, 9), &playback));
        assert_eq!(playback.last_seek.get(), None);
    }
}
