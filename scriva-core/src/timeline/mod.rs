//! Derived time index mapping playback position to the active word.
//!
//! The index is a disposable cache over the document's flattened word list:
//! rebuilt wholesale whenever the word set changes, never mutated in place,
//! never authoritative. Keeping it an immutable value means a rebuild can
//! never expose a half-updated index to a concurrent query.

use crate::document::Word;

/// Immutable time→word lookup over one snapshot of the word list.
#[derive(Debug, Clone)]
pub struct TimeIndex {
    /// Every word, sorted by start time (stable, so document order breaks
    /// ties).
    by_start: Vec<Word>,
    /// Only seekable words (`end > 0`), sorted by start. Queries binary
    /// search this list; untimed placeholders would otherwise all sit at
    /// t = 0 and shadow real words.
    timed: Vec<Word>,
    /// `prefix_max_end[i]` is the maximum `end` over `timed[..=i]`. Lets a
    /// query cut the backward scan once no earlier interval can contain `t`.
    prefix_max_end: Vec<f64>,
}

impl TimeIndex {
    /// Build an index from the document's flattened word list.
    pub fn build<'a, I>(words: I) -> Self
    where
        I: IntoIterator<Item = &'a Word>,
    {
        let mut by_start: Vec<Word> = words.into_iter().cloned().collect();
        by_start.sort_by(|a, b| a.start.total_cmp(&b.start));

        let timed: Vec<Word> = by_start.iter().filter(|w| w.is_seekable()).cloned().collect();

        let mut prefix_max_end = Vec::with_capacity(timed.len());
        let mut running = f64::NEG_INFINITY;
        for word in &timed {
            running = running.max(word.end);
            prefix_max_end.push(running);
        }

        Self {
            by_start,
            timed,
            prefix_max_end,
        }
    }

    /// The word whose `[start, end]` interval contains `t`, inclusive on
    /// both ends. `None` if no interval contains `t`.
    ///
    /// Binary search finds the last word starting at or before `t`; the
    /// backward scan from there stops as soon as the prefix maximum of
    /// `end` drops below `t`, so a miss (a pause between words, or `t`
    /// past the transcript end) costs O(log n) rather than a walk over
    /// every earlier word. If segments ever overlap across a boundary,
    /// the latest-starting containing word wins — deterministic rather
    /// than unspecified.
    pub fn query(&self, t: f64) -> Option<&Word> {
        let upper = self.timed.partition_point(|w| w.start <= t);
        for i in (0..upper).rev() {
            if self.prefix_max_end[i] < t {
                return None;
            }
            let word = &self.timed[i];
            if t <= word.end {
                return Some(word);
            }
        }
        None
    }

    /// All words ordered by start time (untimed placeholders first).
    pub fn all_sorted(&self) -> &[Word] {
        &self.by_start
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }
}

/// Format a position in seconds as `MM:SS.mmm` for display.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{minutes:02}:{secs:02}.{millis:03}")
}
