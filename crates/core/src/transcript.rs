//! Transcription aggregation.
//!
//! The remote service streams transcription as small fragments per speaker.
//! [`TranscriptionAggregator`] accumulates them into one provisional utterance
//! per speaker and finalizes it on a turn boundary. [`TranscriptLog`] is the
//! display-side merge of the resulting items.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// A transcription snapshot handed to the UI. Complete items are never
/// revised; a new utterance starts a new item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionItem {
    pub speaker: Speaker,
    pub text: String,
    pub is_complete: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptionItem {
    pub fn new(speaker: Speaker, text: String, is_complete: bool) -> Self {
        Self {
            speaker,
            text,
            is_complete,
            timestamp: Utc::now(),
        }
    }

    /// Equal apart from the timestamp.
    pub fn same_content(&self, other: &TranscriptionItem) -> bool {
        self.speaker == other.speaker
            && self.is_complete == other.is_complete
            && self.text == other.text
    }
}

/// Pending text for one speaker's unfinished utterance.
#[derive(Debug, Default, Clone)]
struct PendingUtterance {
    text: String,
}

/// Per-speaker accumulators for the current turn.
#[derive(Debug, Default)]
pub struct TranscriptionAggregator {
    user: PendingUtterance,
    assistant: PendingUtterance,
}

impl TranscriptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_mut(&mut self, speaker: Speaker) -> &mut PendingUtterance {
        match speaker {
            Speaker::User => &mut self.user,
            Speaker::Assistant => &mut self.assistant,
        }
    }

    pub fn pending_text(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.user.text,
            Speaker::Assistant => &self.assistant.text,
        }
    }

    /// Appends a fragment and returns the provisional item for the whole
    /// utterance so far.
    pub fn push_fragment(&mut self, speaker: Speaker, fragment: &str) -> TranscriptionItem {
        let pending = self.pending_mut(speaker);
        pending.text.push_str(fragment);
        TranscriptionItem::new(speaker, pending.text.clone(), false)
    }

    /// Finalizes one speaker's utterance with surrounding whitespace
    /// trimmed. Whitespace-only text is cleared without producing an item.
    pub fn finalize(&mut self, speaker: Speaker) -> Option<TranscriptionItem> {
        let text = std::mem::take(&mut self.pending_mut(speaker).text);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(TranscriptionItem::new(speaker, text.to_string(), true))
    }

    /// Finalizes both speakers on a turn-complete marker, user first.
    pub fn complete_turn(&mut self) -> Vec<TranscriptionItem> {
        [Speaker::User, Speaker::Assistant]
            .into_iter()
            .filter_map(|speaker| self.finalize(speaker))
            .collect()
    }

    /// Drops both pending utterances without emitting anything.
    pub fn discard_all(&mut self) {
        self.user.text.clear();
        self.assistant.text.clear();
    }
}

/// The displayed transcript, one line per utterance.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    items: Vec<TranscriptionItem>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an item into the display.
    ///
    /// A provisional last line from the same speaker is replaced, whether the
    /// new item is provisional or final. Anything else appends, except an item
    /// identical to the last line, which is ignored so the merge stays
    /// idempotent.
    pub fn apply(&mut self, item: TranscriptionItem) {
        match self.items.last_mut() {
            Some(last) if last.speaker == item.speaker && !last.is_complete => *last = item,
            Some(last) if last.same_content(&item) => {}
            _ => self.items.push(item),
        }
    }

    pub fn items(&self) -> &[TranscriptionItem] {
        &self.items
    }

    pub fn last(&self) -> Option<&TranscriptionItem> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
