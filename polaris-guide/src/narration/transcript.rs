//! Per-landmark conversation history

use polaris_common::{Landmark, TranscriptEntry};
use std::collections::HashSet;

/// Transcript and consumed follow-ups for one landmark
///
/// Kept for the lifetime of the application so re-opening a landmark
/// restores its history and does not re-offer answered follow-ups.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    transcript: Vec<TranscriptEntry>,
    asked: HashSet<String>,
}

impl Conversation {
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Append an entry, returning its index
    pub fn push(&mut self, entry: TranscriptEntry) -> usize {
        self.transcript.push(entry);
        self.transcript.len() - 1
    }

    /// Extend an entry's text; false if the index does not exist
    pub fn append(&mut self, index: usize, text: &str) -> bool {
        match self.transcript.get_mut(index) {
            Some(entry) => {
                entry.text.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn replace(&mut self, index: usize, text: &str) -> bool {
        match self.transcript.get_mut(index) {
            Some(entry) => {
                entry.text = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Record a question as consumed; returns false if it already was
    pub fn mark_asked(&mut self, question: &str) -> bool {
        self.asked.insert(question.to_string())
    }

    pub fn is_asked(&self, question: &str) -> bool {
        self.asked.contains(question)
    }

    /// Consumed questions in a stable order
    pub fn asked(&self) -> Vec<String> {
        let mut asked: Vec<String> = self.asked.iter().cloned().collect();
        asked.sort();
        asked
    }

    /// Canned follow-ups of `landmark` not asked yet, in table order
    pub fn available_follow_ups(&self, landmark: &Landmark) -> Vec<String> {
        landmark
            .follow_ups
            .iter()
            .filter(|f| !self.is_asked(&f.question))
            .map(|f| f.question.clone())
            .collect()
    }
}
