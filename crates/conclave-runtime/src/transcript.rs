//! Append-only transcript for one session.

use std::collections::HashSet;

use conclave_core::Utterance;

use crate::errors::{MeetingError, Result};

/// Ordered log of utterances, validated against the session roster.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    entries: Vec<Utterance>,
    speakers: HashSet<String>,
}

impl TranscriptStore {
    /// Create an empty transcript accepting the given speaker ids.
    pub fn new<I, S>(speakers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Vec::new(),
            speakers: speakers.into_iter().map(Into::into).collect(),
        }
    }

    /// Append an utterance; fails only for a speaker outside the roster.
    pub fn append(&mut self, utterance: Utterance) -> Result<&Utterance> {
        if !self.speakers.contains(&utterance.speaker_id) {
            return Err(MeetingError::InvalidSpeaker {
                role_id: utterance.speaker_id,
            });
        }
        self.entries.push(utterance);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// The last `n` utterances in chronological order.
    pub fn recent_window(&self, n: usize) -> &[Utterance] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Every utterance in append order.
    pub fn all(&self) -> &[Utterance] {
        &self.entries
    }

    /// A page of utterances starting at `offset`.
    pub fn page(&self, offset: usize, limit: usize) -> &[Utterance] {
        let start = offset.min(self.entries.len());
        let end = start.saturating_add(limit).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Number of utterances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been said yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
