//! Ordered, append-only conversation transcript.
//!
//! Finalized entries are never reordered, edited or removed. The single
//! exception is an in-progress assistant slot: it may be replaced in place
//! until it is finalized, or discarded if it never completes.

use serde::{Deserialize, Serialize};

/// Stable display-slot identifier of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: SlotId,
    pub role: Role,
    /// Raw message text.
    pub content: String,
    /// What is displayed: rendered markup, or the raw text when rendering failed.
    pub rendered: String,
    pub is_error: bool,
    pub in_progress: bool,
}

/// One visible mutation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptChange {
    Appended(TranscriptEntry),
    Updated(TranscriptEntry),
    Discarded(SlotId),
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
    changes: Vec<TranscriptChange>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: SlotId) -> Option<&TranscriptEntry> {
        self.entries.iter().rev().find(|e| e.id == id)
    }

    pub fn in_progress_count(&self) -> usize {
        self.entries.iter().filter(|e| e.in_progress).count()
    }

    /// Take the changes recorded since the last call.
    pub fn drain_changes(&mut self) -> Vec<TranscriptChange> {
        std::mem::take(&mut self.changes)
    }

    fn allocate(&mut self) -> SlotId {
        self.next_id += 1;
        SlotId(self.next_id)
    }

    /// Append a finalized entry.
    pub fn append(
        &mut self,
        role: Role,
        content: impl Into<String>,
        rendered: impl Into<String>,
        is_error: bool,
    ) -> SlotId {
        let id = self.allocate();
        self.push(TranscriptEntry {
            id,
            role,
            content: content.into(),
            rendered: rendered.into(),
            is_error,
            in_progress: false,
        });
        id
    }

    /// Append an in-progress entry showing `placeholder` until it is updated.
    pub fn open_slot(&mut self, role: Role, placeholder: impl Into<String>) -> SlotId {
        let id = self.allocate();
        self.push(TranscriptEntry {
            id,
            role,
            content: String::new(),
            rendered: placeholder.into(),
            is_error: false,
            in_progress: true,
        });
        id
    }

    fn push(&mut self, entry: TranscriptEntry) {
        self.changes.push(TranscriptChange::Appended(entry.clone()));
        self.entries.push(entry);
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut TranscriptEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.id == id && e.in_progress)
    }

    /// Replace the content of an in-progress slot. Returns `false` when the
    /// slot does not exist or is already final.
    pub fn update_slot(&mut self, id: SlotId, content: String, rendered: String) -> bool {
        let Some(entry) = self.slot_mut(id) else {
            return false;
        };
        entry.content = content;
        entry.rendered = rendered;
        let snapshot = entry.clone();
        self.changes.push(TranscriptChange::Updated(snapshot));
        true
    }

    /// Write final content into an in-progress slot and freeze it.
    pub fn finalize_slot(
        &mut self,
        id: SlotId,
        content: String,
        rendered: String,
        is_error: bool,
    ) -> bool {
        let Some(entry) = self.slot_mut(id) else {
            return false;
        };
        entry.content = content;
        entry.rendered = rendered;
        entry.is_error = is_error;
        entry.in_progress = false;
        let snapshot = entry.clone();
        self.changes.push(TranscriptChange::Updated(snapshot));
        true
    }

    /// Remove an in-progress slot. Final entries cannot be discarded.
    pub fn discard_slot(&mut self, id: SlotId) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .rposition(|e| e.id == id && e.in_progress)
        else {
            return false;
        };
        self.entries.remove(pos);
        self.changes.push(TranscriptChange::Discarded(id));
        true
    }
}
