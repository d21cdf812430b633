// src/services/history.rs
//! Process-wide dream state, passed explicitly to whoever needs it.
//!
//! - [`DreamContext`] holds the *current* dream text and archetype. The two
//!   cells are locked independently: a reader racing a new submission can see
//!   the new text with the old archetype (or the reverse). That tear is
//!   accepted; nothing downstream needs the pair to agree.
//! - [`HistoryLog`] is a fixed-capacity ring buffer; the oldest entry is
//!   evicted once it is full.

use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One POSTed dream.
#[derive(Debug, Clone, Serialize)]
pub struct DreamSubmission {
    pub id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl DreamSubmission {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DreamContext {
    dream_text: RwLock<Option<String>>,
    archetype: RwLock<Option<String>>,
}

impl DreamContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_dream_text(&self) -> Option<String> {
        self.dream_text
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn current_archetype(&self) -> Option<String> {
        self.archetype
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Overwrite both cells. Each write is atomic on its own; the pair is not.
    pub fn set_current(&self, dream_text: &str, archetype: &str) {
        *self.dream_text.write().unwrap_or_else(|p| p.into_inner()) = Some(dream_text.to_string());
        *self.archetype.write().unwrap_or_else(|p| p.into_inner()) = Some(archetype.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub dream: String,
    pub archetype: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append, evicting the oldest entry when full. Returns how many were evicted.
    pub fn push(&self, entry: HistoryEntry) -> usize {
        let mut q = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let mut evicted = 0;
        while q.len() >= self.capacity {
            q.pop_front();
            evicted += 1;
        }
        q.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
