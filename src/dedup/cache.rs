use std::num::NonZeroUsize;

use super::canonical::canonicalize;
use crate::backend::Article;

/// What the deduplicator remembers about an article it has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedRecord {
    title: String,
    canonical_url: String,
    feed_id: i64,
}

impl LearnedRecord {
    pub fn new(title: impl Into<String>, canonical_url: impl Into<String>, feed_id: i64) -> Self {
        Self {
            title: title.into(),
            canonical_url: canonical_url.into(),
            feed_id,
        }
    }

    /// Build a record from an article, canonicalizing its link.
    pub fn from_article(article: &Article) -> Self {
        Self::new(article.title.clone(), canonicalize(&article.link), article.feed_id)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn feed_id(&self) -> i64 {
        self.feed_id
    }
}

// ============================================================================
// RecencyCache
// ============================================================================

/// Fixed-capacity FIFO of recently seen articles.
///
/// Backed by a ring buffer: once full, each append overwrites the oldest
/// slot. Reads never reorder entries. Iteration always runs oldest to newest,
/// which the classifier relies on for first-match results.
#[derive(Debug, Clone)]
pub struct RecencyCache {
    slots: Vec<LearnedRecord>,
    /// Slot the next append writes to; the oldest record once the buffer is full.
    next: usize,
    capacity: NonZeroUsize,
}

impl RecencyCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.get()),
            next: 0,
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when at capacity.
    pub fn append(&mut self, record: LearnedRecord) {
        if self.slots.len() < self.capacity.get() {
            self.slots.push(record);
        } else {
            self.slots[self.next] = record;
        }
        self.next = (self.next + 1) % self.capacity.get();
    }

    /// Records in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LearnedRecord> + '_ {
        let (newer, older) = self.slots.split_at(self.next);
        older.iter().chain(newer.iter())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Forget everything. Only a forced re-learn does this.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
    }
}
