//! Seen Set
//!
//! Append-only membership store of processed transaction ids. Guards against
//! settling the same inflow twice. No eviction: growth is unbounded for the
//! lifetime of the process.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use crate::types::TransactionId;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe set of processed transaction ids
///
/// Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: Arc<DashSet<TransactionId>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.ids.contains(id)
    }

    /// Record an id. Returns false if it was already present.
    pub fn add(&self, id: TransactionId) -> bool {
        debug!("Marking transaction seen: {}", id);
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<TransactionId> for SeenSet {
    fn from_iter<I: IntoIterator<Item = TransactionId>>(iter: I) -> Self {
        let set = Self::new();
        for id in iter {
            set.ids.insert(id);
        }
        set
    }
}
