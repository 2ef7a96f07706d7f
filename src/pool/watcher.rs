//! Transaction Watcher
//!
//! Polls the pool address for transaction ids, drops the ones already in
//! the seen set and keeps only those with at least one confirmation.
//! Pure read: never mutates the seen set during detection.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use crate::clients::Collaborators;
use crate::error::PoolResult;
use crate::pool::SeenSet;
use crate::types::{ConfirmedTxRef, TransactionId};
use std::collections::HashSet;
use tracing::{debug, info};

/// Detects confirmed, unseen transactions at the pool address
pub struct TxWatcher {
    clients: Collaborators,
    pool_address: String,
}

impl TxWatcher {
    /// Create a new TxWatcher
    pub fn new(clients: Collaborators, pool_address: impl Into<String>) -> Self {
        Self {
            clients,
            pool_address: pool_address.into(),
        }
    }

    /// Confirmed transactions not yet in `seen`, in the order the chain lists them
    pub async fn detect_new_events(&self, seen: &SeenSet) -> PoolResult<Vec<ConfirmedTxRef>> {
        let unseen = self.unseen_ids(seen).await?;
        if unseen.is_empty() {
            debug!("No unseen transactions at {}", self.pool_address);
            return Ok(Vec::new());
        }

        let confirmed: Vec<ConfirmedTxRef> = self
            .clients
            .query
            .get_confirmations(&unseen)
            .await?
            .into_iter()
            .filter(|tx| tx.confirmations > 0)
            .collect();

        debug!(
            "Detection: {} unseen, {} confirmed at {}",
            unseen.len(),
            confirmed.len(),
            self.pool_address
        );
        Ok(confirmed)
    }

    /// Mark history that can never be reconciled (deeper than one confirmation)
    /// as seen. Returns the number of ids added.
    pub async fn seed_settled_history(&self, seen: &SeenSet) -> PoolResult<usize> {
        let unseen = self.unseen_ids(seen).await?;
        if unseen.is_empty() {
            return Ok(0);
        }

        let refs = self.clients.query.get_confirmations(&unseen).await?;
        let mut added = 0;
        for tx in refs.into_iter().filter(|tx| tx.confirmations > 1) {
            if seen.add(tx.id) {
                added += 1;
            }
        }
        if added > 0 {
            info!(
                "Marked {} transactions past one confirmation as seen ({} total)",
                added,
                seen.len()
            );
        }
        Ok(added)
    }

    async fn unseen_ids(&self, seen: &SeenSet) -> PoolResult<Vec<TransactionId>> {
        let live = self
            .clients
            .coin
            .get_balance(&self.pool_address)
            .await?
            .transaction_ids;

        let mut dedup = HashSet::new();
        Ok(live
            .into_iter()
            .filter(|id| !seen.contains(id) && dedup.insert(id.clone()))
            .collect())
    }
}
