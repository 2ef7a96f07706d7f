//! Balance Tracker
//!
//! Holds the authoritative reserve pair. Readers always see a whole pair:
//! commits replace both reserves under one write lock.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use crate::types::ReserveState;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Shared, lock-guarded reserve state
#[derive(Debug, Clone)]
pub struct BalanceTracker {
    reserves: Arc<RwLock<ReserveState>>,
}

impl BalanceTracker {
    /// Create a tracker seeded with the initial reserves (rounded to 8 places)
    pub fn new(initial: ReserveState) -> Self {
        let initial = ReserveState::new(initial.coin_reserve, initial.token_reserve);
        info!("Balance tracker initialized: {}", initial);
        Self {
            reserves: Arc::new(RwLock::new(initial)),
        }
    }

    /// Current reserve pair
    pub async fn snapshot(&self) -> ReserveState {
        *self.reserves.read().await
    }

    /// Replace both reserves at once. Returns the previous pair.
    pub async fn commit(&self, next: ReserveState) -> ReserveState {
        let next = ReserveState::new(next.coin_reserve, next.token_reserve);
        let mut guard = self.reserves.write().await;
        let previous = *guard;
        *guard = next;
        info!("Reserves committed: {} -> {}", previous, next);
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_commit_replaces_pair() {
        let tracker = BalanceTracker::new(ReserveState::new(dec!(25), dec!(5000)));
        let previous = tracker
            .commit(ReserveState::new(dec!(26), dec!(4795.8894649)))
            .await;

        assert_eq!(previous, ReserveState::new(dec!(25), dec!(5000)));
        let now = tracker.snapshot().await;
        assert_eq!(now.coin_reserve, dec!(26));
        assert_eq!(now.token_reserve, dec!(4795.8894649));
    }

    #[tokio::test]
    async fn test_commit_rounds_to_eight_places() {
        let tracker = BalanceTracker::new(ReserveState {
            coin_reserve: dec!(1.123456789),
            token_reserve: dec!(2),
        });
        assert_eq!(tracker.snapshot().await.coin_reserve, dec!(1.12345679));

        tracker
            .commit(ReserveState {
                coin_reserve: dec!(3),
                token_reserve: dec!(9.999999999),
            })
            .await;
        assert_eq!(tracker.snapshot().await.token_reserve, dec!(10.00000000));
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_half_update() {
        let tracker = BalanceTracker::new(ReserveState::new(dec!(1), dec!(1)));
        let writer = tracker.clone();

        let handle = tokio::spawn(async move {
            for i in 2..200u32 {
                let v = rust_decimal::Decimal::from(i);
                writer.commit(ReserveState::new(v, v)).await;
            }
        });

        for _ in 0..200 {
            let state = tracker.snapshot().await;
            assert_eq!(state.coin_reserve, state.token_reserve);
        }
        handle.await.unwrap();
    }

    #[test]
    fn test_clones_share_reserves() {
        let tracker = BalanceTracker::new(ReserveState::new(dec!(25), dec!(5000)));
        let other = tracker.clone();
        tokio_test::block_on(other.commit(ReserveState::new(dec!(24), dec!(5200))));
        assert_eq!(
            tokio_test::block_on(tracker.snapshot()),
            ReserveState::new(dec!(24), dec!(5200))
        );
    }
}
