//! Pool core for the bonding-curve liquidity bot
//!
//! Pricing, reserve tracking, dedup of processed transactions, detection of
//! new confirmed transactions and the reconciliation state machine.
//!
//! Author: AI-Generated
//! Created: 2026-02-03
//! Modified: 2026-02-04 (added watcher + reconciler)

pub mod calculator;
pub mod reconciler;
pub mod seen;
pub mod state;
pub mod watcher;

pub use calculator::{to_smallest_unit, PricingEngine, SETTLEMENT_FEE};
pub use reconciler::{ReconcilePhase, Reconciler};
pub use seen::SeenSet;
pub use state::BalanceTracker;
pub use watcher::TxWatcher;
