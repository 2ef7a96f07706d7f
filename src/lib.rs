//! Bonding-Curve Pool Operator Library
//!
//! Watches a pool address for confirmed coin payments and token transfers,
//! prices them against a logarithmic bonding curve and settles the exchange
//! back to the sender, keeping tracked reserves in step with the chain.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

pub mod clients;
pub mod config;
pub mod error;
pub mod pool;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use clients::Collaborators;
pub use config::load_config;
pub use error::{ErrorKind, PoolError, PoolResult};
pub use pool::{BalanceTracker, PricingEngine, Reconciler, SeenSet, TxWatcher};
pub use service::PoolService;
pub use types::{BalanceSnapshot, PoolConfig, ReconcileOutcome, ReserveState, TransactionId};
