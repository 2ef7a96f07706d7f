//! Pool Service
//!
//! Wires the collaborators, pricing engine, balance tracker, seen set,
//! watcher and reconciler together and exposes the three scheduler entry
//! points: detect new events, reconcile one event, read chain balances.
//!
//! `run` is the bundled scheduler: every poll interval it detects, and when
//! something new is confirmed it reconciles one event under a cycle timeout.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use crate::clients::Collaborators;
use crate::error::PoolResult;
use crate::pool::{BalanceTracker, PricingEngine, Reconciler, SeenSet, TxWatcher};
use crate::types::{ConfirmedTxRef, PoolConfig, ReconcileOutcome, ReserveState, TransactionId};
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Counters reported periodically by the run loop
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub polls: u64,
    pub settlements: u64,
    pub self_echoes: u64,
    pub ignored: u64,
    pub resyncs: u64,
    pub timeouts: u64,
}

impl ServiceStats {
    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Settled { .. } => self.settlements += 1,
            ReconcileOutcome::SelfEcho(_) => self.self_echoes += 1,
            ReconcileOutcome::Ignored(_) => self.ignored += 1,
            ReconcileOutcome::Resynced(_) => self.resyncs += 1,
            ReconcileOutcome::Quoted { .. } | ReconcileOutcome::NoChange => {}
        }
    }
}

/// One running pool operator
pub struct PoolService {
    config: PoolConfig,
    clients: Collaborators,
    pricing: PricingEngine,
    watcher: TxWatcher,
    reconciler: Reconciler,
}

impl PoolService {
    /// Read live balances, seed the tracker (and optionally the seen set)
    pub async fn bootstrap(config: PoolConfig, clients: Collaborators) -> Result<Self> {
        let constants = config.curve_constants().context("Invalid curve constants")?;
        let pricing = PricingEngine::new(constants).with_spot_quote(config.curve.spot_quote_coins);
        let pool_address = config.pool.coin_address.clone();

        info!("Bootstrapping pool {}", pool_address);
        let reserves = clients
            .get_blockchain_balances(&pool_address)
            .await
            .context("Failed to read initial pool balances")?;

        let seen = SeenSet::new();
        let watcher = TxWatcher::new(clients.clone(), pool_address.clone());
        if config.service.seed_seen_from_history {
            watcher
                .seed_settled_history(&seen)
                .await
                .context("Failed to seed transaction history")?;
        }

        let reconciler = Reconciler::new(
            clients.clone(),
            pricing,
            BalanceTracker::new(reserves),
            seen,
            config.pool.clone(),
        );

        Ok(Self {
            config,
            clients,
            pricing,
            watcher,
            reconciler,
        })
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Reserves as currently tracked (not re-read from chain)
    pub async fn tracked_reserves(&self) -> ReserveState {
        self.reconciler.balances().snapshot().await
    }

    /// Confirmed transactions at the pool address not yet processed
    pub async fn detect_new_events(&self) -> PoolResult<Vec<ConfirmedTxRef>> {
        self.watcher.detect_new_events(self.reconciler.seen()).await
    }

    /// Process at most one event; `Ok(None)` means the cycle was abandoned
    pub async fn reconcile_one_event(
        &self,
        last_known: Option<&TransactionId>,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        self.reconciler.reconcile(last_known).await
    }

    /// Classify and price the next pending event without settling it
    pub async fn preview_one_event(
        &self,
        last_known: Option<&TransactionId>,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        self.reconciler.dry_run(last_known).await
    }

    /// Live coin and token balances of the pool
    pub async fn get_blockchain_balances(&self) -> PoolResult<ReserveState> {
        self.clients
            .get_blockchain_balances(&self.config.pool.coin_address)
            .await
    }

    /// Detect, and reconcile one event if anything new is confirmed.
    /// Advances `last_known` to the transaction the outcome reflects.
    pub async fn poll_once(
        &self,
        last_known: &mut Option<TransactionId>,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        let events = match self.detect_new_events().await {
            Ok(events) => events,
            Err(e) if e.is_transient() => {
                warn!("Detection abandoned: {} - retrying next poll", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if events.is_empty() {
            return Ok(None);
        }
        info!("{} new confirmed transaction(s) at pool address", events.len());

        let outcome = self.reconcile_one_event(last_known.as_ref()).await?;
        if let Some(ReconcileOutcome::Resynced(_)) = outcome {
            self.retire_buried_history().await?;
        }
        if let Some(id) = outcome.as_ref().and_then(|o| o.last_transaction()) {
            *last_known = Some(id.clone());
        }
        Ok(outcome)
    }

    /// Ids that sank past one confirmation unseen can never be reconciled;
    /// mark them seen so detection stops reporting them.
    async fn retire_buried_history(&self) -> PoolResult<()> {
        match self.watcher.seed_settled_history(self.reconciler.seen()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!("Could not retire buried transactions: {} - retrying next resync", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until `shutdown` resolves. Unhandled errors end the loop so a
    /// process supervisor can restart and alert.
    pub async fn run<F>(&self, shutdown: F) -> Result<ServiceStats>
    where
        F: Future<Output = ()>,
    {
        let poll_interval = Duration::from_millis(self.config.service.poll_interval_ms);
        let cycle_timeout = Duration::from_secs(self.config.service.cycle_timeout_secs);
        info!(
            "Pool service running (poll {}ms, cycle timeout {}s)",
            self.config.service.poll_interval_ms, self.config.service.cycle_timeout_secs
        );

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_known: Option<TransactionId> = None;
        let mut stats = ServiceStats::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = interval.tick() => {}
            }
            stats.polls += 1;

            match tokio::time::timeout(cycle_timeout, self.poll_once(&mut last_known)).await {
                Ok(Ok(Some(outcome))) => stats.record(&outcome),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    error!("Pool cycle failed [{}]: {}", e.kind(), e);
                    return Err(anyhow::Error::new(e).context("Pool cycle failed"));
                }
                Err(_) => {
                    stats.timeouts += 1;
                    warn!(
                        "Pool cycle exceeded {}s, abandoned until next poll",
                        cycle_timeout.as_secs()
                    );
                }
            }

            // Log progress periodically (every 60 polls)
            if stats.polls % 60 == 0 {
                let reserves = self.tracked_reserves().await;
                info!(
                    "Service stats: {} polls, {} settled, {} self-echo, {} ignored, \
                     {} resyncs, {} timeouts | {} | seen {}",
                    stats.polls,
                    stats.settlements,
                    stats.self_echoes,
                    stats.ignored,
                    stats.resyncs,
                    stats.timeouts,
                    reserves,
                    self.reconciler.seen().len()
                );
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::ErrorKind;
    use crate::testing::{tx, FakeChain, CUSTODY_ADDRESS, POOL_ADDRESS};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn config(seed: bool) -> PoolConfig {
        parse_config(&format!(
            r#"
[pool]
coin_address = "{}"
token_custody_address = "{}"

[curve]
coin_original = 25
token_original = 5000

[gateway]
base_url = "http://127.0.0.1:1"

[service]
poll_interval_ms = 5
cycle_timeout_secs = 5
seed_seen_from_history = {}
"#,
            POOL_ADDRESS, CUSTODY_ADDRESS, seed
        ))
        .unwrap()
    }

    async fn service(chain: &Arc<FakeChain>, seed: bool) -> PoolService {
        PoolService::bootstrap(config(seed), chain.collaborators())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_reads_live_balances() {
        let chain = FakeChain::new();
        chain.set_balances(dec!(25), dec!(5000));
        let svc = service(&chain, true).await;

        let expected = ReserveState::new(dec!(25), dec!(5000));
        assert_eq!(svc.tracked_reserves().await, expected);
        assert_eq!(svc.get_blockchain_balances().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_deep_history() {
        let chain = FakeChain::new();
        chain.add_live("old", 40);
        chain.add_live("new", 1);
        let svc = service(&chain, true).await;

        let events = svc.detect_new_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, tx("new"));
    }

    #[tokio::test]
    async fn test_bootstrap_without_seeding_reports_history() {
        let chain = FakeChain::new();
        chain.add_live("old", 40);
        let svc = service(&chain, false).await;
        assert_eq!(svc.detect_new_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_fails_when_balances_unavailable() {
        let chain = FakeChain::new();
        chain.fail("get_token_balance", ErrorKind::NetworkTransient);
        assert!(PoolService::bootstrap(config(true), chain.collaborators()).await.is_err());
    }

    #[tokio::test]
    async fn test_poll_once_settles_and_advances_last_known() {
        let chain = FakeChain::new();
        chain.set_balances(dec!(25), dec!(5000));
        let svc = service(&chain, true).await;

        chain.add_live("t1", 1);
        chain.add_coin_inflow("t1", "alice", dec!(1));

        let mut last_known = None;
        let outcome = svc.poll_once(&mut last_known).await.unwrap().unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Settled { .. }));
        assert_eq!(last_known, Some(tx("t1")));

        // nothing new on the next poll: no reconcile, no payout
        assert!(svc.poll_once(&mut last_known).await.unwrap().is_none());
        assert_eq!(chain.broadcasts(), 1);
    }

    #[tokio::test]
    async fn test_poll_once_skips_reconcile_when_nothing_new() {
        let chain = FakeChain::new();
        let svc = service(&chain, true).await;

        let mut last_known = None;
        assert!(svc.poll_once(&mut last_known).await.unwrap().is_none());
        assert!(!chain.calls().contains(&"has_only_deep_confirmations".to_string()));
    }

    #[tokio::test]
    async fn test_poll_once_transient_detection_is_swallowed() {
        let chain = FakeChain::new();
        let svc = service(&chain, true).await;
        chain.fail("get_balance", ErrorKind::NetworkTransient);

        let mut last_known = None;
        assert!(svc.poll_once(&mut last_known).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let chain = FakeChain::new();
        let svc = service(&chain, true).await;

        let stats = svc
            .run(tokio::time::sleep(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(stats.polls >= 1);
        assert_eq!(stats.settlements, 0);
    }

    #[tokio::test]
    async fn test_run_ends_on_unhandled_error() {
        let chain = FakeChain::new();
        let svc = service(&chain, true).await;
        chain.fail("get_balance", ErrorKind::Unhandled);

        let result = svc.run(std::future::pending::<()>()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resync_retires_buried_transactions() {
        let chain = FakeChain::new();
        let svc = service(&chain, true).await;

        // arrived and sank past one confirmation between polls
        chain.add_live("late", 3);
        chain.set_only_deep(true);

        let mut last_known = None;
        let outcome = svc.poll_once(&mut last_known).await.unwrap().unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Resynced(_)));
        assert!(svc.detect_new_events().await.unwrap().is_empty());

        // following polls stay quiet instead of resyncing every interval
        assert!(svc.poll_once(&mut last_known).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preview_never_settles_across_processes() {
        let chain = FakeChain::new();
        chain.set_balances(dec!(25), dec!(5000));
        chain.add_live("A", 1);
        chain.add_live("B", 1);
        chain.add_coin_inflow("A", "alice", dec!(1));
        chain.add_coin_inflow("B", "bob", dec!(1));

        // each one-shot invocation bootstraps a fresh process
        let mut last: Option<TransactionId> = None;
        let mut reported = Vec::new();
        for _ in 0..3 {
            let svc = service(&chain, true).await;
            let outcome = svc.preview_one_event(last.as_ref()).await.unwrap().unwrap();
            assert!(matches!(outcome, ReconcileOutcome::Quoted { .. }));
            last = outcome.last_transaction().cloned();
            reported.push(last.clone());
        }

        assert_eq!(reported, vec![Some(tx("A")), Some(tx("B")), Some(tx("A"))]);
        assert!(chain.token_transfers().is_empty());
        assert_eq!(chain.broadcasts(), 0);
    }
}
