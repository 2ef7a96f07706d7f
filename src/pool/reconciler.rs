//! Reconciler
//!
//! One invocation processes at most one inbound transaction:
//!
//!   Idle -> Fetching -> Classifying -> {SelfEcho | CoinInflow | TokenInflow} -> Settled -> Idle
//!
//! 1. If nothing sits at exactly one confirmation, resync reserves from the
//!    chain instead (arrivals may have collapsed into deeper confirmations).
//! 2. Otherwise take the first one-confirmation id that is neither the
//!    caller's last-known id nor already seen.
//! 3. Classify by sender and token payload, price against the curve, settle
//!    through the collaborators, commit reserves, then mark the id seen.
//!
//! Ids are marked seen only after every settlement call returned. A crash or
//! transient failure between the payout broadcast and the mark can pay the
//! same inflow twice on retry (at-least-once settlement).
//!
//! Whole cycles are serialised behind `cycle_lock`, so two overlapping
//! callers can never both classify the same unseen id.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use crate::clients::Collaborators;
use crate::error::PoolResult;
use crate::pool::calculator::{to_smallest_unit, PricingEngine};
use crate::pool::{BalanceTracker, SeenSet};
use crate::types::{
    round_quantity, BalanceSnapshot, Direction, ExchangeQuote, PoolSection, ReconcileOutcome,
    ReserveState, SettlementReceipt, TokenClassification, TransactionId,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Where a reconciliation cycle currently is; reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Idle,
    Fetching,
    Classifying,
    SelfEcho,
    CoinInflow,
    TokenInflow,
    Settled,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconcilePhase::Idle => write!(f, "idle"),
            ReconcilePhase::Fetching => write!(f, "fetching"),
            ReconcilePhase::Classifying => write!(f, "classifying"),
            ReconcilePhase::SelfEcho => write!(f, "self-echo"),
            ReconcilePhase::CoinInflow => write!(f, "coin-inflow"),
            ReconcilePhase::TokenInflow => write!(f, "token-inflow"),
            ReconcilePhase::Settled => write!(f, "settled"),
        }
    }
}

/// Progress of the current cycle, kept for error context
struct Cycle {
    phase: ReconcilePhase,
    tx: Option<TransactionId>,
}

impl Cycle {
    fn enter(&mut self, phase: ReconcilePhase) {
        debug!("Reconcile phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

/// Whether a cycle settles or only reports what it would do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Settle,
    DryRun,
}

/// Orchestrates classification, pricing and settlement of pool inflows
pub struct Reconciler {
    clients: Collaborators,
    pricing: PricingEngine,
    balances: BalanceTracker,
    seen: SeenSet,
    pool: PoolSection,
    cycle_lock: Mutex<()>,
}

impl Reconciler {
    /// Create a new Reconciler
    pub fn new(
        clients: Collaborators,
        pricing: PricingEngine,
        balances: BalanceTracker,
        seen: SeenSet,
        pool: PoolSection,
    ) -> Self {
        Self {
            clients,
            pricing,
            balances,
            seen,
            pool,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn balances(&self) -> &BalanceTracker {
        &self.balances
    }

    /// Run one reconciliation cycle.
    ///
    /// Returns `Ok(None)` when a collaborator was unreachable or timed out;
    /// the cycle is abandoned and the next poll retries it. Every other error
    /// is logged with the cycle phase and propagated.
    pub async fn reconcile(
        &self,
        last_known: Option<&TransactionId>,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        self.guarded_cycle(last_known, Mode::Settle).await
    }

    /// Classify and price the next pending transaction without settling it.
    ///
    /// Nothing is broadcast and neither the seen set nor the tracked reserves
    /// change. A settled inflow comes back as `ReconcileOutcome::Quoted`.
    pub async fn dry_run(
        &self,
        last_known: Option<&TransactionId>,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        self.guarded_cycle(last_known, Mode::DryRun).await
    }

    async fn guarded_cycle(
        &self,
        last_known: Option<&TransactionId>,
        mode: Mode,
    ) -> PoolResult<Option<ReconcileOutcome>> {
        let _guard = self.cycle_lock.lock().await;
        let mut cycle = Cycle {
            phase: ReconcilePhase::Idle,
            tx: None,
        };

        match self.run_cycle(last_known, mode, &mut cycle).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if e.is_transient() => {
                warn!(
                    "Reconcile abandoned in {} phase (tx {}): {} - retrying next poll",
                    cycle.phase,
                    display_tx(&cycle.tx),
                    e
                );
                Ok(None)
            }
            Err(e) => {
                let last_known = last_known.map(|t| t.as_str()).unwrap_or("-");
                error!(
                    "Reconcile failed in {} phase (tx {}, last known {}): [{}] {:#}",
                    cycle.phase,
                    display_tx(&cycle.tx),
                    last_known,
                    e.kind(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn run_cycle(
        &self,
        last_known: Option<&TransactionId>,
        mode: Mode,
        cycle: &mut Cycle,
    ) -> PoolResult<ReconcileOutcome> {
        let pool_address = self.pool.coin_address.as_str();
        cycle.enter(ReconcilePhase::Fetching);

        if self.clients.query.has_only_deep_confirmations(pool_address).await? {
            let live = self.clients.get_blockchain_balances(pool_address).await?;
            if mode == Mode::Settle {
                self.balances.commit(live).await;
                info!("No single-confirmation activity, resynced reserves from chain: {}", live);
            }
            cycle.enter(ReconcilePhase::Idle);
            return Ok(ReconcileOutcome::Resynced(BalanceSnapshot::new(
                last_known.cloned(),
                live,
            )));
        }

        let candidates = self
            .clients
            .query
            .get_one_confirmation_transactions(pool_address)
            .await?;
        let next = candidates
            .into_iter()
            .find(|id| Some(id) != last_known && !self.seen.contains(id));

        let id = match next {
            Some(id) => id,
            None => {
                debug!("No qualifying one-confirmation transaction");
                cycle.enter(ReconcilePhase::Idle);
                return Ok(ReconcileOutcome::NoChange);
            }
        };
        cycle.tx = Some(id.clone());
        cycle.enter(ReconcilePhase::Classifying);

        let sender = self.clients.query.get_sender_address(&id).await?;
        let direction = self.classify(&id, &sender).await?;
        info!("Transaction {} from {} classified as {}", id, sender, direction);

        let reserves = self.balances.snapshot().await;
        let priced = match direction {
            Direction::SelfEcho => {
                cycle.enter(ReconcilePhase::SelfEcho);
                self.record(mode, &id);
                info!("Self-echo {} recorded, reserves unchanged ({})", id, reserves);
                cycle.enter(ReconcilePhase::Idle);
                let snapshot = BalanceSnapshot::new(Some(id), reserves);
                return Ok(ReconcileOutcome::SelfEcho(snapshot));
            }
            Direction::CoinInflow(q) | Direction::TokenInflow(q) if q <= Decimal::ZERO => None,
            Direction::TokenInflow(token_in) => {
                cycle.enter(ReconcilePhase::TokenInflow);
                self.price_token_inflow(token_in, reserves)?
            }
            Direction::CoinInflow(coin_in) => {
                cycle.enter(ReconcilePhase::CoinInflow);
                Some(self.price_coin_inflow(coin_in, reserves)?)
            }
        };

        let (quote, next_reserves) = match priced {
            Some(priced) => priced,
            None => {
                self.record(mode, &id);
                warn!(
                    "Transaction {} from {} is below the smallest settleable amount ({}), \
                     recorded without settlement",
                    id, sender, direction
                );
                cycle.enter(ReconcilePhase::Idle);
                let snapshot = BalanceSnapshot::new(Some(id), reserves);
                return Ok(ReconcileOutcome::Ignored(snapshot));
            }
        };

        if mode == Mode::DryRun {
            info!(
                "Dry run {} ({}): would pay {}, reserves would become {}",
                id, direction, quote.output_quantity, next_reserves
            );
            cycle.enter(ReconcilePhase::Idle);
            return Ok(ReconcileOutcome::Quoted {
                direction,
                sender,
                quote,
                snapshot: BalanceSnapshot::new(Some(id), next_reserves),
            });
        }

        let receipt = match direction {
            Direction::TokenInflow(token_in) => {
                self.settle_token_inflow(&sender, token_in, quote).await?
            }
            _ => self.settle_coin_inflow(&sender, quote).await?,
        };

        cycle.enter(ReconcilePhase::Settled);
        self.balances.commit(next_reserves).await;
        self.seen.add(id.clone());
        info!(
            "Settled {} ({}): paid {} via {}, reserves now {}",
            id, direction, quote.output_quantity, receipt.payout_tx, next_reserves
        );
        cycle.enter(ReconcilePhase::Idle);

        Ok(ReconcileOutcome::Settled {
            direction,
            sender,
            quote,
            receipt,
            snapshot: BalanceSnapshot::new(Some(id), next_reserves),
        })
    }

    fn record(&self, mode: Mode, id: &TransactionId) {
        if mode == Mode::Settle {
            self.seen.add(id.clone());
        }
    }

    /// Self-echo by sender, token inflow when the token client reports a
    /// positive quantity, coin inflow otherwise. Quantities are rounded to
    /// 8 places, so sub-unit dust classifies as zero.
    async fn classify(&self, id: &TransactionId, sender: &str) -> PoolResult<Direction> {
        if sender == self.pool.coin_address {
            return Ok(Direction::SelfEcho);
        }
        match self.clients.token.classify(id).await? {
            TokenClassification::TokenTransfer(quantity) if quantity > Decimal::ZERO => {
                Ok(Direction::TokenInflow(round_quantity(quantity)))
            }
            _ => {
                let received = self
                    .clients
                    .coin
                    .get_received_amount(id, &self.pool.coin_address)
                    .await?;
                Ok(Direction::CoinInflow(round_quantity(received)))
            }
        }
    }

    /// Coins owed for a token inflow. `None` when the payout truncates to
    /// zero smallest coin units.
    fn price_token_inflow(
        &self,
        token_in: Decimal,
        reserves: ReserveState,
    ) -> PoolResult<Option<(ExchangeQuote, ReserveState)>> {
        let quote = self.pricing.tokens_to_coins(token_in, reserves.token_reserve)?;
        if to_smallest_unit(quote.output_quantity, self.pool.coin_decimals)? == 0 {
            return Ok(None);
        }
        let next = reserves.after_token_inflow(token_in, quote.output_quantity)?;
        Ok(Some((quote, next)))
    }

    fn price_coin_inflow(
        &self,
        coin_in: Decimal,
        reserves: ReserveState,
    ) -> PoolResult<(ExchangeQuote, ReserveState)> {
        let quote = self.pricing.coins_to_tokens(coin_in, reserves.coin_reserve)?;
        let next = reserves.after_coin_inflow(coin_in, quote.output_quantity)?;
        Ok((quote, next))
    }

    /// Pay coins to the sender, then sweep the received tokens into custody
    async fn settle_token_inflow(
        &self,
        sender: &str,
        token_in: Decimal,
        quote: ExchangeQuote,
    ) -> PoolResult<SettlementReceipt> {
        let amount = to_smallest_unit(quote.output_quantity, self.pool.coin_decimals)?;
        let payment = self.clients.coin.build_payment(sender, amount).await?;
        let payout_tx = self.clients.coin.broadcast(payment).await?;
        info!(
            "Coin payout {} ({} units) to {} broadcast as {}",
            quote.output_quantity, amount, sender, payout_tx
        );

        let sweep = self
            .clients
            .token
            .build_transfer(&self.pool.token_custody_address, token_in)
            .await?;
        let sweep_tx = self.clients.token.broadcast(sweep).await?;
        info!("Swept {} tokens to custody as {}", token_in, sweep_tx);

        Ok(SettlementReceipt {
            payout_tx,
            custody_sweep_tx: Some(sweep_tx),
            settled_at: Utc::now(),
        })
    }

    /// Pay tokens to the sender
    async fn settle_coin_inflow(
        &self,
        sender: &str,
        quote: ExchangeQuote,
    ) -> PoolResult<SettlementReceipt> {
        let transfer = self
            .clients
            .token
            .build_transfer(sender, quote.output_quantity)
            .await?;
        let payout_tx = self.clients.token.broadcast(transfer).await?;
        info!(
            "Token payout {} to {} broadcast as {}",
            quote.output_quantity, sender, payout_tx
        );

        Ok(SettlementReceipt {
            payout_tx,
            custody_sweep_tx: None,
            settled_at: Utc::now(),
        })
    }
}

fn display_tx(tx: &Option<TransactionId>) -> &str {
    tx.as_ref().map(|t| t.as_str()).unwrap_or("-")
}
