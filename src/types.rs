// Core data structures for the curve pool
// Reserves and quantities are rust_decimal values rounded to 8 places

use crate::error::{PoolError, PoolResult};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fractional digits kept on every externally visible quantity
pub const QUANTITY_DP: u32 = 8;

/// Round a quantity to 8 fractional digits (half away from zero)
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Opaque identifier of one chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a raw identifier as given. Empty or blank ids are rejected.
    pub fn new(raw: impl Into<String>) -> PoolResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(PoolError::validation("transaction id must be a non-empty string"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TransactionId {
    type Error = PoolError;

    fn try_from(raw: String) -> PoolResult<Self> {
        Self::new(raw)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction id paired with its current confirmation depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTxRef {
    pub id: TransactionId,
    pub confirmations: u64,
}

/// Result of asking the token collaborator about a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenClassification {
    TokenTransfer(Decimal),
    NotATokenTransfer,
}

/// Direction of an inbound transaction relative to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity")]
pub enum Direction {
    /// Native coin paid into the pool; pool owes tokens
    CoinInflow(Decimal),
    /// Tokens paid into the pool; pool owes coins
    TokenInflow(Decimal),
    /// The pool paid itself (change output of an earlier settlement)
    SelfEcho,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::CoinInflow(q) => write!(f, "CoinInflow({})", q),
            Direction::TokenInflow(q) => write!(f, "TokenInflow({})", q),
            Direction::SelfEcho => write!(f, "SelfEcho"),
        }
    }
}

/// Calibration values defining the curve shape for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveConstants {
    pub coin_original: Decimal,
    pub token_original: Decimal,
}

impl CurveConstants {
    pub fn new(coin_original: Decimal, token_original: Decimal) -> PoolResult<Self> {
        if coin_original <= Decimal::ZERO || token_original <= Decimal::ZERO {
            return Err(PoolError::domain(format!(
                "curve constants must be positive (coin_original={}, token_original={})",
                coin_original, token_original
            )));
        }
        Ok(Self {
            coin_original,
            token_original,
        })
    }
}

/// Pure pricing result. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeQuote {
    pub output_quantity: Decimal,
}

/// Authoritative pool holdings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    pub coin_reserve: Decimal,
    pub token_reserve: Decimal,
}

impl ReserveState {
    pub fn new(coin_reserve: Decimal, token_reserve: Decimal) -> Self {
        Self {
            coin_reserve: round_quantity(coin_reserve),
            token_reserve: round_quantity(token_reserve),
        }
    }

    /// Reserves after receiving `coin_in` and paying out `tokens_out`
    pub fn after_coin_inflow(&self, coin_in: Decimal, tokens_out: Decimal) -> PoolResult<Self> {
        let next = Self::new(self.coin_reserve + coin_in, self.token_reserve - tokens_out);
        if next.coin_reserve <= self.coin_reserve || next.token_reserve >= self.token_reserve {
            return Err(PoolError::domain(format!(
                "coin inflow {} / token payout {} does not move reserves ({} -> {})",
                coin_in, tokens_out, self, next
            )));
        }
        if next.token_reserve <= Decimal::ZERO {
            return Err(PoolError::domain(format!(
                "token payout {} exceeds token reserve {}",
                tokens_out, self.token_reserve
            )));
        }
        Ok(next)
    }

    /// Reserves after receiving `token_in` and paying out `coins_out`
    pub fn after_token_inflow(&self, token_in: Decimal, coins_out: Decimal) -> PoolResult<Self> {
        let next = Self::new(self.coin_reserve - coins_out, self.token_reserve + token_in);
        if next.token_reserve <= self.token_reserve || next.coin_reserve >= self.coin_reserve {
            return Err(PoolError::domain(format!(
                "token inflow {} / coin payout {} does not move reserves ({} -> {})",
                token_in, coins_out, self, next
            )));
        }
        if next.coin_reserve <= Decimal::ZERO {
            return Err(PoolError::domain(format!(
                "coin payout {} exceeds coin reserve {}",
                coins_out, self.coin_reserve
            )));
        }
        Ok(next)
    }
}

impl fmt::Display for ReserveState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "coin={} token={}", self.coin_reserve, self.token_reserve)
    }
}

/// Reserve pair tagged with the last transaction it reflects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub last_transaction: Option<TransactionId>,
    pub coin_reserve: Decimal,
    pub token_reserve: Decimal,
}

impl BalanceSnapshot {
    pub fn new(last_transaction: Option<TransactionId>, reserves: ReserveState) -> Self {
        Self {
            last_transaction,
            coin_reserve: reserves.coin_reserve,
            token_reserve: reserves.token_reserve,
        }
    }

    pub fn reserves(&self) -> ReserveState {
        ReserveState::new(self.coin_reserve, self.token_reserve)
    }
}

/// Outbound transactions broadcast while settling one inflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Payment to the counterparty
    pub payout_tx: TransactionId,
    /// Token sweep into pool custody (token inflows only)
    pub custody_sweep_tx: Option<TransactionId>,
    pub settled_at: DateTime<Utc>,
}

/// What a single reconciliation pass did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No one-confirmation activity; balances re-read from the chain
    Resynced(BalanceSnapshot),
    /// Transaction sent by the pool itself; recorded, nothing paid
    SelfEcho(BalanceSnapshot),
    /// Transaction carried nothing to price; recorded, nothing paid
    Ignored(BalanceSnapshot),
    /// Inflow priced and settled
    Settled {
        direction: Direction,
        sender: String,
        quote: ExchangeQuote,
        receipt: SettlementReceipt,
        snapshot: BalanceSnapshot,
    },
    /// Inflow classified and priced but not settled (dry run); the snapshot
    /// holds the reserves settlement would produce
    Quoted {
        direction: Direction,
        sender: String,
        quote: ExchangeQuote,
        snapshot: BalanceSnapshot,
    },
    /// No qualifying transaction found
    NoChange,
}

impl ReconcileOutcome {
    pub fn snapshot(&self) -> Option<&BalanceSnapshot> {
        match self {
            ReconcileOutcome::Resynced(s)
            | ReconcileOutcome::SelfEcho(s)
            | ReconcileOutcome::Ignored(s) => Some(s),
            ReconcileOutcome::Settled { snapshot, .. }
            | ReconcileOutcome::Quoted { snapshot, .. } => Some(snapshot),
            ReconcileOutcome::NoChange => None,
        }
    }

    /// Id to hand back as the caller's last-known transaction
    pub fn last_transaction(&self) -> Option<&TransactionId> {
        self.snapshot().and_then(|s| s.last_transaction.as_ref())
    }
}

/// Pool operator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub pool: PoolSection,
    pub curve: CurveSection,
    pub gateway: GatewaySection,
    #[serde(default)]
    pub service: ServiceSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSection {
    /// Address watched for inbound payments
    pub coin_address: String,
    /// Address that receives swept tokens
    pub token_custody_address: String,
    /// Fractional digits of the coin's smallest indivisible unit
    #[serde(default = "default_coin_decimals")]
    pub coin_decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurveSection {
    pub coin_original: Decimal,
    pub token_original: Decimal,
    /// Coin amount quoted by the spot price helper
    #[serde(default = "default_spot_quote_coins")]
    pub spot_quote_coins: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub seed_seen_from_history: bool,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            cycle_timeout_secs: default_cycle_timeout(),
            seed_seen_from_history: true,
        }
    }
}

fn default_coin_decimals() -> u32 { 8 }
fn default_spot_quote_coins() -> Decimal { Decimal::ONE }
fn default_request_timeout() -> u64 { 30 }
fn default_poll_interval() -> u64 { 10_000 }
fn default_cycle_timeout() -> u64 { 120 }
fn default_true() -> bool { true }

impl PoolConfig {
    pub fn curve_constants(&self) -> PoolResult<CurveConstants> {
        CurveConstants::new(self.curve.coin_original, self.curve.token_original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_id_rejects_blank() {
        assert!(TransactionId::new("").is_err());
        assert!(TransactionId::new("   ").is_err());
    }

    #[test]
    fn test_transaction_id_is_stored_verbatim() {
        let padded = TransactionId::new(" abc ").unwrap();
        assert_eq!(padded.as_str(), " abc ");
        assert_ne!(padded, TransactionId::new("abc").unwrap());
    }

    #[test]
    fn test_transaction_id_deserialize_validates() {
        let ok: TransactionId = serde_json::from_str("\"f00d\"").unwrap();
        assert_eq!(ok.as_str(), "f00d");
        assert!(serde_json::from_str::<TransactionId>("\"\"").is_err());
    }

    #[test]
    fn test_round_quantity() {
        assert_eq!(round_quantity(dec!(1.123456785)), dec!(1.12345679));
        assert_eq!(round_quantity(dec!(204.110535101306)), dec!(204.11053510));
        assert_eq!(round_quantity(dec!(-0.000000005)), dec!(-0.00000001));
    }

    #[test]
    fn test_reserves_after_coin_inflow() {
        let reserves = ReserveState::new(dec!(25), dec!(5000));
        let next = reserves.after_coin_inflow(dec!(1), dec!(204.1105351)).unwrap();
        assert_eq!(next.coin_reserve, dec!(26));
        assert_eq!(next.token_reserve, dec!(4795.8894649));
    }

    #[test]
    fn test_reserves_after_token_inflow() {
        let reserves = ReserveState::new(dec!(25), dec!(5000));
        let next = reserves.after_token_inflow(dec!(100), dec!(0.49503587)).unwrap();
        assert_eq!(next.coin_reserve, dec!(24.50496413));
        assert_eq!(next.token_reserve, dec!(5100));
    }

    #[test]
    fn test_payout_exceeding_reserve_is_domain_error() {
        let reserves = ReserveState::new(dec!(1), dec!(10));
        let err = reserves.after_coin_inflow(dec!(1), dec!(10)).unwrap_err();
        assert!(matches!(err, PoolError::Domain(_)));

        let err = reserves.after_token_inflow(dec!(5), dec!(2)).unwrap_err();
        assert!(matches!(err, PoolError::Domain(_)));
    }

    #[test]
    fn test_zero_inflow_does_not_move_reserves() {
        let reserves = ReserveState::new(dec!(25), dec!(5000));
        assert!(reserves.after_coin_inflow(Decimal::ZERO, dec!(1)).is_err());
        assert!(reserves.after_token_inflow(dec!(1), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_curve_constants_must_be_positive() {
        assert!(CurveConstants::new(dec!(25), dec!(5000)).is_ok());
        assert!(CurveConstants::new(Decimal::ZERO, dec!(5000)).is_err());
        assert!(CurveConstants::new(dec!(25), dec!(-1)).is_err());
    }

    #[test]
    fn test_outcome_last_transaction() {
        let id = TransactionId::new("tx1").unwrap();
        let snapshot = BalanceSnapshot::new(Some(id.clone()), ReserveState::new(dec!(1), dec!(2)));
        assert_eq!(ReconcileOutcome::SelfEcho(snapshot).last_transaction(), Some(&id));
        assert_eq!(ReconcileOutcome::NoChange.last_transaction(), None);
    }
}
