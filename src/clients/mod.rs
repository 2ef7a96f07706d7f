//! External Collaborators
//!
//! Contracts the pool core consumes: a coin client for the native asset, a
//! token client for the fungible token, and a transaction query service
//! (node/indexer). Raw transaction construction, signing and broadcasting
//! live behind these traits.
//!
//! Implementations must report unreachable hosts and timeouts as
//! `PoolError::NetworkTransient` so the reconciler can abandon the cycle.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

pub mod gateway;

pub use gateway::{GatewayClient, GatewayCoinClient, GatewayQueryService, GatewayTokenClient};

use crate::error::PoolResult;
use crate::types::{ConfirmedTxRef, ReserveState, TokenClassification, TransactionId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Balance of an address plus every transaction id associated with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub balance: Decimal,
    pub transaction_ids: Vec<TransactionId>,
}

/// Opaque signed payload produced by a builder, consumed by broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(pub String);

/// Native coin operations
#[async_trait]
pub trait CoinClient: Send + Sync {
    async fn get_balance(&self, address: &str) -> PoolResult<AddressBalance>;

    /// Build a signed payment of `amount` smallest units to `recipient`
    async fn build_payment(&self, recipient: &str, amount: u64) -> PoolResult<RawPayload>;

    async fn broadcast(&self, payload: RawPayload) -> PoolResult<TransactionId>;

    /// Value of transaction `id` paid to `address`
    async fn get_received_amount(&self, id: &TransactionId, address: &str) -> PoolResult<Decimal>;
}

/// Fungible token operations
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn get_token_balance(&self) -> PoolResult<Decimal>;

    async fn classify(&self, id: &TransactionId) -> PoolResult<TokenClassification>;

    async fn build_transfer(&self, recipient: &str, quantity: Decimal) -> PoolResult<RawPayload>;

    async fn broadcast(&self, payload: RawPayload) -> PoolResult<TransactionId>;
}

/// Read-only chain queries
#[async_trait]
pub trait TxQueryService: Send + Sync {
    /// Confirmation depth for each id (batched)
    async fn get_confirmations(&self, ids: &[TransactionId]) -> PoolResult<Vec<ConfirmedTxRef>>;

    async fn get_sender_address(&self, id: &TransactionId) -> PoolResult<String>;

    /// Ids with exactly one confirmation for `address`, oldest first
    async fn get_one_confirmation_transactions(
        &self,
        address: &str,
    ) -> PoolResult<Vec<TransactionId>>;

    /// True when nothing at exactly one-confirmation depth is pending for `address`
    async fn has_only_deep_confirmations(&self, address: &str) -> PoolResult<bool>;
}

/// The three collaborators handed to the watcher and the reconciler
#[derive(Clone)]
pub struct Collaborators {
    pub coin: Arc<dyn CoinClient>,
    pub token: Arc<dyn TokenClient>,
    pub query: Arc<dyn TxQueryService>,
}

impl Collaborators {
    pub fn new(
        coin: Arc<dyn CoinClient>,
        token: Arc<dyn TokenClient>,
        query: Arc<dyn TxQueryService>,
    ) -> Self {
        Self { coin, token, query }
    }

    /// Live pool holdings read straight from the chain
    pub async fn get_blockchain_balances(&self, pool_address: &str) -> PoolResult<ReserveState> {
        let coin = self.coin.get_balance(pool_address).await?.balance;
        let token = self.token.get_token_balance().await?;
        let reserves = ReserveState::new(coin, token);
        debug!("Blockchain balances for {}: {}", pool_address, reserves);
        Ok(reserves)
    }
}
