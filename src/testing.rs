//! In-memory chain used by unit tests
//!
//! `FakeChain` implements every collaborator trait, records each outbound
//! build/broadcast call in order, and can be told to fail a named operation.

use crate::clients::{
    AddressBalance, CoinClient, Collaborators, RawPayload, TokenClient, TxQueryService,
};
use crate::error::{ErrorKind, PoolError, PoolResult};
use crate::types::{ConfirmedTxRef, TokenClassification, TransactionId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const POOL_ADDRESS: &str = "pool-coin-address";
pub const CUSTODY_ADDRESS: &str = "pool-token-custody";

pub fn tx(id: &str) -> TransactionId {
    TransactionId::new(id).unwrap()
}

#[derive(Default)]
struct ChainState {
    coin_balance: Decimal,
    token_balance: Decimal,
    live_ids: Vec<TransactionId>,
    confirmations: HashMap<TransactionId, u64>,
    one_confirmation: Vec<TransactionId>,
    only_deep: bool,
    senders: HashMap<TransactionId, String>,
    token_inflows: HashMap<TransactionId, Decimal>,
    coin_received: HashMap<TransactionId, Decimal>,
    failures: HashMap<&'static str, ErrorKind>,
    calls: Vec<String>,
    coin_payments: Vec<(String, u64)>,
    token_transfers: Vec<(String, Decimal)>,
    broadcasts: usize,
}

#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators::new(self.clone(), self.clone(), self.clone())
    }

    pub fn set_balances(&self, coin: Decimal, token: Decimal) {
        let mut s = self.state.lock().unwrap();
        s.coin_balance = coin;
        s.token_balance = token;
    }

    /// Attach an id to the pool address with the given confirmation depth
    pub fn add_live(&self, id: &str, confirmations: u64) {
        let mut s = self.state.lock().unwrap();
        s.live_ids.push(tx(id));
        s.confirmations.insert(tx(id), confirmations);
    }

    pub fn set_only_deep(&self, only_deep: bool) {
        self.state.lock().unwrap().only_deep = only_deep;
    }

    /// One-confirmation coin payment into the pool
    pub fn add_coin_inflow(&self, id: &str, sender: &str, amount: Decimal) {
        let mut s = self.state.lock().unwrap();
        s.one_confirmation.push(tx(id));
        s.senders.insert(tx(id), sender.to_string());
        s.coin_received.insert(tx(id), amount);
    }

    /// One-confirmation token transfer into the pool
    pub fn add_token_inflow(&self, id: &str, sender: &str, quantity: Decimal) {
        let mut s = self.state.lock().unwrap();
        s.one_confirmation.push(tx(id));
        s.senders.insert(tx(id), sender.to_string());
        s.token_inflows.insert(tx(id), quantity);
    }

    pub fn fail(&self, operation: &'static str, kind: ErrorKind) {
        self.state.lock().unwrap().failures.insert(operation, kind);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn coin_payments(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().coin_payments.clone()
    }

    pub fn token_transfers(&self) -> Vec<(String, Decimal)> {
        self.state.lock().unwrap().token_transfers.clone()
    }

    pub fn broadcasts(&self) -> usize {
        self.state.lock().unwrap().broadcasts
    }

    fn enter(&self, operation: &'static str) -> PoolResult<std::sync::MutexGuard<'_, ChainState>> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(operation.to_string());
        match s.failures.get(operation) {
            None => Ok(s),
            Some(ErrorKind::NetworkTransient) => {
                Err(PoolError::transient(operation, "connection refused"))
            }
            Some(ErrorKind::Validation) => Err(PoolError::validation(operation)),
            Some(ErrorKind::Domain) => Err(PoolError::domain(operation)),
            Some(ErrorKind::Unhandled) => Err(anyhow::anyhow!("{} exploded", operation).into()),
        }
    }
}

#[async_trait]
impl CoinClient for FakeChain {
    async fn get_balance(&self, _address: &str) -> PoolResult<AddressBalance> {
        let s = self.enter("get_balance")?;
        Ok(AddressBalance {
            balance: s.coin_balance,
            transaction_ids: s.live_ids.clone(),
        })
    }

    async fn build_payment(&self, recipient: &str, amount: u64) -> PoolResult<RawPayload> {
        let mut s = self.enter("build_payment")?;
        s.coin_payments.push((recipient.to_string(), amount));
        Ok(RawPayload(format!("coin:{}:{}", recipient, amount)))
    }

    async fn broadcast(&self, _payload: RawPayload) -> PoolResult<TransactionId> {
        let mut s = self.enter("coin_broadcast")?;
        s.broadcasts += 1;
        Ok(tx(&format!("out-{}", s.broadcasts)))
    }

    async fn get_received_amount(&self, id: &TransactionId, _address: &str) -> PoolResult<Decimal> {
        let s = self.enter("get_received_amount")?;
        Ok(s.coin_received.get(id).copied().unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl TokenClient for FakeChain {
    async fn get_token_balance(&self) -> PoolResult<Decimal> {
        let s = self.enter("get_token_balance")?;
        Ok(s.token_balance)
    }

    async fn classify(&self, id: &TransactionId) -> PoolResult<TokenClassification> {
        let s = self.enter("classify")?;
        Ok(match s.token_inflows.get(id) {
            Some(q) => TokenClassification::TokenTransfer(*q),
            None => TokenClassification::NotATokenTransfer,
        })
    }

    async fn build_transfer(&self, recipient: &str, quantity: Decimal) -> PoolResult<RawPayload> {
        let mut s = self.enter("build_transfer")?;
        s.token_transfers.push((recipient.to_string(), quantity));
        Ok(RawPayload(format!("token:{}:{}", recipient, quantity)))
    }

    async fn broadcast(&self, _payload: RawPayload) -> PoolResult<TransactionId> {
        let mut s = self.enter("token_broadcast")?;
        s.broadcasts += 1;
        Ok(tx(&format!("out-{}", s.broadcasts)))
    }
}

#[async_trait]
impl TxQueryService for FakeChain {
    async fn get_confirmations(&self, ids: &[TransactionId]) -> PoolResult<Vec<ConfirmedTxRef>> {
        let s = self.enter("get_confirmations")?;
        Ok(ids
            .iter()
            .map(|id| ConfirmedTxRef {
                id: id.clone(),
                confirmations: s.confirmations.get(id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn get_sender_address(&self, id: &TransactionId) -> PoolResult<String> {
        let s = self.enter("get_sender_address")?;
        Ok(s.senders.get(id).cloned().unwrap_or_default())
    }

    async fn get_one_confirmation_transactions(
        &self,
        _address: &str,
    ) -> PoolResult<Vec<TransactionId>> {
        let s = self.enter("get_one_confirmation_transactions")?;
        Ok(s.one_confirmation.clone())
    }

    async fn has_only_deep_confirmations(&self, _address: &str) -> PoolResult<bool> {
        let s = self.enter("has_only_deep_confirmations")?;
        Ok(s.only_deep)
    }
}
