//! HTTP Chain Gateway
//!
//! reqwest-backed implementation of the collaborator traits against a JSON
//! gateway that fronts the chain node, the token indexer and the signer.
//!
//! Routes (relative to the configured base URL):
//!   GET  addresses/{addr}/balance
//!   GET  addresses/{addr}/transactions/one-confirmation
//!   GET  addresses/{addr}/confirmation-depth
//!   POST transactions/confirmations
//!   GET  transactions/{id}/sender
//!   GET  transactions/{id}/received/{addr}
//!   POST coin/payments, coin/broadcast
//!   GET  token/addresses/{addr}/balance, token/transfers/{id}
//!   POST token/transfers, token/broadcast
//!
//! Connect failures and timeouts map to `PoolError::NetworkTransient`;
//! HTTP error statuses and decode failures are unhandled.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{AddressBalance, CoinClient, RawPayload, TokenClient, TxQueryService};
use crate::error::{PoolError, PoolResult};
use crate::types::{ConfirmedTxRef, TokenClassification, TransactionId};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared HTTP connection to the gateway
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct PayloadResponse {
    payload: String,
}

#[derive(Deserialize)]
struct BroadcastResponse {
    tx_id: TransactionId,
}

#[derive(Deserialize)]
struct AmountResponse {
    amount: Decimal,
}

#[derive(Deserialize)]
struct TokenBalanceResponse {
    balance: Decimal,
}

#[derive(Deserialize)]
struct TokenTransferResponse {
    /// Absent when the transaction carries no token transfer
    quantity: Option<Decimal>,
}

#[derive(Deserialize)]
struct SenderResponse {
    address: String,
}

#[derive(Deserialize)]
struct TransactionListResponse {
    transaction_ids: Vec<TransactionId>,
}

#[derive(Deserialize)]
struct ConfirmationDepthResponse {
    only_deep_confirmations: bool,
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    recipient: &'a str,
    amount: u64,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    sender: &'a str,
    recipient: &'a str,
    quantity: Decimal,
}

#[derive(Serialize)]
struct BroadcastRequest {
    payload: RawPayload,
}

#[derive(Serialize)]
struct ConfirmationsRequest<'a> {
    ids: &'a [TransactionId],
}

impl GatewayClient {
    /// Create a new GatewayClient with a per-request timeout
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid gateway URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Gateway URL cannot be a base: {}", base_url);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> PoolResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PoolError::validation(format!("gateway URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
    ) -> PoolResult<T> {
        let url = self.endpoint(segments)?;
        debug!("Gateway {}: GET {}", operation, url);
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        Self::decode(operation, request.send().await).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &str,
        segments: &[&str],
        body: &B,
    ) -> PoolResult<T> {
        let url = self.endpoint(segments)?;
        debug!("Gateway {}: POST {}", operation, url);
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        Self::decode(operation, request.send().await).await
    }

    async fn decode<T: DeserializeOwned>(
        operation: &str,
        sent: reqwest::Result<reqwest::Response>,
    ) -> PoolResult<T> {
        let response = sent
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_http_error(operation, e))?;
        response
            .json::<T>()
            .await
            .map_err(|e| map_http_error(operation, e))
    }
}

/// Unreachable host and timeout are transient; everything else is not
fn map_http_error(operation: &str, err: reqwest::Error) -> PoolError {
    if err.is_timeout() || err.is_connect() {
        PoolError::transient(operation, err.to_string())
    } else {
        let context = format!("Gateway {} failed", operation);
        PoolError::Unhandled(anyhow::Error::new(err).context(context))
    }
}

/// Coin side of the gateway
#[derive(Debug, Clone)]
pub struct GatewayCoinClient {
    gateway: Arc<GatewayClient>,
}

impl GatewayCoinClient {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CoinClient for GatewayCoinClient {
    async fn get_balance(&self, address: &str) -> PoolResult<AddressBalance> {
        self.gateway
            .get_json("get_balance", &["addresses", address, "balance"])
            .await
    }

    async fn build_payment(&self, recipient: &str, amount: u64) -> PoolResult<RawPayload> {
        let response: PayloadResponse = self
            .gateway
            .post_json(
                "build_payment",
                &["coin", "payments"],
                &PaymentRequest { recipient, amount },
            )
            .await?;
        Ok(RawPayload(response.payload))
    }

    async fn broadcast(&self, payload: RawPayload) -> PoolResult<TransactionId> {
        let response: BroadcastResponse = self
            .gateway
            .post_json("coin_broadcast", &["coin", "broadcast"], &BroadcastRequest { payload })
            .await?;
        Ok(response.tx_id)
    }

    async fn get_received_amount(&self, id: &TransactionId, address: &str) -> PoolResult<Decimal> {
        let response: AmountResponse = self
            .gateway
            .get_json("get_received_amount", &["transactions", id.as_str(), "received", address])
            .await?;
        Ok(response.amount)
    }
}

/// Token side of the gateway, bound to the pool's custody address
#[derive(Debug, Clone)]
pub struct GatewayTokenClient {
    gateway: Arc<GatewayClient>,
    custody_address: String,
}

impl GatewayTokenClient {
    pub fn new(gateway: Arc<GatewayClient>, custody_address: impl Into<String>) -> Self {
        Self {
            gateway,
            custody_address: custody_address.into(),
        }
    }
}

#[async_trait]
impl TokenClient for GatewayTokenClient {
    async fn get_token_balance(&self) -> PoolResult<Decimal> {
        let response: TokenBalanceResponse = self
            .gateway
            .get_json(
                "get_token_balance",
                &["token", "addresses", self.custody_address.as_str(), "balance"],
            )
            .await?;
        Ok(response.balance)
    }

    async fn classify(&self, id: &TransactionId) -> PoolResult<TokenClassification> {
        let response: TokenTransferResponse = self
            .gateway
            .get_json("classify_token_transfer", &["token", "transfers", id.as_str()])
            .await?;
        Ok(match response.quantity {
            Some(quantity) => TokenClassification::TokenTransfer(quantity),
            None => TokenClassification::NotATokenTransfer,
        })
    }

    async fn build_transfer(&self, recipient: &str, quantity: Decimal) -> PoolResult<RawPayload> {
        let request = TransferRequest {
            sender: &self.custody_address,
            recipient,
            quantity,
        };
        let response: PayloadResponse = self
            .gateway
            .post_json("build_token_transfer", &["token", "transfers"], &request)
            .await?;
        Ok(RawPayload(response.payload))
    }

    async fn broadcast(&self, payload: RawPayload) -> PoolResult<TransactionId> {
        let response: BroadcastResponse = self
            .gateway
            .post_json("token_broadcast", &["token", "broadcast"], &BroadcastRequest { payload })
            .await?;
        Ok(response.tx_id)
    }
}

/// Node/indexer queries through the gateway
#[derive(Debug, Clone)]
pub struct GatewayQueryService {
    gateway: Arc<GatewayClient>,
}

impl GatewayQueryService {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TxQueryService for GatewayQueryService {
    async fn get_confirmations(&self, ids: &[TransactionId]) -> PoolResult<Vec<ConfirmedTxRef>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway
            .post_json(
                "get_confirmations",
                &["transactions", "confirmations"],
                &ConfirmationsRequest { ids },
            )
            .await
    }

    async fn get_sender_address(&self, id: &TransactionId) -> PoolResult<String> {
        let response: SenderResponse = self
            .gateway
            .get_json("get_sender_address", &["transactions", id.as_str(), "sender"])
            .await?;
        Ok(response.address)
    }

    async fn get_one_confirmation_transactions(
        &self,
        address: &str,
    ) -> PoolResult<Vec<TransactionId>> {
        let response: TransactionListResponse = self
            .gateway
            .get_json(
                "get_one_confirmation_transactions",
                &["addresses", address, "transactions", "one-confirmation"],
            )
            .await?;
        Ok(response.transaction_ids)
    }

    async fn has_only_deep_confirmations(&self, address: &str) -> PoolResult<bool> {
        let response: ConfirmationDepthResponse = self
            .gateway
            .get_json(
                "has_only_deep_confirmations",
                &["addresses", address, "confirmation-depth"],
            )
            .await?;
        Ok(response.only_deep_confirmations)
    }
}
