//! Bonding-Curve Pool Operator
//!
//! Main entry point. `run` bootstraps the pool from live balances and polls
//! the gateway until Ctrl-C; it is the only subcommand that settles. The
//! others run one read-only step and print the result as JSON.
//!
//! Usage:
//!   curvepool-bot run
//!   curvepool-bot --config config/pool.toml reconcile --last <txid>
//!   curvepool-bot quote --coin-in 1.5
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curvepool_bot::clients::{
    Collaborators, GatewayClient, GatewayCoinClient, GatewayQueryService, GatewayTokenClient,
};
use curvepool_bot::config::{load_config_from_file, DEFAULT_CONFIG_PATH};
use curvepool_bot::service::PoolService;
use curvepool_bot::types::{PoolConfig, TransactionId};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Bonding-curve pool operator
#[derive(Parser)]
#[command(name = "curvepool-bot")]
struct Args {
    /// Pool configuration file
    #[arg(short, long, env = "POOL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll and reconcile until interrupted
    Run,
    /// List confirmed transactions not yet processed
    Detect,
    /// Classify and price the next pending transaction (dry run, never
    /// settles: only `run` broadcasts payouts)
    Reconcile {
        /// Last transaction id already reflected by the caller
        #[arg(long)]
        last: Option<String>,
    },
    /// Live coin and token balances of the pool
    Balances,
    /// Quote an exchange against the current on-chain reserves
    Quote {
        #[arg(long, conflicts_with = "token_in", required_unless_present = "token_in")]
        coin_in: Option<Decimal>,
        #[arg(long)]
        token_in: Option<Decimal>,
    },
    /// Fiat price of the configured spot quantity of coin
    SpotPrice {
        #[arg(long)]
        fiat_per_coin: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config_from_file(&args.config)?;
    info!("Configuration loaded from {} (pool {})", args.config, config.pool.coin_address);

    let clients = gateway_collaborators(&config)?;
    let service = PoolService::bootstrap(config, clients).await?;

    match args.command {
        Command::Run => {
            let stats = service
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            info!(
                "Stopped after {} polls ({} settled, {} resyncs)",
                stats.polls, stats.settlements, stats.resyncs
            );
        }
        Command::Detect => print_json(&service.detect_new_events().await?)?,
        Command::Reconcile { last } => {
            let last = last.map(TransactionId::new).transpose()?;
            print_json(&service.preview_one_event(last.as_ref()).await?)?
        }
        Command::Balances => print_json(&service.get_blockchain_balances().await?)?,
        Command::Quote { coin_in, token_in } => {
            let reserves = service.get_blockchain_balances().await?;
            let quote = match (coin_in, token_in) {
                (Some(coins), _) => {
                    service.pricing().coins_to_tokens(coins, reserves.coin_reserve)?
                }
                (None, Some(tokens)) => {
                    service.pricing().tokens_to_coins(tokens, reserves.token_reserve)?
                }
                (None, None) => anyhow::bail!("either --coin-in or --token-in is required"),
            };
            print_json(&quote)?
        }
        Command::SpotPrice { fiat_per_coin } => {
            let reserves = service.get_blockchain_balances().await?;
            print_json(&service.pricing().spot_price(reserves.coin_reserve, fiat_per_coin)?)?
        }
    }

    Ok(())
}

/// Gateway-backed collaborators sharing one HTTP client
fn gateway_collaborators(config: &PoolConfig) -> Result<Collaborators> {
    let gateway = Arc::new(
        GatewayClient::new(
            &config.gateway.base_url,
            config.gateway.api_key.clone(),
            Duration::from_secs(config.gateway.request_timeout_secs),
        )
        .context("Failed to build gateway client")?,
    );
    info!("Gateway: {}", config.gateway.base_url);

    Ok(Collaborators::new(
        Arc::new(GatewayCoinClient::new(gateway.clone())),
        Arc::new(GatewayTokenClient::new(
            gateway.clone(),
            config.pool.token_custody_address.clone(),
        )),
        Arc::new(GatewayQueryService::new(gateway)),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
