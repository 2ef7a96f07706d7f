//! Configuration management
//! Load pool settings from a TOML file, with secrets overridable from .env

use anyhow::{Context, Result};
use std::path::Path;

// Re-export PoolConfig for external access
pub use crate::types::PoolConfig;

/// Config file used when POOL_CONFIG is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/pool.toml";

/// Highest coin precision whose smallest unit still fits in a u64 amount
const MAX_COIN_DECIMALS: u32 = 18;

pub fn load_config() -> Result<PoolConfig> {
    dotenv::dotenv().ok();
    let path = std::env::var("POOL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from_file(&path)
}

pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
    dotenv::dotenv().ok();

    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
    let mut config = parse_config(&content)?;
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<PoolConfig> {
    toml::from_str(content).context("Failed to parse TOML configuration")
}

/// GATEWAY_URL and GATEWAY_API_KEY take precedence over the file
pub fn apply_overrides<F>(config: &mut PoolConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("GATEWAY_URL").filter(|v| !v.trim().is_empty()) {
        config.gateway.base_url = url;
    }
    if let Some(key) = lookup("GATEWAY_API_KEY").filter(|v| !v.trim().is_empty()) {
        config.gateway.api_key = Some(key);
    }
}

pub fn validate(config: &PoolConfig) -> Result<()> {
    if config.pool.coin_address.trim().is_empty() {
        anyhow::bail!("pool.coin_address must not be empty");
    }
    if config.pool.token_custody_address.trim().is_empty() {
        anyhow::bail!("pool.token_custody_address must not be empty");
    }
    if config.pool.coin_decimals > MAX_COIN_DECIMALS {
        anyhow::bail!(
            "pool.coin_decimals {} exceeds {}",
            config.pool.coin_decimals,
            MAX_COIN_DECIMALS
        );
    }
    config
        .curve_constants()
        .context("Invalid [curve] constants")?;
    if config.curve.spot_quote_coins <= rust_decimal::Decimal::ZERO {
        anyhow::bail!("curve.spot_quote_coins must be positive");
    }
    if config.gateway.base_url.trim().is_empty() {
        anyhow::bail!("gateway.base_url must not be empty");
    }
    if config.gateway.request_timeout_secs == 0 {
        anyhow::bail!("gateway.request_timeout_secs must be positive");
    }
    if config.service.poll_interval_ms == 0 || config.service.cycle_timeout_secs == 0 {
        anyhow::bail!("service intervals must be positive");
    }
    Ok(())
}
