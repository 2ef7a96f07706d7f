//! Pricing Engine
//!
//! Bonding-curve math converting an input quantity of one asset into an
//! output quantity of the other, given current reserves.
//!
//! The curve ties token displacement logarithmically to the coin reserve:
//!   tokens(coin)  = -K * ln(coin / coin0)
//!   coin(dToken)  = coin0 * e^(-dToken / K)
//! where K = token_original and coin0 = coin_original.
//!
//! Math runs in f64 (ln/exp) and results are converted back to Decimal
//! rounded to 8 places. Inputs outside the curve domain are rejected with
//! `PoolError::Domain` before any logarithm is taken.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use crate::error::{PoolError, PoolResult};
use crate::types::{round_quantity, CurveConstants, ExchangeQuote};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

/// Fixed deduction representing on-chain settlement cost (0.0000027 coin)
pub const SETTLEMENT_FEE: Decimal = Decimal::from_parts(27, 0, 0, false, 7);

const SETTLEMENT_FEE_F64: f64 = 0.0000027;

/// Pure, stateless curve pricing for one pool
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    constants: CurveConstants,
    /// Coin amount used by `spot_price` as its notional quote size
    spot_quote_coins: Decimal,
}

impl PricingEngine {
    /// Create a new PricingEngine
    pub fn new(constants: CurveConstants) -> Self {
        Self {
            constants,
            spot_quote_coins: Decimal::ONE,
        }
    }

    /// Override the notional quote size used by `spot_price`
    pub fn with_spot_quote(mut self, coins: Decimal) -> Self {
        self.spot_quote_coins = coins;
        self
    }

    pub fn constants(&self) -> CurveConstants {
        self.constants
    }

    /// Tokens owed for `coin_in` coins received
    ///
    /// coin_after = coin_before - coin_in - FEE
    /// result     = |(-K ln(coin_after/coin0)) - (-K ln(coin_before/coin0))|
    pub fn coins_to_tokens(
        &self,
        coin_in: Decimal,
        coin_reserve: Decimal,
    ) -> PoolResult<ExchangeQuote> {
        if coin_in < Decimal::ZERO {
            return Err(PoolError::validation(format!("coin input {} is negative", coin_in)));
        }
        let (coin0, k) = self.curve_params()?;
        let coin_before = to_f64("coin reserve", coin_reserve)?;
        let coin_after = coin_before - to_f64("coin input", coin_in)? - SETTLEMENT_FEE_F64;

        ensure_positive("coin reserve before trade", coin_before)?;
        ensure_positive("coin reserve after trade", coin_after)?;

        let token_before = -k * (coin_before / coin0).ln();
        let token_after = -k * (coin_after / coin0).ln();

        let quote = to_quote((token_after - token_before).abs())?;
        debug!(
            "coins_to_tokens: in={} reserve={} -> out={}",
            coin_in, coin_reserve, quote.output_quantity
        );
        Ok(quote)
    }

    /// Coins owed for `token_in` tokens received
    ///
    /// token1 = token_reserve - K, token2 = token1 + token_in
    /// result = |coin0 e^(-token2/K) - coin0 e^(-token1/K) - FEE|
    pub fn tokens_to_coins(
        &self,
        token_in: Decimal,
        token_reserve: Decimal,
    ) -> PoolResult<ExchangeQuote> {
        if token_in < Decimal::ZERO {
            return Err(PoolError::validation(format!("token input {} is negative", token_in)));
        }
        let (coin0, k) = self.curve_params()?;
        let reserve = to_f64("token reserve", token_reserve)?;
        ensure_positive("token reserve", reserve)?;

        let token1 = reserve - k;
        let token2 = token1 + to_f64("token input", token_in)?;
        let coin1 = coin0 * (-token1 / k).exp();
        let coin2 = coin0 * (-token2 / k).exp();

        let quote = to_quote((coin2 - coin1 - SETTLEMENT_FEE_F64).abs())?;
        debug!(
            "tokens_to_coins: in={} reserve={} -> out={}",
            token_in, token_reserve, quote.output_quantity
        );
        Ok(quote)
    }

    /// Fiat price of one token, from a notional coin quote against the curve
    ///
    /// Quotes `spot_quote_coins` at the live coin reserve using the configured
    /// curve constants, then converts tokens-per-coin into fiat-per-token.
    pub fn spot_price(
        &self,
        coin_reserve: Decimal,
        fiat_per_coin: Decimal,
    ) -> PoolResult<Decimal> {
        if fiat_per_coin <= Decimal::ZERO {
            return Err(PoolError::validation(format!(
                "fiat per coin must be positive, got {}",
                fiat_per_coin
            )));
        }
        let tokens = self
            .coins_to_tokens(self.spot_quote_coins, coin_reserve)?
            .output_quantity;
        if tokens.is_zero() {
            return Err(PoolError::domain("spot quote produced zero tokens"));
        }
        let price = self
            .spot_quote_coins
            .checked_mul(fiat_per_coin)
            .and_then(|fiat| fiat.checked_div(tokens))
            .ok_or_else(|| {
                PoolError::validation(format!(
                    "spot price for {} fiat per coin overflows",
                    fiat_per_coin
                ))
            })?;
        Ok(round_quantity(price))
    }

    fn curve_params(&self) -> PoolResult<(f64, f64)> {
        let coin0 = to_f64("coin_original", self.constants.coin_original)?;
        let k = to_f64("token_original", self.constants.token_original)?;
        ensure_positive("coin_original", coin0)?;
        ensure_positive("token_original", k)?;
        Ok((coin0, k))
    }
}

/// Convert a coin quantity into the chain's smallest indivisible unit (truncating)
pub fn to_smallest_unit(coins: Decimal, decimals: u32) -> PoolResult<u64> {
    if coins < Decimal::ZERO {
        return Err(PoolError::validation(format!("coin amount {} is negative", coins)));
    }
    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| PoolError::validation(format!("coin decimals {} out of range", decimals)))?;
    coins
        .checked_mul(scale)
        .and_then(|units| units.trunc().to_u64())
        .ok_or_else(|| {
            PoolError::validation(format!("coin amount {} overflows smallest unit", coins))
        })
}

fn to_f64(label: &str, value: Decimal) -> PoolResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| PoolError::domain(format!("{} {} is not representable", label, value)))
}

fn ensure_positive(label: &str, value: f64) -> PoolResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PoolError::domain(format!("{} must be positive, got {}", label, value)))
    }
}

fn to_quote(raw: f64) -> PoolResult<ExchangeQuote> {
    if !raw.is_finite() {
        return Err(PoolError::domain(format!("curve produced non-finite output {}", raw)));
    }
    let value = Decimal::from_f64(raw)
        .ok_or_else(|| PoolError::domain(format!("curve output {} not representable", raw)))?;
    Ok(ExchangeQuote {
        output_quantity: round_quantity(value),
    })
}
