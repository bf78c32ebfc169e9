//! Constant-product pricing engine
//!
//! Pure quote math for pool sizing and slippage bounds. All amounts are
//! `U256`; nothing in this module gates fund movement on floating point.
//! Floats appear only in display helpers (spot price, price impact).
//!
//! Quotes follow the bonding-curve formulation: for a buy,
//! `tokens_out = token_reserve - k / (base_reserve + amount_in_after_fee)`
//! with `k = base_reserve * token_reserve`. The fee is charged on the input
//! and stays in the pool, so the post-trade invariant never drops below `k`.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::errors::PricingError;

/// Basis-point denominator used for fees and slippage.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// One pool's constant-product state at a point in time.
///
/// For launchpad bonding curves these are the virtual reserves; for a V2-style
/// pair they are the real ones. The math is identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    /// Quote-side reserve (native/quote currency)
    pub base: U256,

    /// Token-side reserve
    pub token: U256,
}

impl Reserves {
    pub fn new(base: U256, token: U256) -> Self {
        Self { base, token }
    }

    /// The curve invariant `k = base * token`.
    pub fn invariant(&self) -> Result<U256, PricingError> {
        self.base
            .checked_mul(self.token)
            .ok_or(PricingError::Overflow)
    }

    fn ensure_funded(&self) -> Result<(), PricingError> {
        if self.base.is_zero() || self.token.is_zero() {
            return Err(PricingError::EmptyReserves);
        }
        Ok(())
    }
}

/// Result of quoting one swap against a reserve snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    /// Output amount the curve yields for the after-fee input
    pub amount_out: U256,

    /// Fee charged on the input (stays in the pool)
    pub fee_paid: U256,

    /// Reserves after the trade, full input credited
    pub new_reserves: Reserves,

    /// Display-only price impact versus the spot price, in percent
    pub price_impact_pct: f64,
}

/// Quote a buy: quote currency in, tokens out.
pub fn buy_quote(
    reserves: &Reserves,
    amount_in: U256,
    fee_bps: u32,
) -> Result<SwapQuote, PricingError> {
    reserves.ensure_funded()?;
    let amount_after_fee = take_fee(amount_in, fee_bps)?;

    let k = reserves.invariant()?;
    let new_base = reserves
        .base
        .checked_add(amount_after_fee)
        .ok_or(PricingError::Overflow)?;
    let tokens_remaining = k / new_base;
    let amount_out = reserves
        .token
        .checked_sub(tokens_remaining)
        .ok_or(PricingError::Overflow)?;

    let new_reserves = Reserves {
        base: reserves
            .base
            .checked_add(amount_in)
            .ok_or(PricingError::Overflow)?,
        token: reserves.token - amount_out,
    };

    let spot_out = ratio_out(amount_in, reserves.token, reserves.base);
    Ok(SwapQuote {
        amount_out,
        fee_paid: amount_in - amount_after_fee,
        new_reserves,
        price_impact_pct: impact_pct(spot_out, amount_out),
    })
}

/// Quote a sell: tokens in, quote currency out. Symmetric to [`buy_quote`].
pub fn sell_quote(
    reserves: &Reserves,
    amount_in: U256,
    fee_bps: u32,
) -> Result<SwapQuote, PricingError> {
    reserves.ensure_funded()?;
    let amount_after_fee = take_fee(amount_in, fee_bps)?;

    let k = reserves.invariant()?;
    let new_token = reserves
        .token
        .checked_add(amount_after_fee)
        .ok_or(PricingError::Overflow)?;
    let base_remaining = k / new_token;
    let amount_out = reserves
        .base
        .checked_sub(base_remaining)
        .ok_or(PricingError::Overflow)?;

    let new_reserves = Reserves {
        base: reserves.base - amount_out,
        token: reserves
            .token
            .checked_add(amount_in)
            .ok_or(PricingError::Overflow)?,
    };

    let spot_out = ratio_out(amount_in, reserves.base, reserves.token);
    Ok(SwapQuote {
        amount_out,
        fee_paid: amount_in - amount_after_fee,
        new_reserves,
        price_impact_pct: impact_pct(spot_out, amount_out),
    })
}

/// Minimum acceptable output after applying a slippage tolerance.
pub fn min_amount_out(quoted_out: U256, slippage_bps: u32) -> U256 {
    let bps = U256::from(BPS_DENOMINATOR);
    let keep = U256::from(BPS_DENOMINATOR.saturating_sub(slippage_bps));
    quoted_out * keep / bps
}

/// Spot price in quote currency per token. Display only.
pub fn spot_price(reserves: &Reserves) -> f64 {
    let token = u256_to_f64(reserves.token);
    if token == 0.0 {
        return 0.0;
    }
    u256_to_f64(reserves.base) / token
}

/// Total pool depth expressed in the quote currency (both sides valued at
/// spot, i.e. twice the base reserve).
pub fn depth_in_quote(reserves: &Reserves) -> U256 {
    reserves.base.saturating_mul(U256::from(2u8))
}

/// Pool depth as a USD estimate, given the base asset's decimals and USD
/// price. Display/threshold heuristic only; never sizes a trade.
pub fn depth_usd(reserves: &Reserves, base_decimals: u32, base_usd_price: f64) -> f64 {
    u256_to_f64(depth_in_quote(reserves)) / 10f64.powi(base_decimals as i32) * base_usd_price
}

/// Lossy conversion for display-oriented figures. Never used for amounts
/// that gate a trade.
pub fn u256_to_f64(value: U256) -> f64 {
    let mut out = 0.0f64;
    for (i, limb) in value.0.iter().enumerate() {
        out += (*limb as f64) * 2f64.powi(64 * i as i32);
    }
    out
}

fn take_fee(amount_in: U256, fee_bps: u32) -> Result<U256, PricingError> {
    if amount_in.is_zero() {
        return Err(PricingError::ZeroAmount);
    }
    if fee_bps >= BPS_DENOMINATOR {
        return Err(PricingError::FeeTooHigh(fee_bps));
    }
    let fee = amount_in
        .checked_mul(U256::from(fee_bps))
        .ok_or(PricingError::Overflow)?
        / U256::from(BPS_DENOMINATOR);
    Ok(amount_in - fee)
}

/// Output at the undisturbed spot ratio, the baseline for price impact.
fn ratio_out(amount_in: U256, out_reserve: U256, in_reserve: U256) -> f64 {
    let denom = u256_to_f64(in_reserve);
    if denom == 0.0 {
        return 0.0;
    }
    u256_to_f64(amount_in) * u256_to_f64(out_reserve) / denom
}

fn impact_pct(spot_out: f64, actual_out: U256) -> f64 {
    if spot_out <= 0.0 {
        return 0.0;
    }
    ((spot_out - u256_to_f64(actual_out)) / spot_out * 100.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Launch-state bonding curve: 30 base units of 1e9, ~1.073e15 token units.
    fn launch_reserves() -> Reserves {
        Reserves::new(
            U256::from(30_000_000_000u64),
            U256::from(1_073_000_000_000_000u64),
        )
    }

    #[test]
    fn buy_quote_matches_reference_curve_values() {
        let reserves = launch_reserves();
        let amount_in = U256::from(1_000_000_000u64);

        let quote = buy_quote(&reserves, amount_in, 100).expect("quote");

        // fee = 1% of input; output computed on the remaining 990_000_000
        assert_eq!(quote.fee_paid, U256::from(10_000_000u64));
        assert_eq!(quote.amount_out, U256::from(34_277_831_558_568u64));
        assert!(quote.amount_out < reserves.token);

        // full input credited to the pool
        assert_eq!(quote.new_reserves.base, U256::from(31_000_000_000u64));
        assert_eq!(
            quote.new_reserves.token,
            reserves.token - quote.amount_out
        );
    }

    #[test]
    fn invariant_never_decreases_across_a_trade() {
        let reserves = launch_reserves();
        let k_before = reserves.invariant().unwrap();

        let buy = buy_quote(&reserves, U256::from(1_000_000_000u64), 100).unwrap();
        assert!(buy.new_reserves.invariant().unwrap() >= k_before);

        let k_mid = buy.new_reserves.invariant().unwrap();
        let sell = sell_quote(&buy.new_reserves, buy.amount_out, 100).unwrap();
        assert!(sell.new_reserves.invariant().unwrap() >= k_mid);
    }

    #[test]
    fn round_trip_never_beats_the_input() {
        let reserves = launch_reserves();
        for raw in [1_000_000u64, 250_000_000, 1_000_000_000, 40_000_000_000] {
            let amount_in = U256::from(raw);
            let buy = buy_quote(&reserves, amount_in, 100).unwrap();
            let sell = sell_quote(&buy.new_reserves, buy.amount_out, 100).unwrap();
            assert!(
                sell.amount_out < amount_in,
                "round trip of {raw} returned {}",
                sell.amount_out
            );
        }
    }

    #[test]
    fn min_amount_out_applies_slippage_floor() {
        let quoted = U256::from(34_277_831_558_568u64);
        assert_eq!(
            min_amount_out(quoted, 50),
            U256::from(34_106_442_400_775u64)
        );
        // zero tolerance keeps the full quote
        assert_eq!(min_amount_out(quoted, 0), quoted);
        // full tolerance floors at zero
        assert_eq!(min_amount_out(quoted, 10_000), U256::zero());
    }

    #[test]
    fn empty_or_zero_inputs_are_rejected() {
        let empty = Reserves::new(U256::zero(), U256::from(5u8));
        assert_eq!(
            buy_quote(&empty, U256::from(1u8), 100).unwrap_err(),
            PricingError::EmptyReserves
        );

        let reserves = launch_reserves();
        assert_eq!(
            buy_quote(&reserves, U256::zero(), 100).unwrap_err(),
            PricingError::ZeroAmount
        );
        assert_eq!(
            sell_quote(&reserves, U256::from(1u8), 10_000).unwrap_err(),
            PricingError::FeeTooHigh(10_000)
        );
    }

    #[test]
    fn spot_price_and_impact_are_display_sane() {
        let reserves = launch_reserves();
        let spot = spot_price(&reserves);
        assert!(spot > 0.0);

        // a tiny trade has near-zero impact, a huge one has a large impact
        let small = buy_quote(&reserves, U256::from(1_000_000u64), 100).unwrap();
        let large = buy_quote(&reserves, U256::from(30_000_000_000u64), 100).unwrap();
        assert!(small.price_impact_pct < large.price_impact_pct);
        assert!(large.price_impact_pct > 30.0);
    }

    #[test]
    fn depth_counts_both_sides_of_the_pool() {
        let reserves = launch_reserves();
        assert_eq!(depth_in_quote(&reserves), U256::from(60_000_000_000u64));
    }
}
