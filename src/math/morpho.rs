//! Morpho Blue math.
//!
//! Mirrors `MathLib` and `SharesMathLib` from
//! <https://github.com/morpho-org/morpho-blue/tree/main/src/libraries> so balances
//! computed off-chain match what the contracts would return.

use alloy::primitives::U256;

use super::{SECONDS_PER_YEAR, u256_to_f64};
use crate::error::{Error, Result};

/// 1e18.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

// https://github.com/morpho-org/morpho-blue/blob/48b2a62d9d911a27f886fb7909ad57e29f7dacc9/src/libraries/SharesMathLib.sol#L20
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Snapshot of a Morpho Blue market's accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketState {
    pub total_supply_assets: u128,
    pub total_supply_shares: u128,
    pub total_borrow_assets: u128,
    pub total_borrow_shares: u128,
    pub last_update: u128,
    pub fee: u128,
}

impl MarketState {
    /// Borrowed share of the supplied assets, in `[0, 1]`.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.total_supply_assets == 0 {
            return 0.0;
        }
        self.total_borrow_assets as f64 / self.total_supply_assets as f64
    }

    /// Fee as a fraction.
    #[must_use]
    pub fn fee_fraction(&self) -> f64 {
        self.fee as f64 / 1e18
    }
}

fn overflow(op: &str) -> Error {
    Error::Math(format!("overflow in {op}"))
}

/// `x * y / d` rounded down.
pub fn mul_div_down(x: U256, y: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(Error::Math("division by zero".into()));
    }
    Ok(x.checked_mul(y).ok_or_else(|| overflow("mul_div_down"))? / d)
}

/// `x * y / d` rounded up.
pub fn mul_div_up(x: U256, y: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(Error::Math("division by zero".into()));
    }
    let product = x.checked_mul(y).ok_or_else(|| overflow("mul_div_up"))?;
    let numerator = product
        .checked_add(d - U256::from(1))
        .ok_or_else(|| overflow("mul_div_up"))?;
    Ok(numerator / d)
}

/// `x * y / WAD` rounded down.
pub fn w_mul_down(x: U256, y: U256) -> Result<U256> {
    mul_div_down(x, y, WAD)
}

/// `x * WAD / y` rounded down.
pub fn w_div_down(x: U256, y: U256) -> Result<U256> {
    mul_div_down(x, WAD, y)
}

/// Third order Taylor expansion of `e^(x * n) - 1`, used to compound a per-second rate.
pub fn w_taylor_compounded(x: U256, n: U256) -> Result<U256> {
    let first_term = x.checked_mul(n).ok_or_else(|| overflow("w_taylor_compounded"))?;
    let second_term = mul_div_down(first_term, first_term, WAD * U256::from(2))?;
    let third_term = mul_div_down(second_term, first_term, WAD * U256::from(3))?;
    Ok(first_term + second_term + third_term)
}

pub fn to_shares_down(assets: U256, total_assets: U256, total_shares: U256) -> Result<U256> {
    mul_div_down(assets, total_shares + VIRTUAL_SHARES, total_assets + VIRTUAL_ASSETS)
}

pub fn to_shares_up(assets: U256, total_assets: U256, total_shares: U256) -> Result<U256> {
    mul_div_up(assets, total_shares + VIRTUAL_SHARES, total_assets + VIRTUAL_ASSETS)
}

pub fn to_assets_down(shares: U256, total_assets: U256, total_shares: U256) -> Result<U256> {
    mul_div_down(shares, total_assets + VIRTUAL_ASSETS, total_shares + VIRTUAL_SHARES)
}

pub fn to_assets_up(shares: U256, total_assets: U256, total_shares: U256) -> Result<U256> {
    mul_div_up(shares, total_assets + VIRTUAL_ASSETS, total_shares + VIRTUAL_SHARES)
}

fn to_u128(value: U256) -> Result<u128> {
    u128::try_from(value).map_err(|_| overflow("u128 conversion"))
}

/// Returns the market as it would look after accruing interest up to `timestamp`.
///
/// `borrow_rate` is the IRM's per-second rate, scaled by [`WAD`].
pub fn accrue_interest(
    market: &MarketState,
    borrow_rate: U256,
    timestamp: u64,
) -> Result<MarketState> {
    let elapsed = (timestamp as u128).saturating_sub(market.last_update);
    if elapsed == 0 || market.total_borrow_assets == 0 {
        return Ok(*market);
    }

    let total_borrow_assets = U256::from(market.total_borrow_assets);
    let interest = w_mul_down(
        total_borrow_assets,
        w_taylor_compounded(borrow_rate, U256::from(elapsed))?,
    )?;

    let mut accrued = *market;
    accrued.total_borrow_assets = to_u128(total_borrow_assets + interest)?;
    accrued.total_supply_assets = to_u128(U256::from(market.total_supply_assets) + interest)?;

    if market.fee != 0 {
        let fee_amount = w_mul_down(interest, U256::from(market.fee))?;
        // fee shares are minted against the supply before the fee is added
        let fee_shares = to_shares_down(
            fee_amount,
            U256::from(accrued.total_supply_assets) - fee_amount,
            U256::from(market.total_supply_shares),
        )?;
        accrued.total_supply_shares = to_u128(U256::from(market.total_supply_shares) + fee_shares)?;
    }
    accrued.last_update = timestamp as u128;

    Ok(accrued)
}

/// Continuously compounded borrow APY for a per-second rate scaled by [`WAD`].
#[must_use]
pub fn borrow_apy(rate_per_second: U256) -> f64 {
    let rate = u256_to_f64(rate_per_second) / 1e18;
    (rate * SECONDS_PER_YEAR as f64).exp() - 1.0
}

/// Supply APY given the borrow APY and the market's utilization and fee.
#[must_use]
pub fn supply_apy(borrow_apy: f64, utilization: f64, fee: f64) -> f64 {
    borrow_apy * utilization * (1.0 - fee)
}
