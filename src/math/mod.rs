//! Interest-rate math.
//!
//! - [`morpho`]: Morpho Blue fixed-point math, share conversions and interest accrual
//! - [`rates`]: conversions of on-chain rate encodings to APY/APR

pub mod morpho;
pub mod rates;

pub use morpho::{mul_div_down, mul_div_up};

use alloy::primitives::U256;

/// Seconds in a 365 day year.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Lossy conversion of a [`U256`] to `f64`.
#[must_use]
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// Lossy conversion of a fixed-point [`U256`] with `decimals` decimals to `f64`.
#[must_use]
pub fn scaled_to_f64(value: U256, decimals: u8) -> f64 {
    u256_to_f64(value) / 10f64.powi(decimals as i32)
}
