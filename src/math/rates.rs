//! Conversions between on-chain rate encodings and APY/APR.

use alloy::primitives::U256;

use super::{SECONDS_PER_YEAR, u256_to_f64};

/// 1e27, Aave's "ray" fixed-point unit.
pub const RAY: f64 = 1e27;

/// Converts an Aave ray-denominated annual rate into an APY, compounding every second.
#[must_use]
pub fn ray_rate_to_apy(rate_ray: U256) -> f64 {
    let apr = u256_to_f64(rate_ray) / RAY;
    apr_to_apy(apr, SECONDS_PER_YEAR)
}

/// Converts an Aave ray-denominated annual rate into an APR.
#[must_use]
pub fn ray_rate_to_apr(rate_ray: U256) -> f64 {
    u256_to_f64(rate_ray) / RAY
}

/// Converts a 1e18-scaled per-block rate into an APY, compounding daily.
#[must_use]
pub fn per_block_rate_to_apy(rate_per_block: U256, blocks_per_day: u64) -> f64 {
    let daily = u256_to_f64(rate_per_block) / 1e18 * blocks_per_day as f64;
    (1.0 + daily).powi(365) - 1.0
}

/// Converts a 1e18-scaled per-block rate into an APR.
#[must_use]
pub fn per_block_rate_to_apr(rate_per_block: U256, blocks_per_day: u64) -> f64 {
    u256_to_f64(rate_per_block) / 1e18 * blocks_per_day as f64 * 365.0
}

/// Compounds an APR `periods` times per year.
#[must_use]
pub fn apr_to_apy(apr: f64, periods: u64) -> f64 {
    if periods == 0 {
        return apr;
    }
    let n = periods as f64;
    (1.0 + apr / n).powf(n) - 1.0
}
