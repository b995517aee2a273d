//! EVM provider plumbing shared by the adapters.
//!
//! # Overview
//!
//! Everything here is built on Alloy:
//! - [`Provider`]: the bound every adapter's provider satisfies
//! - [`connect`] / [`connect_dyn`]: HTTP providers for a JSON-RPC url
//! - [`IERC20`] / [`IERC4626`]: the token interfaces most adapters need
//! - [`to_wei`] / [`from_wei`]: conversions between raw amounts and [`Decimal`]
//!
//! # Examples
//!
//! ## Read token metadata
//!
//! ```no_run
//! use defi_adapters::{Chain, address, evm};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = evm::connect_dyn("https://eth.llamarpc.com").await?;
//! let usdc = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
//! let metadata = evm::erc20_metadata(&provider, Chain::Ethereum, usdc).await?;
//! println!("{} ({} decimals)", metadata.symbol, metadata.decimals);
//! # Ok(())
//! # }
//! ```
//!
//! ## Wei Conversions
//!
//! ```
//! use defi_adapters::evm::{to_wei, from_wei};
//! use defi_adapters::{U256, dec};
//!
//! let wei = to_wei(dec!(1.5), 18);
//! assert_eq!(wei, U256::from(1_500_000_000_000_000_000u128));
//! assert_eq!(from_wei(wei, 18), dec!(1.5));
//! ```

use alloy::{
    eips::BlockId,
    network::Ethereum,
    primitives::{Address, U256, address},
    providers::{Failure, ProviderBuilder},
    sol,
    transports::TransportError,
};
use rust_decimal::Decimal;

use crate::{Chain, error::Result, types::Erc20Metadata};

/// Sentinel used by many protocols to represent the native gas token.
pub const NATIVE_TOKEN_SENTINEL: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Provider bound used throughout the crate.
///
/// Implemented by every Alloy provider that can be cloned and shared across tasks.
pub trait Provider: alloy::providers::Provider<Ethereum> + Send + Sync + Clone + 'static {}

/// Dynamic provider type.
///
/// The controller stores one of these per chain so adapters of different
/// protocols share a single connection.
pub type DynProvider = alloy::providers::DynProvider<Ethereum>;

impl<T> Provider for T where
    T: alloy::providers::Provider<Ethereum> + Send + Sync + Clone + 'static
{
}

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC4626 {
        function asset() external view returns (address);
        function totalAssets() external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);

        event Deposit(
            address indexed sender,
            address indexed owner,
            uint256 assets,
            uint256 shares
        );
        event Withdraw(
            address indexed sender,
            address indexed receiver,
            address indexed owner,
            uint256 assets,
            uint256 shares
        );
    }
}

/// Creates an HTTP provider for the given JSON-RPC url.
///
/// # Example
///
/// ```no_run
/// use defi_adapters::evm;
///
/// # async fn example() -> anyhow::Result<()> {
/// let provider = evm::connect("https://eth.llamarpc.com").await?;
/// # Ok(())
/// # }
/// ```
#[inline(always)]
pub async fn connect(url: &str) -> Result<impl Provider, TransportError> {
    let p = ProviderBuilder::new().connect(url).await?;
    Ok(p)
}

/// Same as [`connect`] but erases the provider type.
pub async fn connect_dyn(url: &str) -> Result<DynProvider, TransportError> {
    Ok(DynProvider::new(connect(url).await?))
}

/// Block to run a view call against: `latest` when unset.
#[must_use]
#[inline]
pub fn block_id(block_number: Option<u64>) -> BlockId {
    block_number.map(BlockId::number).unwrap_or_else(BlockId::latest)
}

/// Timestamp of a block, `latest` when unset.
pub async fn block_timestamp<P: Provider>(provider: &P, block_number: Option<u64>) -> Result<u64> {
    let block = provider.get_block(block_id(block_number)).await?.ok_or_else(|| {
        let block = block_number.map_or_else(|| "latest".to_string(), |n| n.to_string());
        crate::Error::BlockNotFound(block)
    })?;
    Ok(block.header.timestamp)
}

/// Metadata of the chain's native gas token.
#[must_use]
pub fn native_token(chain: Chain) -> Erc20Metadata {
    Erc20Metadata::new(Address::ZERO, chain.native_name(), chain.native_symbol(), 18)
}

/// Reads an ERC-20's name, symbol and decimals in a single multicall.
///
/// The zero address and [`NATIVE_TOKEN_SENTINEL`] resolve to the native token.
/// Tokens that return `bytes32` for their name and symbol, such as MKR, are decoded
/// too.
pub async fn erc20_metadata<P: Provider>(
    provider: &P,
    chain: Chain,
    address: Address,
) -> Result<Erc20Metadata> {
    if address.is_zero() || address == NATIVE_TOKEN_SENTINEL {
        return Ok(Erc20Metadata {
            address,
            ..native_token(chain)
        });
    }

    let token = IERC20::new(address, provider.clone());
    let (name, symbol, decimals) = provider
        .multicall()
        .add(token.name())
        .add(token.symbol())
        .add(token.decimals())
        .try_aggregate(false)
        .await?;

    let failed = |failure| crate::Error::TokenMetadata { address, failure };
    Ok(Erc20Metadata {
        address,
        name: text_or_bytes32(name).map_err(failed)?,
        symbol: text_or_bytes32(symbol).map_err(failed)?,
        decimals: decimals.map_err(failed)?,
    })
}

fn text_or_bytes32(
    result: std::result::Result<String, Failure>,
) -> std::result::Result<String, Failure> {
    result.or_else(|failure| bytes32_string(&failure.return_data).ok_or(failure))
}

/// Text of a `bytes32` return value, without its trailing NUL padding.
fn bytes32_string(data: &[u8]) -> Option<String> {
    let word = data.get(..32)?;
    let end = word.iter().rposition(|byte| *byte != 0).map_or(0, |last| last + 1);
    Some(String::from_utf8_lossy(&word[..end]).into_owned())
}

/// `10^decimals` as a [`U256`].
#[must_use]
#[inline]
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10).pow(U256::from(decimals))
}

/// Converts a decimal amount to its raw representation.
///
/// # Panics
///
/// When `size` is negative.
///
/// # Example
///
/// ```
/// use defi_adapters::evm::to_wei;
/// use defi_adapters::{U256, dec};
///
/// // 1.5 ETH in wei
/// let wei = to_wei(dec!(1.5), 18);
/// assert_eq!(wei, U256::from(1_500_000_000_000_000_000u128));
/// ```
#[must_use]
#[inline]
pub fn to_wei(mut size: Decimal, decimals: u32) -> U256 {
    size.rescale(decimals);
    U256::from(size.mantissa())
}

/// Converts a raw amount to a decimal.
///
/// # Panics
///
/// When the raw amount does not fit an `i128`; see [`try_from_wei`].
#[must_use]
#[inline]
pub fn from_wei(wei: U256, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(wei.to::<i128>(), decimals)
}

/// Largest mantissa a [`Decimal`] holds.
const MAX_MANTISSA: U256 = U256::from_limbs([u64::MAX, u32::MAX as u64, 0, 0]);

/// Fallible version of [`from_wei`].
///
/// Amounts too large for `decimals` digits of precision lose their lowest digits,
/// down to an integer; only integers above [`Decimal::MAX`] are an error.
pub fn try_from_wei(wei: U256, decimals: u32) -> Result<Decimal> {
    let overflow = || crate::Error::Math(format!("{wei} does not fit a decimal"));
    let (mut mantissa, mut scale) = if decimals > 28 {
        (wei / U256::from(10).pow(U256::from(decimals - 28)), 28)
    } else {
        (wei, decimals)
    };
    while mantissa > MAX_MANTISSA && scale > 0 {
        mantissa /= U256::from(10);
        scale -= 1;
    }
    let mantissa = i128::try_from(mantissa).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|_| overflow())
}
