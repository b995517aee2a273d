//! Supported EVM chains.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An EVM chain adapters can be deployed on.
///
/// Serializes as its lowercase name and displays the same way.
///
/// # Example
///
/// ```
/// use defi_adapters::Chain;
///
/// let chain: Chain = "Arbitrum".parse().unwrap();
/// assert_eq!(chain.id(), 42161);
/// assert_eq!(chain.to_string(), "arbitrum");
/// assert_eq!(Chain::try_from(1u64).unwrap(), Chain::Ethereum);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[display("ethereum")]
    Ethereum,
    #[display("optimism")]
    Optimism,
    #[display("bsc")]
    Bsc,
    #[display("polygon")]
    Polygon,
    #[display("fantom")]
    Fantom,
    #[display("base")]
    Base,
    #[display("arbitrum")]
    Arbitrum,
    #[display("avalanche")]
    Avalanche,
    #[display("linea")]
    Linea,
}

impl Chain {
    /// Every supported chain, ordered by chain id.
    pub const ALL: [Chain; 9] = [
        Chain::Ethereum,
        Chain::Optimism,
        Chain::Bsc,
        Chain::Polygon,
        Chain::Fantom,
        Chain::Base,
        Chain::Arbitrum,
        Chain::Avalanche,
        Chain::Linea,
    ];

    /// EIP-155 chain id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Optimism => 10,
            Chain::Bsc => 56,
            Chain::Polygon => 137,
            Chain::Fantom => 250,
            Chain::Base => 8453,
            Chain::Arbitrum => 42161,
            Chain::Avalanche => 43114,
            Chain::Linea => 59144,
        }
    }

    /// Approximate number of blocks produced per day.
    ///
    /// Used to annualize per-block interest rates.
    #[must_use]
    pub const fn blocks_per_day(&self) -> u64 {
        match self {
            Chain::Ethereum => 7_200,
            Chain::Optimism | Chain::Base => 43_200,
            Chain::Bsc => 28_800,
            Chain::Polygon => 43_200,
            Chain::Fantom => 86_400,
            // arbitrum reports L1 block numbers to contracts
            Chain::Arbitrum => 7_200,
            Chain::Avalanche => 43_200,
            Chain::Linea => 43_200,
        }
    }

    /// Symbol of the native gas token.
    #[must_use]
    pub const fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Bsc => "BNB",
            Chain::Polygon => "POL",
            Chain::Fantom => "FTM",
            Chain::Avalanche => "AVAX",
            _ => "ETH",
        }
    }

    /// Name of the native gas token.
    #[must_use]
    pub const fn native_name(&self) -> &'static str {
        match self {
            Chain::Bsc => "BNB",
            Chain::Polygon => "Polygon Ecosystem Token",
            Chain::Fantom => "Fantom",
            Chain::Avalanche => "Avalanche",
            _ => "Ether",
        }
    }
}

impl TryFrom<u64> for Chain {
    type Error = Error;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Chain::ALL
            .into_iter()
            .find(|chain| chain.id() == id)
            .ok_or(Error::UnsupportedChain(id))
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<u64>() {
            return Chain::try_from(id);
        }
        let lower = s.to_ascii_lowercase();
        Chain::ALL
            .into_iter()
            .find(|chain| chain.to_string() == lower)
            .ok_or_else(|| Error::Config(format!("unknown chain: {s}")))
    }
}
