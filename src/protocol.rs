//! Protocol identifiers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A DeFi protocol with at least one adapter in this crate.
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
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    #[display("aave-v3")]
    AaveV3,
    #[display("compound-v2")]
    CompoundV2,
    #[display("morpho-blue")]
    MorphoBlue,
    #[display("metamorpho")]
    #[serde(rename = "metamorpho")]
    MetaMorpho,
    #[display("lido")]
    Lido,
    #[display("uniswap-v3")]
    UniswapV3,
    #[display("prices")]
    Prices,
}

impl Protocol {
    pub const ALL: [Protocol; 7] = [
        Protocol::AaveV3,
        Protocol::CompoundV2,
        Protocol::MorphoBlue,
        Protocol::MetaMorpho,
        Protocol::Lido,
        Protocol::UniswapV3,
        Protocol::Prices,
    ];
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|protocol| protocol.to_string() == s)
            .ok_or_else(|| Error::Config(format!("unknown protocol: {s}")))
    }
}
