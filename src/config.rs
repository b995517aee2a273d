//! Runtime configuration: RPC endpoints per chain, metadata cache location and
//! resolution depth.
//!
//! A [`Config`] starts from public RPC endpoints, can be loaded from a JSON file and
//! overridden from the environment:
//!
//! ```json
//! {
//!   "rpc": { "ethereum": "https://eth.llamarpc.com" },
//!   "metadataDir": "./metadata",
//!   "resolveDepth": 5
//! }
//! ```
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `DEFI_RPC_<CHAIN>` | RPC url of a chain, e.g. `DEFI_RPC_ETHEREUM` |
//! | `DEFI_METADATA_DIR` | directory of the JSON metadata cache |
//! | `DEFI_RESOLVE_DEPTH` | maximum nesting followed when resolving underlyings |

use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    Chain,
    decorators::resolve::DEFAULT_MAX_DEPTH,
    error::{Error, Result},
};

const RPC_PREFIX: &str = "DEFI_RPC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// JSON-RPC endpoint per chain. Chains without one get no adapters.
    pub rpc: BTreeMap<Chain, Url>,
    /// Directory of the JSON metadata cache; disabled when unset.
    pub metadata_dir: Option<PathBuf>,
    pub resolve_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        let rpc = Chain::ALL
            .into_iter()
            .filter_map(|chain| Some((chain, Url::parse(public_rpc(chain)).ok()?)))
            .collect();
        Self {
            rpc,
            metadata_dir: None,
            resolve_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    /// Reads a JSON config; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&contents)?;
        log::debug!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env(std::env::vars())
    }

    /// Applies `DEFI_*` variables on top of `self`.
    pub fn merge_env(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        for (name, value) in vars {
            if let Some(chain) = name.strip_prefix(RPC_PREFIX) {
                let chain: Chain = chain.parse()?;
                let url = Url::parse(&value)
                    .map_err(|err| Error::Config(format!("{name}: invalid url {value}: {err}")))?;
                self.rpc.insert(chain, url);
            } else if name == "DEFI_METADATA_DIR" {
                self.metadata_dir = Some(PathBuf::from(value));
            } else if name == "DEFI_RESOLVE_DEPTH" {
                self.resolve_depth = value
                    .parse()
                    .map_err(|err| Error::Config(format!("{name}: {err}")))?;
            }
        }
        Ok(self)
    }

    /// Keeps only the given chains.
    #[must_use]
    pub fn with_chains(mut self, chains: &[Chain]) -> Self {
        self.rpc.retain(|chain, _| chains.contains(chain));
        self
    }
}

fn public_rpc(chain: Chain) -> &'static str {
    match chain {
        Chain::Ethereum => "https://eth.llamarpc.com",
        Chain::Optimism => "https://mainnet.optimism.io",
        Chain::Bsc => "https://bsc-dataseed.binance.org",
        Chain::Polygon => "https://polygon-rpc.com",
        Chain::Fantom => "https://rpc.ftm.tools",
        Chain::Base => "https://mainnet.base.org",
        Chain::Arbitrum => "https://arb1.arbitrum.io/rpc",
        Chain::Avalanche => "https://api.avax.network/ext/bc/C/rpc",
        Chain::Linea => "https://rpc.linea.build",
    }
}
