//! Error types shared by every adapter.

use alloy::{primitives::Address, transports::TransportError};

use crate::{Chain, Protocol};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by adapters, the controller and the decorators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two adapters were registered under the same key.
    #[error("duplicate adapter {protocol}/{product} on {chain}")]
    DuplicateAdapter {
        chain: Chain,
        protocol: Protocol,
        product: String,
    },

    /// Two adapters claim the same protocol token.
    #[error("protocol token {address} on {chain} claimed by {existing} and {duplicate}")]
    DuplicateProtocolToken {
        chain: Chain,
        address: Address,
        existing: String,
        duplicate: String,
    },

    #[error("no adapter for {protocol}/{product} on {chain}")]
    AdapterNotFound {
        chain: Chain,
        protocol: Protocol,
        product: String,
    },

    #[error("protocol token {address} not found on {chain}")]
    ProtocolTokenNotFound { chain: Chain, address: Address },

    /// The adapter does not support the requested operation.
    #[error("{method} is not implemented by {protocol}/{product}")]
    NotImplemented {
        method: &'static str,
        protocol: Protocol,
        product: &'static str,
    },

    /// A token tree ended without a fiat price leaf.
    #[error("token {0} has no fiat price leaf")]
    MissingFiatLeaf(Address),

    #[error("chain id {0} is not supported")]
    UnsupportedChain(u64),

    #[error("no provider configured for {0}")]
    MissingProvider(Chain),

    #[error("block {0} not found")]
    BlockNotFound(String),

    #[error("rpc: {0}")]
    Rpc(#[from] TransportError),

    #[error("contract call: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("multicall: {0}")]
    Multicall(#[from] alloy::providers::MulticallError),

    /// A token's `name`, `symbol` or `decimals` call failed or returned garbage.
    #[error("token {address} metadata: {failure}")]
    TokenMetadata {
        address: Address,
        #[source]
        failure: alloy::providers::Failure,
    },

    #[error("abi decoding: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// The input lacks something the operation needs, such as an NFT token id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config: {0}")]
    Config(String),

    /// Arithmetic overflow or an out-of-range conversion.
    #[error("math: {0}")]
    Math(String),
}

impl Error {
    /// Returns `true` for [`Error::NotImplemented`].
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented { .. })
    }
}
