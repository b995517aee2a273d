//! Normalized data types returned by every adapter.
//!
//! Raw balances and rates are [`U256`] values expressed in the smallest unit of the
//! token; they serialize as decimal strings so they survive JSON consumers that
//! cannot hold 256-bit integers. Field names serialize as `camelCase`.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::{Chain, Protocol};

/// Describes any ERC-20-like token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc20Metadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Erc20Metadata {
    pub fn new(
        address: Address,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Role of a token inside a position tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum TokenType {
    #[serde(rename = "protocol")]
    #[display("protocol")]
    Protocol,
    /// Claimable reward attached to a protocol position.
    #[serde(rename = "claimable")]
    #[display("claimable")]
    Reward,
    #[serde(rename = "underlying")]
    #[display("underlying")]
    Underlying,
    /// Underlying that has to be claimed, e.g. uncollected LP fees.
    #[serde(rename = "underlying-claimable")]
    #[display("underlying-claimable")]
    UnderlyingClaimable,
    /// Price leaf, denominated in a fiat currency.
    #[serde(rename = "fiat")]
    #[display("fiat")]
    Fiat,
}

/// Kind of exposure a product represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum PositionType {
    #[serde(rename = "supply")]
    #[display("supply")]
    Supply,
    #[serde(rename = "lend")]
    #[display("lend")]
    Lend,
    #[serde(rename = "borrow")]
    #[display("borrow")]
    Borrow,
    #[serde(rename = "stake")]
    #[display("stake")]
    Staked,
    #[serde(rename = "reward")]
    #[display("reward")]
    Reward,
    #[serde(rename = "fiat-prices")]
    #[display("fiat-prices")]
    FiatPrices,
}

/// Whether the protocol token behaves like a plain ERC-20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    StandardToken,
    /// NFTs, rebasing balances and other tokens that cannot be tracked by transfers alone.
    NonStandardToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetails {
    #[serde(rename = "type")]
    pub asset_type: AssetType,
}

/// Static description of an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDetails {
    #[serde(rename = "protocolId")]
    pub protocol: Protocol,
    pub name: String,
    pub description: String,
    pub site_url: String,
    pub icon_url: String,
    pub position_type: PositionType,
    #[serde(rename = "chainId")]
    pub chain: Chain,
    pub product_id: String,
    pub asset_details: AssetDetails,
}

/// Behaviour switches consulted by the controller and the decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    /// A transfer of one of the protocol tokens is enough to detect a position.
    pub enable_position_detection_by_protocol_token_transfer: bool,
    /// The adapter's protocol tokens take part in underlying resolution.
    pub include_in_unwrap: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            enable_position_detection_by_protocol_token_transfer: true,
            include_in_unwrap: true,
            version: None,
        }
    }
}

/// A yield-bearing, LP, staking or debt token minted by a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolToken {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    pub underlying_tokens: Vec<Erc20Metadata>,
    /// Protocol specific data such as market ids or reward tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProtocolToken {
    pub fn new(token: Erc20Metadata, underlying_tokens: Vec<Erc20Metadata>) -> Self {
        Self {
            token,
            underlying_tokens,
            extra: BTreeMap::new(),
        }
    }

    /// Attaches an extra protocol specific value.
    #[must_use]
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Reads back an extra value as a string.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.token.address
    }
}

/// A node of a position tree: a token balance and whatever it unwraps into.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Underlying {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde_as(as = "DisplayFromStr")]
    pub balance_raw: U256,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Underlying>,
}

impl Underlying {
    pub fn new(token: Erc20Metadata, balance_raw: U256, token_type: TokenType) -> Self {
        Self {
            token,
            balance_raw,
            token_type,
            tokens: vec![],
        }
    }

    /// Returns the fiat price leaf directly below this node, if any.
    pub fn fiat_leaf(&self) -> Option<&Underlying> {
        self.tokens.iter().find(|t| t.token_type == TokenType::Fiat)
    }
}

/// A user's balance of one protocol token at a block.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolPosition {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde_as(as = "DisplayFromStr")]
    pub balance_raw: U256,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Set for NFT based positions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Underlying>,
}

impl ProtocolPosition {
    pub fn new(token: Erc20Metadata, balance_raw: U256, tokens: Vec<Underlying>) -> Self {
        Self {
            token,
            balance_raw,
            token_type: TokenType::Protocol,
            token_id: None,
            tokens,
        }
    }
}

/// Protocol token reference carried by a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementToken {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

/// A deposit, withdrawal, borrow or repay translated into underlying deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementsByBlock {
    pub protocol_token: MovementToken,
    pub tokens: Vec<Underlying>,
    pub block_number: u64,
    pub transaction_hash: B256,
}

/// Amount of one underlying token received for one whole protocol token.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrappedTokenExchangeRate {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde_as(as = "DisplayFromStr")]
    pub underlying_rate_raw: U256,
}

impl UnwrappedTokenExchangeRate {
    pub fn new(token: Erc20Metadata, underlying_rate_raw: U256) -> Self {
        Self {
            token,
            token_type: TokenType::Underlying,
            underlying_rate_raw,
        }
    }
}

/// Conversion rate from one protocol token to its underlying tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapExchangeRate {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    /// Always one whole protocol token.
    pub base_rate: u8,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<UnwrappedTokenExchangeRate>,
}

impl UnwrapExchangeRate {
    pub fn new(token: Erc20Metadata, tokens: Vec<UnwrappedTokenExchangeRate>) -> Self {
        Self {
            token,
            base_rate: 1,
            token_type: TokenType::Protocol,
            tokens,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderlyingTokenTvl {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde_as(as = "DisplayFromStr")]
    pub total_supply_raw: U256,
}

/// Total value locked behind a protocol token.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTokenTvl {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde_as(as = "DisplayFromStr")]
    pub total_supply_raw: U256,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<UnderlyingTokenTvl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTokenApy {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    pub apy_decimal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTokenApr {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    pub apr_decimal: f64,
}

/// Input of [`Adapter::positions`](crate::Adapter::positions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPositionsInput {
    pub user_address: Address,
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Restricts the query to these protocol tokens.
    #[serde(default)]
    pub protocol_token_addresses: Option<Vec<Address>>,
    #[serde(default)]
    pub token_ids: Option<Vec<String>>,
}

impl GetPositionsInput {
    pub fn new(user_address: Address) -> Self {
        Self {
            user_address,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn at_block(mut self, block_number: u64) -> Self {
        self.block_number = Some(block_number);
        self
    }

    #[must_use]
    pub fn with_protocol_tokens(mut self, addresses: Vec<Address>) -> Self {
        self.protocol_token_addresses = Some(addresses);
        self
    }
}

/// Input of the movement queries (deposits, withdrawals, borrows, repays).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEventsInput {
    pub user_address: Address,
    pub protocol_token_address: Address,
    pub from_block: u64,
    pub to_block: u64,
    #[serde(default)]
    pub token_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTotalValueLockedInput {
    #[serde(default)]
    pub protocol_token_addresses: Option<Vec<Address>>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapInput {
    pub protocol_token_address: Address,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub token_id: Option<String>,
}

impl UnwrapInput {
    pub fn new(protocol_token_address: Address, block_number: Option<u64>) -> Self {
        Self {
            protocol_token_address,
            block_number,
            token_id: None,
        }
    }
}

/// Input of the APY and APR queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRateInput {
    pub protocol_token_address: Address,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRewardPositionsInput {
    pub user_address: Address,
    pub protocol_token_address: Address,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub token_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const AUSDC: Address = address!("0x98C23E9d8f34FEFb1B7BD6a91B7FF122F4e16F5c");

    fn usdc() -> Erc20Metadata {
        Erc20Metadata::new(USDC, "USD Coin", "USDC", 6)
    }

    #[test]
    fn test_position_json_shape() {
        let position = ProtocolPosition::new(
            Erc20Metadata::new(AUSDC, "Aave Ethereum USDC", "aEthUSDC", 6),
            U256::from(1_500_000u64),
            vec![Underlying::new(usdc(), U256::from(1_500_000u64), TokenType::Underlying)],
        );

        let value = serde_json::to_value(&position).unwrap();
        assert_eq!(value["balanceRaw"], "1500000");
        assert_eq!(value["type"], "protocol");
        assert_eq!(value["symbol"], "aEthUSDC");
        assert_eq!(value["tokens"][0]["type"], "underlying");
        assert_eq!(value["tokens"][0]["decimals"], 6);
        assert!(value.get("tokenId").is_none());

        let back: ProtocolPosition = serde_json::from_value(value).unwrap();
        assert_eq!(back, position);
    }

    #[test]
    fn test_balances_larger_than_u128_serialize_as_strings() {
        let underlying = Underlying::new(usdc(), U256::MAX, TokenType::Underlying);
        let json = serde_json::to_string(&underlying).unwrap();
        assert!(json.contains(&U256::MAX.to_string()));
        let back: Underlying = serde_json::from_str(&json).unwrap();
        assert_eq!(back.balance_raw, U256::MAX);
    }

    #[test]
    fn test_protocol_token_extra() {
        let token = ProtocolToken::new(usdc(), vec![]).with_extra("marketId", "0xabc");
        assert_eq!(token.extra_str("marketId"), Some("0xabc"));

        let json = serde_json::to_string(&token).unwrap();
        let back: ProtocolToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_token_type_names() {
        assert_eq!(serde_json::to_string(&TokenType::Reward).unwrap(), r#""claimable""#);
        assert_eq!(
            serde_json::to_string(&TokenType::UnderlyingClaimable).unwrap(),
            r#""underlying-claimable""#
        );
        assert_eq!(PositionType::Staked.to_string(), "stake");
    }

    #[test]
    fn test_unwrap_rate_base_rate() {
        let rate = UnwrapExchangeRate::new(usdc(), vec![]);
        assert_eq!(rate.base_rate, 1);
        assert_eq!(rate.token_type, TokenType::Protocol);
    }
}
