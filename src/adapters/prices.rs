//! USD prices from Chainlink aggregators.
//!
//! Each priced token is listed as a protocol token whose single underlying is the
//! [`usd`] pseudo-token, so `unwrap` of a token returns its price and underlying
//! resolution can attach it as a [`TokenType::Fiat`] leaf. Prices are scaled to
//! 18 decimals whatever the feed's own precision.

use std::sync::Arc;

use alloy::{
    primitives::{Address, I256, U256, address},
    sol,
};
use async_trait::async_trait;

use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext, helpers},
    error::{Error, Result},
    evm::{DynProvider, block_id, native_token, pow10},
    types::*,
};

sol! {
    #[sol(rpc)]
    interface IAggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
    }
}

pub const PRODUCT_ID: &str = "usd";

/// Address of the USD pseudo-token.
pub const USD: Address = address!("0x0000000000000000000000000000000000000348");

const PRICE_DECIMALS: u8 = 18;

/// The fiat currency prices are quoted in.
pub fn usd() -> Erc20Metadata {
    Erc20Metadata::new(USD, "USD", "USD", PRICE_DECIMALS)
}

/// A token and the aggregator quoting it in USD.
#[derive(Debug, Clone, Copy)]
pub struct Feed {
    pub token: Address,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    pub aggregator: Address,
}

const fn feed(
    token: Address,
    name: &'static str,
    symbol: &'static str,
    decimals: u8,
    aggregator: Address,
) -> Feed {
    Feed {
        token,
        name,
        symbol,
        decimals,
        aggregator,
    }
}

const ETH_USD: Address = address!("0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419");

const ETHEREUM_FEEDS: [Feed; 6] = [
    feed(
        address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
        "Wrapped Ether",
        "WETH",
        18,
        ETH_USD,
    ),
    feed(
        address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        "USD Coin",
        "USDC",
        6,
        address!("0x8fFfFfd4AfB6115b954Bd326cbe7B4BA576818f6"),
    ),
    feed(
        address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
        "Tether USD",
        "USDT",
        6,
        address!("0x3E7d1eAB13ad0104d2750B8863b489D65364e32D"),
    ),
    feed(
        address!("0x6B175474E89094C44Da98b954EedeAC495271d0F"),
        "Dai Stablecoin",
        "DAI",
        18,
        address!("0xAed0c38402a5d19df6E4c03F4E2DceD6e29c1ee9"),
    ),
    feed(
        address!("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
        "Wrapped BTC",
        "WBTC",
        8,
        address!("0xF4030086522a5bEEa4988F8cA5B36dbC97BeE88c"),
    ),
    feed(
        address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
        "Liquid staked Ether 2.0",
        "stETH",
        18,
        address!("0xCfE54B5cD566aB89272946F602D76Ea879CAb4a8"),
    ),
];

const BASE_ETH_USD: Address = address!("0x71041dddad3595F9CEd3DcCFBe3D1F4b0a16Bb70");

const BASE_FEEDS: [Feed; 2] = [
    feed(
        address!("0x4200000000000000000000000000000000000006"),
        "Wrapped Ether",
        "WETH",
        18,
        BASE_ETH_USD,
    ),
    feed(
        address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        "USD Coin",
        "USDC",
        6,
        address!("0x7e860098F58bBFC8648a4311b374B1D669a2bc6B"),
    ),
];

const ARBITRUM_ETH_USD: Address = address!("0x639Fe6ab55C921f74e7fac1ee960C0B6293ba612");

const ARBITRUM_FEEDS: [Feed; 2] = [
    feed(
        address!("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
        "Wrapped Ether",
        "WETH",
        18,
        ARBITRUM_ETH_USD,
    ),
    feed(
        address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        "USD Coin",
        "USDC",
        6,
        address!("0x50834F3163758fcC1Df9973b6e91f0F0F0434aD3"),
    ),
];

/// Feeds of a chain and the aggregator pricing its native token.
pub fn feeds(chain: Chain) -> Option<(&'static [Feed], Address)> {
    match chain {
        Chain::Ethereum => Some((&ETHEREUM_FEEDS, ETH_USD)),
        Chain::Base => Some((&BASE_FEEDS, BASE_ETH_USD)),
        Chain::Arbitrum => Some((&ARBITRUM_FEEDS, ARBITRUM_ETH_USD)),
        _ => None,
    }
}

const LISTING: Listing = Listing {
    name: "Prices",
    description: "USD prices of underlying tokens from Chainlink feeds",
    site_url: "https://data.chain.link",
    icon_url: "https://chain.link/images/chainlink-logo.svg",
    position_type: PositionType::FiatPrices,
    asset_type: AssetType::NonStandardToken,
};

/// Factory of the `usd` product.
pub fn usd_factory(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    let (feeds, native) = feeds(context.chain)?;
    let mut all = feeds.to_vec();
    let chain = context.chain;
    let native_address = native_token(chain).address;
    all.push(feed(native_address, chain.native_name(), chain.native_symbol(), 18, native));
    Some(Arc::new(PricesAdapter::new(context, all)))
}

pub struct PricesAdapter {
    chain: Chain,
    provider: DynProvider,
    feeds: Vec<Feed>,
}

impl PricesAdapter {
    pub fn new(context: &AdapterContext, feeds: Vec<Feed>) -> Self {
        Self {
            chain: context.chain,
            provider: context.provider.clone(),
            feeds,
        }
    }

    fn feed(&self, token: Address) -> Result<&Feed> {
        self.feeds
            .iter()
            .find(|feed| feed.token == token)
            .ok_or(Error::ProtocolTokenNotFound {
                chain: self.chain,
                address: token,
            })
    }

    /// USD price of one whole token, with [`PRICE_DECIMALS`] decimals.
    pub async fn price(&self, token: Address, block_number: Option<u64>) -> Result<U256> {
        let feed = self.feed(token)?;
        let aggregator = IAggregatorV3::new(feed.aggregator, self.provider.clone());
        let block = block_id(block_number);
        let decimals = aggregator.decimals().block(block).call().await?;
        let round = aggregator.latestRoundData().block(block).call().await?;
        log::trace!("{} round {} answer {}", feed.symbol, round.roundId, round.answer);
        scale_answer(round.answer, decimals)
    }
}

/// Rescales a feed answer to [`PRICE_DECIMALS`].
fn scale_answer(answer: I256, decimals: u8) -> Result<U256> {
    if answer.is_negative() {
        return Err(Error::Math(format!("negative price {answer}")));
    }
    let answer = answer.into_raw();
    if decimals <= PRICE_DECIMALS {
        answer
            .checked_mul(pow10(PRICE_DECIMALS - decimals))
            .ok_or_else(|| Error::Math(format!("price {answer} overflows")))
    } else {
        Ok(answer / pow10(decimals - PRICE_DECIMALS))
    }
}

#[async_trait]
impl Adapter for PricesAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::Prices
    }

    fn product_id(&self) -> &'static str {
        PRODUCT_ID
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            enable_position_detection_by_protocol_token_transfer: false,
            include_in_unwrap: false,
            version: None,
        }
    }

    fn protocol_details(&self) -> ProtocolDetails {
        LISTING.details(self.chain, Protocol::Prices, PRODUCT_ID)
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        Ok(self
            .feeds
            .iter()
            .map(|feed| {
                ProtocolToken::new(
                    Erc20Metadata::new(feed.token, feed.name, feed.symbol, feed.decimals),
                    vec![usd()],
                )
                .with_extra("aggregator", feed.aggregator.to_string())
            })
            .collect())
    }

    async fn positions(&self, _input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        Err(self.not_implemented("positions"))
    }

    async fn withdrawals(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Err(self.not_implemented("withdrawals"))
    }

    async fn deposits(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Err(self.not_implemented("deposits"))
    }

    async fn total_value_locked(
        &self,
        _input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        Err(self.not_implemented("total_value_locked"))
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let price = self.price(token.address(), input.block_number).await?;
        Ok(UnwrapExchangeRate::new(
            token.token,
            vec![UnwrappedTokenExchangeRate {
                token_type: TokenType::Fiat,
                ..UnwrappedTokenExchangeRate::new(usd(), price)
            }],
        ))
    }
}

#[cfg(test)]
mod tests {
    use alloy::transports::mock::Asserter;

    use super::*;
    use crate::adapters::testing::{mocked, push_call};

    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const UNKNOWN: Address = address!("0x00000000219ab540356cBB839Cbe05303d7705Fa");

    fn adapter(asserter: &Asserter) -> Arc<dyn Adapter> {
        usd_factory(&AdapterContext::new(Chain::Ethereum, mocked(asserter))).unwrap()
    }

    /// `latestRoundData` output.
    fn round(answer: i64) -> (u128, I256, U256, U256, u128) {
        (1, I256::try_from(answer).unwrap(), U256::ZERO, U256::ZERO, 1)
    }

    #[test]
    fn test_scale_answer() {
        let answer = I256::try_from(100_012_345i64).unwrap();
        assert_eq!(scale_answer(answer, 8).unwrap(), U256::from(1_000_123_450_000_000_000u64));
        assert_eq!(
            scale_answer(I256::try_from(2_000_000_000_000_000_000_000i128).unwrap(), 21).unwrap(),
            U256::from(2_000_000_000_000_000_000u64)
        );
        assert!(scale_answer(I256::MINUS_ONE, 8).is_err());
    }

    #[tokio::test]
    async fn test_unwrap_returns_fiat_price() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter);
        push_call(&asserter, U256::from(8u8));
        push_call(&asserter, round(99_980_000));

        let rate = adapter.unwrap(&UnwrapInput::new(USDC, Some(19_000_000))).await.unwrap();
        assert_eq!(rate.token.symbol, "USDC");
        assert_eq!(rate.tokens[0].token, usd());
        assert_eq!(rate.tokens[0].token_type, TokenType::Fiat);
        assert_eq!(rate.tokens[0].underlying_rate_raw, U256::from(999_800_000_000_000_000u64));
    }

    #[tokio::test]
    async fn test_native_token_is_priced() {
        let asserter = Asserter::new();
        let tokens = adapter(&asserter).protocol_tokens().await.unwrap();
        assert!(
            tokens
                .iter()
                .any(|token| token.address() == Address::ZERO && token.token.symbol == "ETH")
        );
        assert!(tokens.iter().all(|token| token.underlying_tokens == vec![usd()]));
    }

    #[tokio::test]
    async fn test_unknown_token_has_no_feed() {
        let asserter = Asserter::new();
        let err = adapter(&asserter)
            .unwrap(&UnwrapInput::new(UNKNOWN, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolTokenNotFound { .. }));
        assert!(usd_factory(&AdapterContext::new(Chain::Bsc, mocked(&asserter))).is_none());
    }
}
