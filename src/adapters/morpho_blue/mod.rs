//! Morpho Blue isolated lending markets.
//!
//! Markets are identified by a 32-byte id rather than a token, so each market is
//! exposed as a protocol token whose address is the last 20 bytes of the id. The
//! full market params travel in the token's `extra` map; the adapters never have
//! to call `idToMarketParams` once the metadata is cached.
//!
//! Balances are read from `position(id, user)` and converted from shares with the
//! market accrued up to the queried block, which is what the contract itself does
//! on the next interaction.

pub mod contracts;

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256, U256, address, b256},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};

use self::contracts::{IIrm, IMorpho, Market, MarketParams};
use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext, helpers},
    decorators::cache::ProtocolTokenCache,
    error::{Error, Result},
    evm::{DynProvider, Provider, block_id, block_timestamp, erc20_metadata},
    math::{
        SECONDS_PER_YEAR,
        morpho::{self, MarketState, accrue_interest, to_assets_down, to_assets_up},
        u256_to_f64,
    },
    types::*,
};

/// Morpho Blue singleton, same address on every deployment.
pub const MORPHO: Address = address!("0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb");

const ETHEREUM_MARKETS: [B256; 3] = [
    // wstETH/WETH 94.5%
    b256!("0xc54d7acf14de29e0e5527cabd7a576506870346a78a11a6762e2cca66322ec41"),
    // WBTC/USDC 86%
    b256!("0x3a85e619751152991742810df6ec69ce473daef99e28a64ab2340d7b7ccfee49"),
    // wstETH/USDC 86%
    b256!("0xb323495f7e4148be5643a4ea4a8221eef163e4bccfdedc2a6f4696baacbc86cc"),
];

const BASE_MARKETS: [B256; 1] = [
    // cbETH/USDC 86%
    b256!("0xdba352d93a64b17c71104cbddc6aef85cd432322a1446b5b65163cbbc615cd0c"),
];

/// Markets listed on a chain.
pub fn markets(chain: Chain) -> &'static [B256] {
    match chain {
        Chain::Ethereum => &ETHEREUM_MARKETS,
        Chain::Base => &BASE_MARKETS,
        _ => &[],
    }
}

/// Pool's APY
#[derive(Debug, Clone)]
pub struct PoolApy {
    pub params: MarketParams,
    pub market: Market,
    /// Per-second borrow rate from the IRM, scaled by 1e18.
    pub rate: U256,
    pub borrow: f64,
    pub supply: f64,
}

impl PoolApy {
    /// Borrow APR, without compounding.
    pub fn borrow_apr(&self) -> f64 {
        u256_to_f64(self.rate) / 1e18 * SECONDS_PER_YEAR as f64
    }

    pub fn supply_apr(&self) -> f64 {
        let state = MarketState::from(&self.market);
        self.borrow_apr() * state.utilization() * (1.0 - state.fee_fraction())
    }
}

/// Rates of a market as the IRM reports them at `block_number`.
pub async fn pool_apy<P: Provider>(
    provider: &P,
    params: MarketParams,
    market: Market,
    block_number: Option<u64>,
) -> Result<PoolApy> {
    let rate = IIrm::new(params.irm, provider.clone())
        .borrowRateView(params.clone(), market.clone())
        .block(block_id(block_number))
        .call()
        .await?;

    let state = MarketState::from(&market);
    let borrow = morpho::borrow_apy(rate);
    let supply = morpho::supply_apy(borrow, state.utilization(), state.fee_fraction());
    Ok(PoolApy {
        params,
        market,
        rate,
        borrow,
        supply,
    })
}

/// Which side of a market a product tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Supply,
    Borrow,
}

impl Side {
    fn shares(&self, position: &contracts::Position) -> U256 {
        match self {
            Side::Supply => position.supplyShares,
            Side::Borrow => U256::from(position.borrowShares),
        }
    }

    /// Assets owed to (supply) or by (borrow) the holder of `shares`.
    ///
    /// Supply rounds down and debt rounds up, like the contract.
    pub fn to_assets(&self, shares: U256, market: &MarketState) -> Result<U256> {
        match self {
            Side::Supply => to_assets_down(
                shares,
                U256::from(market.total_supply_assets),
                U256::from(market.total_supply_shares),
            ),
            Side::Borrow => to_assets_up(
                shares,
                U256::from(market.total_borrow_assets),
                U256::from(market.total_borrow_shares),
            ),
        }
    }

    fn total_assets(&self, market: &Market) -> U256 {
        match self {
            Side::Supply => U256::from(market.totalSupplyAssets),
            Side::Borrow => U256::from(market.totalBorrowAssets),
        }
    }
}

const SUPPLY_LISTING: Listing = Listing {
    name: "Morpho Blue",
    description: "Morpho Blue market supply positions",
    site_url: "https://morpho.org",
    icon_url: "https://cdn.morpho.org/assets/logos/morpho.svg",
    position_type: PositionType::Supply,
    asset_type: AssetType::NonStandardToken,
};

const BORROW_LISTING: Listing = Listing {
    name: "Morpho Blue",
    description: "Morpho Blue market borrow positions",
    site_url: "https://morpho.org",
    icon_url: "https://cdn.morpho.org/assets/logos/morpho.svg",
    position_type: PositionType::Borrow,
    asset_type: AssetType::NonStandardToken,
};

/// Factory of the `market-supply` product.
pub fn market_supply(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    MorphoBlueAdapter::new(context, Side::Supply).map(|adapter| Arc::new(adapter) as _)
}

/// Factory of the `market-borrow` product.
pub fn market_borrow(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    MorphoBlueAdapter::new(context, Side::Borrow).map(|adapter| Arc::new(adapter) as _)
}

/// Protocol token address standing in for a market id.
pub fn market_token_address(id: B256) -> Address {
    Address::from_word(id)
}

fn extra<T: std::str::FromStr>(token: &ProtocolToken, key: &str) -> Result<T> {
    token
        .extra_str(key)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| Error::Config(format!("{} metadata has no valid {key}", token.token.symbol)))
}

/// Market id and params stored in a market's protocol token.
pub fn market_of(token: &ProtocolToken) -> Result<(B256, MarketParams)> {
    let params = MarketParams {
        loanToken: extra(token, "loanToken")?,
        collateralToken: extra(token, "collateralToken")?,
        oracle: extra(token, "oracle")?,
        irm: extra(token, "irm")?,
        lltv: extra(token, "lltv")?,
    };
    Ok((extra(token, "marketId")?, params))
}

pub struct MorphoBlueAdapter {
    chain: Chain,
    side: Side,
    provider: DynProvider,
    morpho: Address,
    markets: Vec<B256>,
    tokens: ProtocolTokenCache,
}

impl MorphoBlueAdapter {
    pub const SUPPLY_PRODUCT_ID: &'static str = "market-supply";
    pub const BORROW_PRODUCT_ID: &'static str = "market-borrow";

    /// `None` on chains without listed markets.
    pub fn new(context: &AdapterContext, side: Side) -> Option<Self> {
        let markets = markets(context.chain);
        if markets.is_empty() {
            return None;
        }
        Some(Self::with_markets(context, side, MORPHO, markets.to_vec()))
    }

    pub fn with_markets(
        context: &AdapterContext,
        side: Side,
        morpho: Address,
        markets: Vec<B256>,
    ) -> Self {
        let product = match side {
            Side::Supply => Self::SUPPLY_PRODUCT_ID,
            Side::Borrow => Self::BORROW_PRODUCT_ID,
        };
        Self {
            chain: context.chain,
            side,
            provider: context.provider.clone(),
            morpho,
            markets,
            tokens: context.token_cache(Protocol::MorphoBlue, product),
        }
    }

    fn morpho(&self) -> IMorpho::IMorphoInstance<DynProvider> {
        IMorpho::new(self.morpho, self.provider.clone())
    }

    async fn market_token(&self, id: B256) -> Result<Option<ProtocolToken>> {
        let params = self.morpho().idToMarketParams(id).call().await?;
        if params.is_idle() {
            log::warn!("skipping idle morpho market {id} on {}", self.chain);
            return Ok(None);
        }

        let (loan, collateral) = try_join(
            erc20_metadata(&self.provider, self.chain, params.loanToken),
            erc20_metadata(&self.provider, self.chain, params.collateralToken),
        )
        .await?;
        let symbol = format!("{}/{}", collateral.symbol, loan.symbol);
        let metadata = Erc20Metadata::new(
            market_token_address(id),
            format!("Morpho Blue {symbol}"),
            symbol,
            loan.decimals,
        );

        let token = ProtocolToken::new(metadata, vec![loan])
            .with_extra("marketId", id.to_string())
            .with_extra("loanToken", params.loanToken.to_string())
            .with_extra("collateralToken", params.collateralToken.to_string())
            .with_extra("oracle", params.oracle.to_string())
            .with_extra("irm", params.irm.to_string())
            .with_extra("lltv", params.lltv.to_string());
        Ok(Some(token))
    }

    /// The market accrued up to `block_number`.
    async fn accrued_market(
        &self,
        params: &MarketParams,
        market: &Market,
        block_number: Option<u64>,
    ) -> Result<MarketState> {
        let state = MarketState::from(market);
        if market.totalBorrowAssets == 0 {
            return Ok(state);
        }

        let rate = IIrm::new(params.irm, self.provider.clone())
            .borrowRateView(params.clone(), market.clone())
            .block(block_id(block_number))
            .call()
            .await?;
        let timestamp = block_timestamp(&self.provider, block_number).await?;
        accrue_interest(&state, rate, timestamp)
    }

    async fn position(
        &self,
        token: &ProtocolToken,
        user: Address,
        block_number: Option<u64>,
    ) -> Result<U256> {
        let (id, params) = market_of(token)?;
        let block = block_id(block_number);

        let position = self.morpho().position(id, user).block(block).call().await?;
        let shares = self.side.shares(&position);
        if shares.is_zero() {
            return Ok(U256::ZERO);
        }

        let market = self.morpho().market(id).block(block).call().await?;
        let state = self.accrued_market(&params, &market, block_number).await?;
        self.side.to_assets(shares, &state)
    }

    async fn market_movements<E: SolEvent>(
        &self,
        input: &GetEventsInput,
        user_topic: usize,
        moved: fn(&E) -> (Address, U256),
    ) -> Result<Vec<MovementsByBlock>> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let (id, _) = market_of(&token)?;

        let user = input.user_address;
        let filter = Filter::new()
            .address(self.morpho)
            .event_signature(E::SIGNATURE_HASH)
            .topic1(id)
            .from_block(input.from_block)
            .to_block(input.to_block);
        let filter = match user_topic {
            2 => filter.topic2(user.into_word()),
            _ => filter.topic3(user.into_word()),
        };

        helpers::event_movements(&self.provider, &filter, &token, |event: &E| {
            let (on_behalf, assets) = moved(event);
            (on_behalf == user).then_some(assets)
        })
        .await
    }

    async fn rates(&self, input: &GetRateInput) -> Result<(ProtocolToken, PoolApy)> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let (id, params) = market_of(&token)?;

        let market = self
            .morpho()
            .market(id)
            .block(block_id(input.block_number))
            .call()
            .await?;
        let apy = pool_apy(&self.provider, params, market, input.block_number).await?;
        Ok((token, apy))
    }
}

#[async_trait]
impl Adapter for MorphoBlueAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::MorphoBlue
    }

    fn product_id(&self) -> &'static str {
        match self.side {
            Side::Supply => Self::SUPPLY_PRODUCT_ID,
            Side::Borrow => Self::BORROW_PRODUCT_ID,
        }
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            enable_position_detection_by_protocol_token_transfer: false,
            include_in_unwrap: false,
            version: None,
        }
    }

    fn protocol_details(&self) -> ProtocolDetails {
        let listing = match self.side {
            Side::Supply => SUPPLY_LISTING,
            Side::Borrow => BORROW_LISTING,
        };
        listing.details(self.chain, Protocol::MorphoBlue, self.product_id())
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        let tokens = try_join_all(self.markets.iter().map(|&id| self.market_token(id))).await?;
        Ok(tokens.into_iter().flatten().collect())
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        let tokens = helpers::filter_protocol_tokens(
            self.chain,
            self.protocol_tokens().await?,
            input.protocol_token_addresses.as_deref(),
        )?;

        let mut positions = vec![];
        for token in tokens {
            let assets = self.position(&token, input.user_address, input.block_number).await?;
            if assets.is_zero() {
                continue;
            }
            let rate = helpers::one_to_one_rate(&token);
            let underlying = helpers::underlying_from_rate(assets, &rate)?;
            positions.push(ProtocolPosition::new(token.token, assets, underlying));
        }
        Ok(positions)
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.side {
            Side::Supply => {
                self.market_movements::<IMorpho::Withdraw>(input, 2, |event| {
                    (event.onBehalf, event.assets)
                })
                .await
            }
            Side::Borrow => Err(self.not_implemented("withdrawals")),
        }
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.side {
            Side::Supply => {
                self.market_movements::<IMorpho::Supply>(input, 3, |event| {
                    (event.onBehalf, event.assets)
                })
                .await
            }
            Side::Borrow => Err(self.not_implemented("deposits")),
        }
    }

    async fn borrows(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.side {
            Side::Borrow => {
                self.market_movements::<IMorpho::Borrow>(input, 2, |event| {
                    (event.onBehalf, event.assets)
                })
                .await
            }
            Side::Supply => Err(self.not_implemented("borrows")),
        }
    }

    async fn repays(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.side {
            Side::Borrow => {
                self.market_movements::<IMorpho::Repay>(input, 3, |event| {
                    (event.onBehalf, event.assets)
                })
                .await
            }
            Side::Supply => Err(self.not_implemented("repays")),
        }
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        let tokens = helpers::filter_protocol_tokens(
            self.chain,
            self.protocol_tokens().await?,
            input.protocol_token_addresses.as_deref(),
        )?;

        let mut tvl = Vec::with_capacity(tokens.len());
        for token in tokens {
            let (id, _) = market_of(&token)?;
            let market = self
                .morpho()
                .market(id)
                .block(block_id(input.block_number))
                .call()
                .await?;
            let total = self.side.total_assets(&market);
            tvl.push(ProtocolTokenTvl {
                tokens: token
                    .underlying_tokens
                    .iter()
                    .map(|loan| UnderlyingTokenTvl {
                        token: loan.clone(),
                        token_type: TokenType::Underlying,
                        total_supply_raw: total,
                    })
                    .collect(),
                token: token.token,
                token_type: TokenType::Protocol,
                total_supply_raw: total,
            });
        }
        Ok(tvl)
    }

    /// Positions are denominated in the loan token.
    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        Ok(helpers::one_to_one_rate(&token))
    }

    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        let (token, rates) = self.rates(input).await?;
        let apy_decimal = match self.side {
            Side::Supply => rates.supply,
            Side::Borrow => rates.borrow,
        };
        Ok(ProtocolTokenApy {
            token: token.token,
            apy_decimal,
        })
    }

    async fn apr(&self, input: &GetRateInput) -> Result<ProtocolTokenApr> {
        let (token, rates) = self.rates(input).await?;
        let apr_decimal = match self.side {
            Side::Supply => rates.supply_apr(),
            Side::Borrow => rates.borrow_apr(),
        };
        Ok(ProtocolTokenApr {
            token: token.token,
            apr_decimal,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::transports::mock::Asserter;

    use super::*;
    use crate::{
        adapters::testing::{context_with_tokens, log, push_call},
        decorators::cache::MetadataKey,
    };

    const USER: Address = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");
    const BUNDLER: Address = address!("0x4095F064B8d3c3548A3bebfd0Bbfd04750E30077");
    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const WSTETH: Address = address!("0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0");
    const IRM: Address = address!("0x870aC11D48B15DB9a138Cf899d20F13F79Ba00BC");
    const ORACLE: Address = address!("0x48F7E36EB6B826B2dF4B2E630B62Cd25e89E40e2");

    fn params() -> MarketParams {
        MarketParams {
            loanToken: USDC,
            collateralToken: WSTETH,
            oracle: ORACLE,
            irm: IRM,
            lltv: U256::from(860_000_000_000_000_000u64),
        }
    }

    fn market_token() -> ProtocolToken {
        let params = params();
        let id = params.id();
        ProtocolToken::new(
            Erc20Metadata::new(
                market_token_address(id),
                "Morpho Blue wstETH/USDC",
                "wstETH/USDC",
                6,
            ),
            vec![Erc20Metadata::new(USDC, "USD Coin", "USDC", 6)],
        )
        .with_extra("marketId", id.to_string())
        .with_extra("loanToken", params.loanToken.to_string())
        .with_extra("collateralToken", params.collateralToken.to_string())
        .with_extra("oracle", params.oracle.to_string())
        .with_extra("irm", params.irm.to_string())
        .with_extra("lltv", params.lltv.to_string())
    }

    fn adapter(asserter: &Asserter, side: Side) -> MorphoBlueAdapter {
        let product = match side {
            Side::Supply => MorphoBlueAdapter::SUPPLY_PRODUCT_ID,
            Side::Borrow => MorphoBlueAdapter::BORROW_PRODUCT_ID,
        };
        let key = MetadataKey::new(Protocol::MorphoBlue, product, Chain::Ethereum);
        let context = context_with_tokens(Chain::Ethereum, asserter, key, &[market_token()]);
        MorphoBlueAdapter::with_markets(&context, side, MORPHO, vec![params().id()])
    }

    fn idle_market() -> Market {
        // nothing borrowed, so no accrual
        Market {
            totalSupplyAssets: 2_000_000_000,
            totalSupplyShares: 2_000_000_000_000_000,
            totalBorrowAssets: 0,
            totalBorrowShares: 0,
            lastUpdate: 1_700_000_000,
            fee: 0,
        }
    }

    #[test]
    fn test_market_round_trips_through_metadata() {
        let (id, params) = market_of(&market_token()).unwrap();
        assert_eq!(id, self::params().id());
        assert_eq!(params, self::params());
        assert_eq!(market_token_address(id).as_slice(), &id[12..]);

        let missing = ProtocolToken::new(market_token().token, vec![]);
        assert!(matches!(market_of(&missing), Err(Error::Config(_))));
    }

    #[test]
    fn test_side_to_assets_rounding() {
        let market = MarketState {
            total_supply_assets: 1_000,
            total_supply_shares: 1_000_000_000,
            total_borrow_assets: 1_000,
            total_borrow_shares: 1_000_000_000,
            last_update: 0,
            fee: 0,
        };
        // half a unit: supply rounds down, debt rounds up
        let shares = U256::from(1_500_000u64);
        assert_eq!(Side::Supply.to_assets(shares, &market).unwrap(), U256::from(1));
        assert_eq!(Side::Borrow.to_assets(shares, &market).unwrap(), U256::from(2));
    }

    #[tokio::test]
    async fn test_supply_position() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Side::Supply);
        push_call(
            &asserter,
            contracts::Position {
                supplyShares: U256::from(500_000_000_000_000u64),
                borrowShares: 0,
                collateral: 0,
            },
        );
        push_call(&asserter, idle_market());

        let positions = adapter.positions(&GetPositionsInput::new(USER)).await.unwrap();
        assert_eq!(positions.len(), 1);
        // a quarter of the supply
        assert_eq!(positions[0].balance_raw, U256::from(500_000_000u64));
        assert_eq!(positions[0].tokens[0].token.symbol, "USDC");
        assert_eq!(positions[0].tokens[0].balance_raw, positions[0].balance_raw);
    }

    #[tokio::test]
    async fn test_no_shares_no_position() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Side::Borrow);
        push_call(
            &asserter,
            contracts::Position {
                supplyShares: U256::from(1_000u64),
                borrowShares: 0,
                collateral: 10,
            },
        );

        let positions = adapter.positions(&GetPositionsInput::new(USER)).await.unwrap();
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn test_borrow_apy() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Side::Borrow);
        let market = Market {
            totalBorrowAssets: 1_000_000_000,
            totalBorrowShares: 1_000_000_000_000_000,
            ..idle_market()
        };
        push_call(&asserter, market);
        // ~5% a year, per second
        push_call(&asserter, U256::from(1_547_125_957u64));

        let input = GetRateInput {
            protocol_token_address: market_token().address(),
            block_number: None,
        };
        let apy = adapter.apy(&input).await.unwrap();
        let expected = (1_547_125_957f64 / 1e18 * SECONDS_PER_YEAR as f64).exp() - 1.0;
        assert!((apy.apy_decimal - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_supply_product_has_no_borrows() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Side::Supply);
        let input = GetEventsInput {
            user_address: USER,
            protocol_token_address: market_token().address(),
            from_block: 0,
            to_block: 1,
            token_id: None,
        };
        let err = adapter.borrows(&input).await.unwrap_err();
        assert!(err.is_not_implemented());
    }

    #[tokio::test]
    async fn test_deposits_are_supplies_on_behalf_of_the_user() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Side::Supply);
        let id = params().id();
        let supply = |on_behalf, assets: u64| {
            let event = IMorpho::Supply {
                id,
                caller: BUNDLER,
                onBehalf: on_behalf,
                assets: U256::from(assets),
                shares: U256::from(assets) * U256::from(1_000_000u64),
            };
            event.encode_log_data()
        };
        asserter.push_success(&vec![
            log(MORPHO, supply(USER, 750_000_000), 10),
            log(MORPHO, supply(BUNDLER, 1_000_000), 12),
        ]);

        let movements = adapter
            .deposits(&GetEventsInput {
                user_address: USER,
                protocol_token_address: market_token().address(),
                from_block: 0,
                to_block: 20,
                token_id: None,
            })
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].block_number, 10);
        assert_eq!(movements[0].protocol_token.token.address, market_token().address());
        assert_eq!(movements[0].tokens[0].token.symbol, "USDC");
        assert_eq!(movements[0].tokens[0].balance_raw, U256::from(750_000_000u64));
    }
}
