//! Compound v2 cToken markets.
//!
//! The supply product tracks cToken balances; the borrow product tracks
//! `borrowBalanceStored` against the same markets. cToken events do not index the
//! account, so movements are filtered after decoding.

use std::sync::Arc;

use alloy::{
    primitives::{Address, U256, address},
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};

use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext, helpers},
    decorators::cache::ProtocolTokenCache,
    error::{Error, Result},
    evm::{DynProvider, block_id, erc20_metadata, native_token, pow10},
    math::{
        morpho::WAD,
        mul_div_down,
        rates::{per_block_rate_to_apr, per_block_rate_to_apy},
    },
    types::*,
};

sol! {
    #[sol(rpc)]
    interface IComptroller {
        function getAllMarkets() external view returns (address[] memory);
    }

    #[sol(rpc)]
    interface ICToken {
        function underlying() external view returns (address);
        function exchangeRateStored() external view returns (uint256);
        function supplyRatePerBlock() external view returns (uint256);
        function borrowRatePerBlock() external view returns (uint256);
        function borrowBalanceStored(address account) external view returns (uint256);
        function totalBorrows() external view returns (uint256);

        event Mint(address minter, uint256 mintAmount, uint256 mintTokens);
        event Redeem(address redeemer, uint256 redeemAmount, uint256 redeemTokens);
        event Borrow(
            address borrower,
            uint256 borrowAmount,
            uint256 accountBorrows,
            uint256 totalBorrows
        );
        event RepayBorrow(
            address payer,
            address borrower,
            uint256 repayAmount,
            uint256 accountBorrows,
            uint256 totalBorrows
        );
    }
}

pub const COMPTROLLER: Address = address!("0x3d9819210A31b4961b30EF54bE2aeD79B9c9Cd3B");

/// cETH has no `underlying()`.
pub const CETH: Address = address!("0x4Ddc2D193948926D02f9B1fE9e1daa0718270ED5");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Supply,
    Borrow,
}

const SUPPLY_LISTING: Listing = Listing {
    name: "Compound v2",
    description: "Compound v2 supply market adapter",
    site_url: "https://compound.finance",
    icon_url: "https://compound.finance/compound-components/assets/compound-mark.svg",
    position_type: PositionType::Supply,
    asset_type: AssetType::StandardToken,
};

const BORROW_LISTING: Listing = Listing {
    name: "Compound v2",
    description: "Compound v2 borrow market adapter",
    site_url: "https://compound.finance",
    icon_url: "https://compound.finance/compound-components/assets/compound-mark.svg",
    position_type: PositionType::Borrow,
    asset_type: AssetType::NonStandardToken,
};

/// Factory of the `supply-market` product.
pub fn supply_market(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    (context.chain == Chain::Ethereum)
        .then(|| Arc::new(CompoundV2Adapter::new(context, Market::Supply, COMPTROLLER)) as _)
}

/// Factory of the `borrow-market` product.
pub fn borrow_market(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    (context.chain == Chain::Ethereum)
        .then(|| Arc::new(CompoundV2Adapter::new(context, Market::Borrow, COMPTROLLER)) as _)
}

pub struct CompoundV2Adapter {
    chain: Chain,
    market: Market,
    provider: DynProvider,
    comptroller: Address,
    tokens: ProtocolTokenCache,
}

impl CompoundV2Adapter {
    pub const SUPPLY_PRODUCT_ID: &'static str = "supply-market";
    pub const BORROW_PRODUCT_ID: &'static str = "borrow-market";

    pub fn new(context: &AdapterContext, market: Market, comptroller: Address) -> Self {
        let product = match market {
            Market::Supply => Self::SUPPLY_PRODUCT_ID,
            Market::Borrow => Self::BORROW_PRODUCT_ID,
        };
        Self {
            chain: context.chain,
            market,
            provider: context.provider.clone(),
            comptroller,
            tokens: context.token_cache(Protocol::CompoundV2, product),
        }
    }

    fn ctoken(&self, address: Address) -> ICToken::ICTokenInstance<DynProvider> {
        ICToken::new(address, self.provider.clone())
    }

    async fn market_token(&self, ctoken: Address) -> Result<ProtocolToken> {
        if ctoken == CETH {
            let token = erc20_metadata(&self.provider, self.chain, ctoken).await?;
            return Ok(ProtocolToken::new(token, vec![native_token(self.chain)]));
        }

        let underlying = self.ctoken(ctoken).underlying().call().await?;
        let (token, underlying) = try_join(
            erc20_metadata(&self.provider, self.chain, ctoken),
            erc20_metadata(&self.provider, self.chain, underlying),
        )
        .await?;
        Ok(ProtocolToken::new(token, vec![underlying]))
    }

    /// Underlying owed for one whole cToken.
    ///
    /// `exchangeRateStored` is scaled by `1e18` and converts cToken units into
    /// underlying units.
    async fn supply_rate(&self, token: &ProtocolToken, block_number: Option<u64>) -> Result<U256> {
        let exchange_rate = self
            .ctoken(token.address())
            .exchangeRateStored()
            .block(block_id(block_number))
            .call()
            .await?;
        mul_div_down(exchange_rate, pow10(token.token.decimals), WAD)
    }

    async fn market_movements<E: SolEvent>(
        &self,
        input: &GetEventsInput,
        amount: impl Fn(&E) -> Option<U256>,
    ) -> Result<Vec<MovementsByBlock>> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let filter = Filter::new()
            .address(token.address())
            .event_signature(E::SIGNATURE_HASH)
            .from_block(input.from_block)
            .to_block(input.to_block);
        helpers::event_movements(&self.provider, &filter, &token, amount).await
    }

    async fn rate_per_block(&self, input: &GetRateInput) -> Result<(ProtocolToken, U256)> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let ctoken = self.ctoken(token.address());
        let block = block_id(input.block_number);
        let rate = match self.market {
            Market::Supply => ctoken.supplyRatePerBlock().block(block).call().await?,
            Market::Borrow => ctoken.borrowRatePerBlock().block(block).call().await?,
        };
        Ok((token, rate))
    }
}

#[async_trait]
impl Adapter for CompoundV2Adapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::CompoundV2
    }

    fn product_id(&self) -> &'static str {
        match self.market {
            Market::Supply => Self::SUPPLY_PRODUCT_ID,
            Market::Borrow => Self::BORROW_PRODUCT_ID,
        }
    }

    fn settings(&self) -> AdapterSettings {
        match self.market {
            Market::Supply => AdapterSettings::default(),
            Market::Borrow => AdapterSettings {
                enable_position_detection_by_protocol_token_transfer: false,
                include_in_unwrap: false,
                version: None,
            },
        }
    }

    fn protocol_details(&self) -> ProtocolDetails {
        let listing = match self.market {
            Market::Supply => SUPPLY_LISTING,
            Market::Borrow => BORROW_LISTING,
        };
        listing.details(self.chain, Protocol::CompoundV2, self.product_id())
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        let markets = IComptroller::new(self.comptroller, self.provider.clone())
            .getAllMarkets()
            .call()
            .await?;
        log::debug!("{} compound markets on {}", markets.len(), self.chain);
        try_join_all(markets.into_iter().map(|ctoken| self.market_token(ctoken))).await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        if self.market == Market::Supply {
            return helpers::balance_positions(self, &self.provider, input).await;
        }

        let tokens = helpers::filter_protocol_tokens(
            self.chain,
            self.protocol_tokens().await?,
            input.protocol_token_addresses.as_deref(),
        )?;
        let block = block_id(input.block_number);

        let positions = try_join_all(tokens.into_iter().map(|token| async move {
            let debt = self
                .ctoken(token.address())
                .borrowBalanceStored(input.user_address)
                .block(block)
                .call()
                .await?;
            if debt.is_zero() {
                return Ok::<_, Error>(None);
            }
            let rate = self.unwrap(&UnwrapInput::new(token.address(), input.block_number)).await?;
            let underlying = helpers::underlying_from_rate(debt, &rate)?;
            Ok(Some(ProtocolPosition::new(token.token, debt, underlying)))
        }))
        .await?;
        Ok(positions.into_iter().flatten().collect())
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        if self.market == Market::Borrow {
            return Err(self.not_implemented("withdrawals"));
        }
        let user = input.user_address;
        self.market_movements(input, move |event: &ICToken::Redeem| {
            (event.redeemer == user).then_some(event.redeemAmount)
        })
        .await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        if self.market == Market::Borrow {
            return Err(self.not_implemented("deposits"));
        }
        let user = input.user_address;
        self.market_movements(input, move |event: &ICToken::Mint| {
            (event.minter == user).then_some(event.mintAmount)
        })
        .await
    }

    async fn borrows(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        if self.market == Market::Supply {
            return Err(self.not_implemented("borrows"));
        }
        let user = input.user_address;
        self.market_movements(input, move |event: &ICToken::Borrow| {
            (event.borrower == user).then_some(event.borrowAmount)
        })
        .await
    }

    async fn repays(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        if self.market == Market::Supply {
            return Err(self.not_implemented("repays"));
        }
        let user = input.user_address;
        self.market_movements(input, move |event: &ICToken::RepayBorrow| {
            (event.borrower == user).then_some(event.repayAmount)
        })
        .await
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        if self.market == Market::Supply {
            return helpers::total_supply_tvl(self, &self.provider, input).await;
        }

        let tokens = helpers::filter_protocol_tokens(
            self.chain,
            self.protocol_tokens().await?,
            input.protocol_token_addresses.as_deref(),
        )?;
        let block = block_id(input.block_number);
        try_join_all(tokens.into_iter().map(|token| async move {
            let total_borrows =
                self.ctoken(token.address()).totalBorrows().block(block).call().await?;
            Ok::<_, Error>(ProtocolTokenTvl {
                tokens: token
                    .underlying_tokens
                    .iter()
                    .map(|underlying| UnderlyingTokenTvl {
                        token: underlying.clone(),
                        token_type: TokenType::Underlying,
                        total_supply_raw: total_borrows,
                    })
                    .collect(),
                token: token.token,
                token_type: TokenType::Protocol,
                total_supply_raw: total_borrows,
            })
        }))
        .await
    }

    /// Debt balances are already in underlying units, so the borrow product
    /// unwraps one protocol unit to one underlying unit.
    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let rate = match self.market {
            Market::Supply => self.supply_rate(&token, input.block_number).await?,
            Market::Borrow => pow10(token.token.decimals),
        };
        let rates = token
            .underlying_tokens
            .into_iter()
            .map(|underlying| UnwrappedTokenExchangeRate::new(underlying, rate))
            .collect();
        Ok(UnwrapExchangeRate::new(token.token, rates))
    }

    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        let (token, rate) = self.rate_per_block(input).await?;
        Ok(ProtocolTokenApy {
            token: token.token,
            apy_decimal: per_block_rate_to_apy(rate, self.chain.blocks_per_day()),
        })
    }

    async fn apr(&self, input: &GetRateInput) -> Result<ProtocolTokenApr> {
        let (token, rate) = self.rate_per_block(input).await?;
        Ok(ProtocolTokenApr {
            token: token.token,
            apr_decimal: per_block_rate_to_apr(rate, self.chain.blocks_per_day()),
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

    const CUSDC: Address = address!("0x39AA39c021dfbaE8faC545936693aC917d5E7563");
    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const USER: Address = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");
    const OTHER: Address = address!("0x00000000219ab540356cBB839Cbe05303d7705Fa");

    fn cusdc() -> ProtocolToken {
        ProtocolToken::new(
            Erc20Metadata::new(CUSDC, "Compound USD Coin", "cUSDC", 8),
            vec![Erc20Metadata::new(USDC, "USD Coin", "USDC", 6)],
        )
    }

    fn adapter(asserter: &Asserter, market: Market) -> CompoundV2Adapter {
        let product = match market {
            Market::Supply => CompoundV2Adapter::SUPPLY_PRODUCT_ID,
            Market::Borrow => CompoundV2Adapter::BORROW_PRODUCT_ID,
        };
        let key = MetadataKey::new(Protocol::CompoundV2, product, Chain::Ethereum);
        let context = context_with_tokens(Chain::Ethereum, asserter, key, &[cusdc()]);
        CompoundV2Adapter::new(&context, market, COMPTROLLER)
    }

    #[tokio::test]
    async fn test_unwrap_scales_exchange_rate() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Market::Supply);
        // 1 cUSDC = 0.023 USDC
        push_call(&asserter, U256::from(230_000_000_000_000u64));

        let rate = adapter.unwrap(&UnwrapInput::new(CUSDC, None)).await.unwrap();
        assert_eq!(rate.tokens[0].underlying_rate_raw, U256::from(23_000u64));
    }

    #[tokio::test]
    async fn test_borrow_positions_are_in_underlying_units() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Market::Borrow);
        push_call(&asserter, U256::from(1_250_000u64));

        let positions = adapter.positions(&GetPositionsInput::new(USER)).await.unwrap();
        assert_eq!(positions[0].balance_raw, U256::from(1_250_000u64));
        assert_eq!(positions[0].tokens[0].balance_raw, U256::from(1_250_000u64));
        assert_eq!(positions[0].tokens[0].token.symbol, "USDC");
    }

    #[tokio::test]
    async fn test_deposits_keep_only_the_users_mints() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Market::Supply);
        let mine = ICToken::Mint {
            minter: USER,
            mintAmount: U256::from(5_000_000u64),
            mintTokens: U256::from(217_391_304u64),
        };
        let theirs = ICToken::Mint {
            minter: OTHER,
            mintAmount: U256::from(7_000_000u64),
            mintTokens: U256::from(304_347_826u64),
        };
        asserter.push_success(&vec![
            log(CUSDC, mine.encode_log_data(), 10),
            log(CUSDC, theirs.encode_log_data(), 11),
        ]);

        let movements = adapter
            .deposits(&GetEventsInput {
                user_address: USER,
                protocol_token_address: CUSDC,
                from_block: 0,
                to_block: 20,
                token_id: None,
            })
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].block_number, 10);
        assert_eq!(movements[0].tokens[0].balance_raw, U256::from(5_000_000u64));
        assert_eq!(movements[0].tokens[0].token.symbol, "USDC");
    }

    #[tokio::test]
    async fn test_supply_apy_from_rate_per_block() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Market::Supply);
        let rate = U256::from(10_000_000_000u64);
        push_call(&asserter, rate);

        let apy = adapter
            .apy(&GetRateInput {
                protocol_token_address: CUSDC,
                block_number: Some(19_000_000),
            })
            .await
            .unwrap();
        assert_eq!(apy.apy_decimal, per_block_rate_to_apy(rate, 7200));
    }
}
