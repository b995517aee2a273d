//! Aave v3 aTokens and variable debt tokens.
//!
//! Reserves are listed by the pool data provider. Both token kinds rebase, so
//! `balanceOf` already includes accrued interest and every token unwraps 1:1 into
//! its reserve asset.

use std::sync::Arc;

use alloy::{
    primitives::{Address, U256, address},
    sol,
};
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};

use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{
        Adapter, AdapterContext,
        helpers::{self, Movement},
    },
    decorators::cache::ProtocolTokenCache,
    error::{Error, Result},
    evm::{DynProvider, block_id, erc20_metadata},
    math::rates::{ray_rate_to_apr, ray_rate_to_apy},
    types::*,
};

sol! {
    struct TokenData {
        string symbol;
        address tokenAddress;
    }

    #[sol(rpc)]
    interface IPoolDataProvider {
        function getAllReservesTokens() external view returns (TokenData[] memory);
        function getReserveTokensAddresses(address asset) external view returns (
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress
        );
        function getReserveData(address asset) external view returns (
            uint256 unbacked,
            uint256 accruedToTreasuryScaled,
            uint256 totalAToken,
            uint256 totalStableDebt,
            uint256 totalVariableDebt,
            uint256 liquidityRate,
            uint256 variableBorrowRate,
            uint256 stableBorrowRate,
            uint256 averageStableBorrowRate,
            uint256 liquidityIndex,
            uint256 variableBorrowIndex,
            uint40 lastUpdateTimestamp
        );
    }
}

/// Pool data provider of the chain's main market.
pub fn data_provider(chain: Chain) -> Option<Address> {
    match chain {
        Chain::Ethereum => Some(address!("0x7B4EB56E7CD4b454BA8ff71E4518426369a138a3")),
        Chain::Optimism | Chain::Arbitrum | Chain::Polygon | Chain::Avalanche => {
            Some(address!("0x69FA688f1Dc47d4B5d8029D5a35FB7a548310654"))
        }
        Chain::Base => Some(address!("0x2d8A3C5677189723C4cB8873CfC9C8976FDF38Ac")),
        _ => None,
    }
}

/// Token kind a product lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserve {
    AToken,
    VariableDebt,
}

const A_TOKEN_LISTING: Listing = Listing {
    name: "Aave v3 AToken",
    description: "Aave v3 defi adapter for yield-generating token",
    site_url: "https://aave.com/",
    icon_url: "https://cryptologos.cc/logos/aave-aave-logo.png",
    position_type: PositionType::Supply,
    asset_type: AssetType::NonStandardToken,
};

const VARIABLE_DEBT_LISTING: Listing = Listing {
    name: "Aave v3 VariableDebtToken",
    description: "Aave v3 defi adapter for variable interest-accruing token",
    site_url: "https://aave.com/",
    icon_url: "https://cryptologos.cc/logos/aave-aave-logo.png",
    position_type: PositionType::Borrow,
    asset_type: AssetType::NonStandardToken,
};

/// Factory of the `a-token` product.
pub fn a_token(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    AaveV3Adapter::new(context, Reserve::AToken).map(|adapter| Arc::new(adapter) as _)
}

/// Factory of the `variable-debt-token` product.
pub fn variable_debt_token(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    AaveV3Adapter::new(context, Reserve::VariableDebt).map(|adapter| Arc::new(adapter) as _)
}

pub struct AaveV3Adapter {
    chain: Chain,
    reserve: Reserve,
    provider: DynProvider,
    data_provider: Address,
    tokens: ProtocolTokenCache,
}

impl AaveV3Adapter {
    pub const A_TOKEN_PRODUCT_ID: &'static str = "a-token";
    pub const VARIABLE_DEBT_PRODUCT_ID: &'static str = "variable-debt-token";

    /// `None` on chains without an Aave v3 market.
    pub fn new(context: &AdapterContext, reserve: Reserve) -> Option<Self> {
        let data_provider = data_provider(context.chain)?;
        Some(Self::with_data_provider(context, reserve, data_provider))
    }

    pub fn with_data_provider(
        context: &AdapterContext,
        reserve: Reserve,
        data_provider: Address,
    ) -> Self {
        let product = match reserve {
            Reserve::AToken => Self::A_TOKEN_PRODUCT_ID,
            Reserve::VariableDebt => Self::VARIABLE_DEBT_PRODUCT_ID,
        };
        Self {
            chain: context.chain,
            reserve,
            provider: context.provider.clone(),
            data_provider,
            tokens: context.token_cache(Protocol::AaveV3, product),
        }
    }

    fn data_provider(&self) -> IPoolDataProvider::IPoolDataProviderInstance<DynProvider> {
        IPoolDataProvider::new(self.data_provider, self.provider.clone())
    }

    async fn reserve_token(&self, asset: Address) -> Result<ProtocolToken> {
        let addresses = self.data_provider().getReserveTokensAddresses(asset).call().await?;
        let token = match self.reserve {
            Reserve::AToken => addresses.aTokenAddress,
            Reserve::VariableDebt => addresses.variableDebtTokenAddress,
        };
        let (token, asset) = try_join(
            erc20_metadata(&self.provider, self.chain, token),
            erc20_metadata(&self.provider, self.chain, asset),
        )
        .await?;
        Ok(ProtocolToken::new(token, vec![asset]))
    }

    /// Ray-denominated rate of the product's side of the reserve.
    async fn reserve_rate(&self, input: &GetRateInput) -> Result<(ProtocolToken, U256)> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let Some(asset) = token.underlying_tokens.first() else {
            return Err(Error::ProtocolTokenNotFound {
                chain: self.chain,
                address: input.protocol_token_address,
            });
        };

        let data = self
            .data_provider()
            .getReserveData(asset.address)
            .block(block_id(input.block_number))
            .call()
            .await?;
        let rate = match self.reserve {
            Reserve::AToken => data.liquidityRate,
            Reserve::VariableDebt => data.variableBorrowRate,
        };
        Ok((token, rate))
    }
}

#[async_trait]
impl Adapter for AaveV3Adapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::AaveV3
    }

    fn product_id(&self) -> &'static str {
        match self.reserve {
            Reserve::AToken => Self::A_TOKEN_PRODUCT_ID,
            Reserve::VariableDebt => Self::VARIABLE_DEBT_PRODUCT_ID,
        }
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            include_in_unwrap: self.reserve == Reserve::AToken,
            ..AdapterSettings::default()
        }
    }

    fn protocol_details(&self) -> ProtocolDetails {
        let listing = match self.reserve {
            Reserve::AToken => A_TOKEN_LISTING,
            Reserve::VariableDebt => VARIABLE_DEBT_LISTING,
        };
        listing.details(self.chain, Protocol::AaveV3, self.product_id())
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        let reserves = self.data_provider().getAllReservesTokens().call().await?;
        log::debug!("{} aave reserves on {}", reserves.len(), self.chain);
        try_join_all(reserves.iter().map(|reserve| self.reserve_token(reserve.tokenAddress))).await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        helpers::balance_positions(self, &self.provider, input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.reserve {
            Reserve::AToken => {
                helpers::transfer_movements(self, &self.provider, input, Movement::Burn).await
            }
            Reserve::VariableDebt => Err(self.not_implemented("withdrawals")),
        }
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.reserve {
            Reserve::AToken => {
                helpers::transfer_movements(self, &self.provider, input, Movement::Mint).await
            }
            Reserve::VariableDebt => Err(self.not_implemented("deposits")),
        }
    }

    async fn borrows(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.reserve {
            Reserve::VariableDebt => {
                helpers::transfer_movements(self, &self.provider, input, Movement::Mint).await
            }
            Reserve::AToken => Err(self.not_implemented("borrows")),
        }
    }

    async fn repays(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        match self.reserve {
            Reserve::VariableDebt => {
                helpers::transfer_movements(self, &self.provider, input, Movement::Burn).await
            }
            Reserve::AToken => Err(self.not_implemented("repays")),
        }
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        helpers::total_supply_tvl(self, &self.provider, input).await
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        Ok(helpers::one_to_one_rate(&token))
    }

    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        let (token, rate) = self.reserve_rate(input).await?;
        Ok(ProtocolTokenApy {
            token: token.token,
            apy_decimal: ray_rate_to_apy(rate),
        })
    }

    async fn apr(&self, input: &GetRateInput) -> Result<ProtocolTokenApr> {
        let (token, rate) = self.reserve_rate(input).await?;
        Ok(ProtocolTokenApr {
            token: token.token,
            apr_decimal: ray_rate_to_apr(rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::{primitives::U256, sol_types::SolEvent, transports::mock::Asserter};

    use super::*;
    use crate::{
        adapters::testing::{context_with_tokens, log, push_call},
        decorators::cache::MetadataKey,
        evm::IERC20,
    };

    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const A_USDC: Address = address!("0x98C23E9d8f34FEFb1B7BD6a91B7FF122F4e16F5c");
    const DEBT_USDC: Address = address!("0x72E95b8931767C79bA4EeE721354d6E99a61D004");
    const USER: Address = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");
    const OTHER: Address = address!("0x00000000219ab540356cBB839Cbe05303d7705Fa");

    fn usdc() -> Erc20Metadata {
        Erc20Metadata::new(USDC, "USD Coin", "USDC", 6)
    }

    fn adapter(asserter: &Asserter, reserve: Reserve) -> AaveV3Adapter {
        let (product, token) = match reserve {
            Reserve::AToken => (
                AaveV3Adapter::A_TOKEN_PRODUCT_ID,
                Erc20Metadata::new(A_USDC, "Aave Ethereum USDC", "aEthUSDC", 6),
            ),
            Reserve::VariableDebt => (
                AaveV3Adapter::VARIABLE_DEBT_PRODUCT_ID,
                Erc20Metadata::new(
                    DEBT_USDC,
                    "Aave Ethereum Variable Debt USDC",
                    "variableDebtEthUSDC",
                    6,
                ),
            ),
        };
        let key = MetadataKey::new(Protocol::AaveV3, product, Chain::Ethereum);
        let tokens = [ProtocolToken::new(token, vec![usdc()])];
        let context = context_with_tokens(Chain::Ethereum, asserter, key, &tokens);
        AaveV3Adapter::new(&context, reserve).unwrap()
    }

    /// `getReserveData` output with only the two rates set.
    fn reserve_data(liquidity_rate: U256, variable_borrow_rate: U256) -> [U256; 12] {
        let mut words = [U256::ZERO; 12];
        words[5] = liquidity_rate;
        words[6] = variable_borrow_rate;
        words
    }

    #[tokio::test]
    async fn test_unwrap_is_one_to_one() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Reserve::AToken);
        let rate = adapter.unwrap(&UnwrapInput::new(A_USDC, None)).await.unwrap();
        assert_eq!(rate.tokens[0].underlying_rate_raw, U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_positions_unwrap_balance() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Reserve::VariableDebt);
        push_call(&asserter, U256::from(25_000_000u64));

        let positions = adapter.positions(&GetPositionsInput::new(USER)).await.unwrap();
        assert_eq!(positions[0].token.symbol, "variableDebtEthUSDC");
        assert_eq!(positions[0].tokens[0].balance_raw, U256::from(25_000_000u64));
    }

    #[tokio::test]
    async fn test_rates_pick_the_product_side() {
        // 3% supply, 5% borrow, in ray
        let liquidity = U256::from(30_000_000_000_000_000_000_000_000u128);
        let borrow = U256::from(50_000_000_000_000_000_000_000_000u128);

        let asserter = Asserter::new();
        let supply = adapter(&asserter, Reserve::AToken);
        push_call(&asserter, reserve_data(liquidity, borrow));
        let apr = supply
            .apr(&GetRateInput {
                protocol_token_address: A_USDC,
                block_number: None,
            })
            .await
            .unwrap();
        assert!((apr.apr_decimal - 0.03).abs() < 1e-12);

        let asserter = Asserter::new();
        let debt = adapter(&asserter, Reserve::VariableDebt);
        push_call(&asserter, reserve_data(liquidity, borrow));
        let apy = debt
            .apy(&GetRateInput {
                protocol_token_address: DEBT_USDC,
                block_number: None,
            })
            .await
            .unwrap();
        assert!((apy.apy_decimal - (0.05f64.exp() - 1.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_debt_product_has_no_deposits() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Reserve::VariableDebt);
        let input = GetEventsInput {
            user_address: USER,
            protocol_token_address: DEBT_USDC,
            from_block: 0,
            to_block: 1,
            token_id: None,
        };
        assert!(adapter.deposits(&input).await.unwrap_err().is_not_implemented());
        assert!(!adapter.settings().include_in_unwrap);
    }

    #[tokio::test]
    async fn test_deposits_are_mints_to_the_user() {
        let asserter = Asserter::new();
        let adapter = adapter(&asserter, Reserve::AToken);
        let transfer = |from, to, value: u64| {
            let event = IERC20::Transfer {
                from,
                to,
                value: U256::from(value),
            };
            event.encode_log_data()
        };
        asserter.push_success(&vec![
            log(A_USDC, transfer(Address::ZERO, USER, 25_000_000), 10),
            log(A_USDC, transfer(Address::ZERO, OTHER, 40_000_000), 11),
            log(A_USDC, transfer(USER, OTHER, 5_000_000), 12),
        ]);

        let movements = adapter
            .deposits(&GetEventsInput {
                user_address: USER,
                protocol_token_address: A_USDC,
                from_block: 0,
                to_block: 20,
                token_id: None,
            })
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].block_number, 10);
        assert_eq!(movements[0].protocol_token.token.symbol, "aEthUSDC");
        assert_eq!(movements[0].tokens[0].token, usdc());
        assert_eq!(movements[0].tokens[0].balance_raw, U256::from(25_000_000u64));
    }
}
