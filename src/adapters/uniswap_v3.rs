//! Uniswap v3 liquidity positions.
//!
//! Positions are NFTs minted by the NonfungiblePositionManager. Each one is reported
//! as a protocol position on the manager's token with its `token_id` set; the
//! liquidity is turned into token amounts with tick math and uncollected fees are
//! added as [`TokenType::UnderlyingClaimable`] nodes.
//!
//! Amounts are computed with [`Decimal`], which is an approximation of the Q64.96
//! math the pools use; results can be off by a few wei.

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256, U256, address},
    providers::Provider as _,
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use futures::future::try_join;
use rust_decimal::{
    Decimal, MathematicalOps,
    prelude::{FromPrimitive, ToPrimitive},
};

use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext},
    error::{Error, Result},
    evm::{DynProvider, block_id, erc20_metadata},
    types::*,
};

sol! {
    #[sol(rpc)]
    interface INonfungiblePositionManager {
        struct CollectParams {
            uint256 tokenId;
            address recipient;
            uint128 amount0Max;
            uint128 amount1Max;
        }

        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            uint24 fee,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );
        function collect(CollectParams calldata params)
            external
            payable
            returns (uint256 amount0, uint256 amount1);

        event IncreaseLiquidity(
            uint256 indexed tokenId,
            uint128 liquidity,
            uint256 amount0,
            uint256 amount1
        );
        event Collect(uint256 indexed tokenId, address recipient, uint256 amount0, uint256 amount1);
    }

    #[sol(rpc)]
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee)
            external
            view
            returns (address pool);
    }

    #[sol(rpc)]
    interface IUniswapV3Pool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );
    }
}

pub const PRODUCT_ID: &str = "pool";

/// Uniswap v3 contract addresses.
#[derive(Debug, Clone, Copy)]
pub struct Contracts {
    pub factory: Address,
    pub position_manager: Address,
}

const CANONICAL: Contracts = Contracts {
    factory: address!("0x1F98431c8aD98523631AE4a59f267346ea31F984"),
    position_manager: address!("0xC36442b4a4522E871399CD717aBDD847Ab11FE88"),
};

/// Contracts of the chain's deployment.
pub fn contracts(chain: Chain) -> Option<Contracts> {
    match chain {
        Chain::Ethereum | Chain::Optimism | Chain::Polygon | Chain::Arbitrum => Some(CANONICAL),
        Chain::Base => Some(Contracts {
            factory: address!("0x33128a8fC17869897dcE68Ed026d694621f6FDfD"),
            position_manager: address!("0x03a520b32C04BF3bEEf7BEb72E919cf822Ed34f1"),
        }),
        _ => None,
    }
}

const LISTING: Listing = Listing {
    name: "Uniswap v3",
    description: "Uniswap v3 concentrated liquidity positions",
    site_url: "https://uniswap.org/",
    icon_url: "https://cryptologos.cc/logos/uniswap-uni-logo.png",
    position_type: PositionType::Supply,
    asset_type: AssetType::NonStandardToken,
};

/// Factory of the `pool` product.
pub fn pool(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    let contracts = contracts(context.chain)?;
    Some(Arc::new(UniswapV3Adapter::new(context, contracts)))
}

#[inline]
fn math_error(what: &str) -> Error {
    Error::Math(format!("tick math: {what}"))
}

/// `sqrt(1.0001^tick)`, computed as `sqrt(1.0001)^tick` so that extreme ticks fit.
fn tick_to_sqrt_price(tick: i32) -> Result<Decimal> {
    let base = Decimal::new(10001, 4).sqrt().ok_or_else(|| math_error("sqrt"))?;
    base.checked_powi(i64::from(tick))
        .ok_or_else(|| math_error(&format!("tick {tick} out of range")))
}

/// Token amounts held by `liquidity` between two ticks at the current tick.
///
/// <https://github.com/Uniswap/v3-periphery/blob/main/contracts/libraries/LiquidityAmounts.sol>
pub fn amounts_from_liquidity(
    liquidity: u128,
    tick_lower: i32,
    tick_upper: i32,
    tick_current: i32,
) -> Result<(U256, U256)> {
    let liquidity = Decimal::from_u128(liquidity).ok_or_else(|| math_error("liquidity overflow"))?;
    let sqrt_lower = tick_to_sqrt_price(tick_lower)?;
    let sqrt_upper = tick_to_sqrt_price(tick_upper)?;

    let (amount0, amount1) = if tick_current < tick_lower {
        (amount0_delta(liquidity, sqrt_lower, sqrt_upper)?, Decimal::ZERO)
    } else if tick_current >= tick_upper {
        (Decimal::ZERO, amount1_delta(liquidity, sqrt_lower, sqrt_upper)?)
    } else {
        let sqrt_price = tick_to_sqrt_price(tick_current)?;
        (
            amount0_delta(liquidity, sqrt_price, sqrt_upper)?,
            amount1_delta(liquidity, sqrt_lower, sqrt_price)?,
        )
    };

    Ok((to_raw(amount0)?, to_raw(amount1)?))
}

/// `L * (sqrtB - sqrtA) / (sqrtA * sqrtB)`
fn amount0_delta(liquidity: Decimal, sqrt_a: Decimal, sqrt_b: Decimal) -> Result<Decimal> {
    let inverse_a = Decimal::ONE.checked_div(sqrt_a).ok_or_else(|| math_error("division"))?;
    let inverse_b = Decimal::ONE.checked_div(sqrt_b).ok_or_else(|| math_error("division"))?;
    liquidity
        .checked_mul(inverse_a - inverse_b)
        .ok_or_else(|| math_error("amount0 overflow"))
}

/// `L * (sqrtB - sqrtA)`
fn amount1_delta(liquidity: Decimal, sqrt_a: Decimal, sqrt_b: Decimal) -> Result<Decimal> {
    liquidity
        .checked_mul(sqrt_b - sqrt_a)
        .ok_or_else(|| math_error("amount1 overflow"))
}

fn to_raw(amount: Decimal) -> Result<U256> {
    amount
        .floor()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| math_error(&format!("amount {amount} is not a token amount")))
}

/// Liquidity of one NFT and what it is worth.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityPosition {
    pub token_id: U256,
    pub liquidity: u128,
    pub token0: Erc20Metadata,
    pub token1: Erc20Metadata,
    pub amount0: U256,
    pub amount1: U256,
    pub fees0: U256,
    pub fees1: U256,
}

impl LiquidityPosition {
    /// The position as a protocol position on the manager's NFT.
    pub fn into_protocol_position(self, manager: Erc20Metadata) -> ProtocolPosition {
        let mut tokens = vec![
            Underlying::new(self.token0.clone(), self.amount0, TokenType::Underlying),
            Underlying::new(self.token1.clone(), self.amount1, TokenType::Underlying),
        ];
        if !self.fees0.is_zero() {
            tokens.push(Underlying::new(self.token0, self.fees0, TokenType::UnderlyingClaimable));
        }
        if !self.fees1.is_zero() {
            tokens.push(Underlying::new(self.token1, self.fees1, TokenType::UnderlyingClaimable));
        }

        ProtocolPosition {
            token_id: Some(self.token_id.to_string()),
            ..ProtocolPosition::new(manager, U256::from(self.liquidity), tokens)
        }
    }
}

pub struct UniswapV3Adapter {
    chain: Chain,
    provider: DynProvider,
    contracts: Contracts,
}

impl UniswapV3Adapter {
    pub fn new(context: &AdapterContext, contracts: Contracts) -> Self {
        Self {
            chain: context.chain,
            provider: context.provider.clone(),
            contracts,
        }
    }

    fn manager(
        &self,
    ) -> INonfungiblePositionManager::INonfungiblePositionManagerInstance<DynProvider> {
        INonfungiblePositionManager::new(self.contracts.position_manager, self.provider.clone())
    }

    /// The NFT collection every position is a token of.
    fn manager_token(&self) -> Erc20Metadata {
        Erc20Metadata::new(
            self.contracts.position_manager,
            "Uniswap V3 Positions NFT-V1",
            "UNI-V3-POS",
            18,
        )
    }

    fn parse_token_id(token_id: &str) -> Result<U256> {
        token_id
            .parse()
            .map_err(|_| Error::InvalidInput(format!("token id {token_id} is not a number")))
    }

    fn required_token_id(token_id: Option<&str>) -> Result<U256> {
        let token_id = token_id
            .ok_or_else(|| Error::InvalidInput("uniswap v3 positions need a token id".into()))?;
        Self::parse_token_id(token_id)
    }

    /// Token ids owned by `owner` at `block_number`.
    async fn token_ids(&self, owner: Address, block_number: Option<u64>) -> Result<Vec<U256>> {
        let manager = self.manager();
        let block = block_id(block_number);
        let count = manager.balanceOf(owner).block(block).call().await?;
        let count = count.saturating_to::<usize>();
        log::debug!("{owner} owns {count} uniswap v3 positions on {}", self.chain);

        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let id = manager
                .tokenOfOwnerByIndex(owner, U256::from(index))
                .block(block)
                .call()
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Reads one position; `None` once its liquidity has been withdrawn.
    async fn liquidity_position(
        &self,
        owner: Address,
        token_id: U256,
        block_number: Option<u64>,
    ) -> Result<Option<LiquidityPosition>> {
        let manager = self.manager();
        let block = block_id(block_number);
        let position = manager.positions(token_id).block(block).call().await?;
        if position.liquidity == 0 {
            return Ok(None);
        }

        let pool = IUniswapV3Factory::new(self.contracts.factory, self.provider.clone())
            .getPool(position.token0, position.token1, position.fee)
            .block(block)
            .call()
            .await?;
        if pool.is_zero() {
            log::warn!("no pool for position {token_id} on {}", self.chain);
            return Ok(None);
        }
        let slot0 = IUniswapV3Pool::new(pool, self.provider.clone())
            .slot0()
            .block(block)
            .call()
            .await?;

        // a static collect returns owed fees including those not yet checkpointed
        let fees = manager
            .collect(INonfungiblePositionManager::CollectParams {
                tokenId: token_id,
                recipient: owner,
                amount0Max: u128::MAX,
                amount1Max: u128::MAX,
            })
            .from(owner)
            .block(block)
            .call()
            .await?;

        let (token0, token1) = try_join(
            erc20_metadata(&self.provider, self.chain, position.token0),
            erc20_metadata(&self.provider, self.chain, position.token1),
        )
        .await?;
        let (amount0, amount1) = amounts_from_liquidity(
            position.liquidity,
            position.tickLower.as_i32(),
            position.tickUpper.as_i32(),
            slot0.tick.as_i32(),
        )?;

        Ok(Some(LiquidityPosition {
            token_id,
            liquidity: position.liquidity,
            token0,
            token1,
            amount0,
            amount1,
            fees0: fees.amount0,
            fees1: fees.amount1,
        }))
    }

    /// Tokens of a position at `block_number`.
    ///
    /// A position burned in that block no longer exists at its end, so it is read
    /// again one block earlier.
    async fn position_tokens(
        &self,
        token_id: U256,
        block_number: u64,
    ) -> Result<(Erc20Metadata, Erc20Metadata)> {
        let manager = self.manager();
        let read = |block_number| manager.positions(token_id).block(block_id(Some(block_number)));
        let position = match read(block_number).call().await {
            Ok(position) => position,
            Err(err) if block_number > 0 => {
                log::debug!("position {token_id} unreadable at block {block_number}: {err}");
                read(block_number - 1).call().await?
            }
            Err(err) => return Err(err.into()),
        };

        let token0 = erc20_metadata(&self.provider, self.chain, position.token0).await?;
        let token1 = erc20_metadata(&self.provider, self.chain, position.token1).await?;
        Ok((token0, token1))
    }

    /// Two-token movements of one position read from the manager's events.
    ///
    /// The tokens are read at the first event's block, so positions closed and
    /// burned inside the range still report their movements.
    async fn position_movements<E: SolEvent>(
        &self,
        input: &GetEventsInput,
        amounts: impl Fn(&E) -> Option<(U256, U256)>,
    ) -> Result<Vec<MovementsByBlock>> {
        let token_id = Self::required_token_id(input.token_id.as_deref())?;
        let filter = Filter::new()
            .address(self.contracts.position_manager)
            .event_signature(E::SIGNATURE_HASH)
            .topic1(B256::from(token_id.to_be_bytes::<32>()))
            .from_block(input.from_block)
            .to_block(input.to_block);
        let logs = self.provider.get_logs(&filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for entry in logs {
            let (Some(block_number), Some(transaction_hash)) =
                (entry.block_number, entry.transaction_hash)
            else {
                continue;
            };
            let event = entry.log_decode::<E>()?;
            if let Some(amounts) = amounts(&event.inner.data) {
                events.push((block_number, transaction_hash, amounts));
            }
        }
        let Some(first_block) = events.iter().map(|(block_number, ..)| *block_number).min() else {
            return Ok(vec![]);
        };
        let (token0, token1) = self.position_tokens(token_id, first_block).await?;

        Ok(events
            .into_iter()
            .map(|(block_number, transaction_hash, (amount0, amount1))| MovementsByBlock {
                protocol_token: MovementToken {
                    token: self.manager_token(),
                    token_id: Some(token_id.to_string()),
                },
                tokens: vec![
                    Underlying::new(token0.clone(), amount0, TokenType::Underlying),
                    Underlying::new(token1.clone(), amount1, TokenType::Underlying),
                ],
                block_number,
                transaction_hash,
            })
            .collect())
    }
}

#[async_trait]
impl Adapter for UniswapV3Adapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::UniswapV3
    }

    fn product_id(&self) -> &'static str {
        PRODUCT_ID
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings {
            enable_position_detection_by_protocol_token_transfer: true,
            include_in_unwrap: false,
            version: None,
        }
    }

    fn protocol_details(&self) -> ProtocolDetails {
        LISTING.details(self.chain, Protocol::UniswapV3, PRODUCT_ID)
    }

    /// The position manager; its underlying tokens depend on each NFT.
    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        Ok(vec![ProtocolToken::new(self.manager_token(), vec![])])
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        if let Some(addresses) = &input.protocol_token_addresses {
            if !addresses.contains(&self.contracts.position_manager) {
                return Ok(vec![]);
            }
        }

        let token_ids = match &input.token_ids {
            Some(ids) => ids.iter().map(|id| Self::parse_token_id(id)).collect::<Result<Vec<_>>>()?,
            None => self.token_ids(input.user_address, input.block_number).await?,
        };

        let mut positions = Vec::with_capacity(token_ids.len());
        for token_id in token_ids {
            if let Some(position) = self
                .liquidity_position(input.user_address, token_id, input.block_number)
                .await?
            {
                positions.push(position.into_protocol_position(self.manager_token()));
            }
        }
        Ok(positions)
    }

    /// Everything collected from the position, principal and fees.
    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        let user = input.user_address;
        self.position_movements(input, move |event: &INonfungiblePositionManager::Collect| {
            (event.recipient == user).then_some((event.amount0, event.amount1))
        })
        .await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.position_movements(input, |event: &INonfungiblePositionManager::IncreaseLiquidity| {
            Some((event.amount0, event.amount1))
        })
        .await
    }

    async fn total_value_locked(
        &self,
        _input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        Err(self.not_implemented("total_value_locked"))
    }

    /// Unwraps a whole NFT, given by `token_id`, into its token amounts.
    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let token_id = Self::required_token_id(input.token_id.as_deref())?;
        let owner = self
            .manager()
            .ownerOf(token_id)
            .block(block_id(input.block_number))
            .call()
            .await?;
        let Some(position) = self
            .liquidity_position(owner, token_id, input.block_number)
            .await?
        else {
            return Ok(UnwrapExchangeRate::new(self.manager_token(), vec![]));
        };
        Ok(UnwrapExchangeRate::new(
            self.manager_token(),
            vec![
                UnwrappedTokenExchangeRate::new(position.token0, position.amount0),
                UnwrappedTokenExchangeRate::new(position.token1, position.amount1),
            ],
        ))
    }
}
