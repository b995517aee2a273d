//! Lido liquid staking: stETH and wstETH on Ethereum.

use std::sync::Arc;

use alloy::{
    primitives::{Address, address},
    sol,
};
use async_trait::async_trait;
use futures::future::try_join;

use super::Listing;
use crate::{
    Chain, Protocol,
    adapter::{
        Adapter, AdapterContext,
        helpers::{self, Movement},
    },
    decorators::cache::ProtocolTokenCache,
    error::Result,
    evm::{DynProvider, block_id, erc20_metadata, native_token},
    types::*,
};

pub const STETH: Address = address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84");
pub const WSTETH: Address = address!("0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0");

sol! {
    #[sol(rpc)]
    interface IWstETH {
        function stEthPerToken() external view returns (uint256);
    }
}

const ST_ETH_LISTING: Listing = Listing {
    name: "Lido stETH",
    description: "Lido defi adapter for stETH",
    site_url: "https://lido.fi",
    icon_url: "https://lido.fi/favicon-32x32.png",
    position_type: PositionType::Staked,
    asset_type: AssetType::NonStandardToken,
};

const WST_ETH_LISTING: Listing = Listing {
    name: "Lido wstETH",
    description: "Lido defi adapter for wstETH",
    site_url: "https://lido.fi",
    icon_url: "https://lido.fi/favicon-32x32.png",
    position_type: PositionType::Staked,
    asset_type: AssetType::StandardToken,
};

/// Factory of the `st-eth` product.
pub fn st_eth(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    (context.chain == Chain::Ethereum).then(|| Arc::new(StEthAdapter::new(context)) as _)
}

/// Factory of the `wst-eth` product.
pub fn wst_eth(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    (context.chain == Chain::Ethereum).then(|| Arc::new(WstEthAdapter::new(context)) as _)
}

/// stETH, a rebasing token redeemable 1:1 for ether.
pub struct StEthAdapter {
    chain: Chain,
    provider: DynProvider,
    tokens: ProtocolTokenCache,
}

impl StEthAdapter {
    pub const PRODUCT_ID: &'static str = "st-eth";

    pub fn new(context: &AdapterContext) -> Self {
        Self {
            chain: context.chain,
            provider: context.provider.clone(),
            tokens: context.token_cache(Protocol::Lido, Self::PRODUCT_ID),
        }
    }
}

#[async_trait]
impl Adapter for StEthAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::Lido
    }

    fn product_id(&self) -> &'static str {
        Self::PRODUCT_ID
    }

    fn protocol_details(&self) -> ProtocolDetails {
        ST_ETH_LISTING.details(self.chain, Protocol::Lido, Self::PRODUCT_ID)
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        let steth = erc20_metadata(&self.provider, self.chain, STETH).await?;
        Ok(vec![ProtocolToken::new(steth, vec![native_token(self.chain)])])
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        helpers::balance_positions(self, &self.provider, input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        helpers::transfer_movements(self, &self.provider, input, Movement::Burn).await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        helpers::transfer_movements(self, &self.provider, input, Movement::Mint).await
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
}

/// wstETH, non-rebasing wrapper around stETH.
pub struct WstEthAdapter {
    chain: Chain,
    provider: DynProvider,
    tokens: ProtocolTokenCache,
}

impl WstEthAdapter {
    pub const PRODUCT_ID: &'static str = "wst-eth";

    pub fn new(context: &AdapterContext) -> Self {
        Self {
            chain: context.chain,
            provider: context.provider.clone(),
            tokens: context.token_cache(Protocol::Lido, Self::PRODUCT_ID),
        }
    }
}

#[async_trait]
impl Adapter for WstEthAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        Protocol::Lido
    }

    fn product_id(&self) -> &'static str {
        Self::PRODUCT_ID
    }

    fn protocol_details(&self) -> ProtocolDetails {
        WST_ETH_LISTING.details(self.chain, Protocol::Lido, Self::PRODUCT_ID)
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        let (wsteth, steth) = try_join(
            erc20_metadata(&self.provider, self.chain, WSTETH),
            erc20_metadata(&self.provider, self.chain, STETH),
        )
        .await?;
        Ok(vec![ProtocolToken::new(wsteth, vec![steth])])
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        helpers::balance_positions(self, &self.provider, input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        helpers::transfer_movements(self, &self.provider, input, Movement::Burn).await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        helpers::transfer_movements(self, &self.provider, input, Movement::Mint).await
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

        let steth_per_token = IWstETH::new(token.address(), self.provider.clone())
            .stEthPerToken()
            .block(block_id(input.block_number))
            .call()
            .await?;

        let rates = token
            .underlying_tokens
            .into_iter()
            .map(|steth| UnwrappedTokenExchangeRate::new(steth, steth_per_token))
            .collect();
        Ok(UnwrapExchangeRate::new(token.token, rates))
    }
}
