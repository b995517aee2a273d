//! Generic ERC-4626 vault adapter.
//!
//! Any list of tokenized vaults can be exposed as a product: shares are the
//! protocol token, the vault `asset()` is the underlying and `convertToAssets`
//! gives the exchange rate. Deposits and withdrawals come from the vault's own
//! `Deposit`/`Withdraw` events rather than share transfers, so amounts are exact
//! asset amounts.

use alloy::{
    primitives::{Address, U256},
    providers::Provider as _,
    rpc::types::Filter,
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
    evm::{DynProvider, IERC20, IERC4626, block_id, erc20_metadata, pow10},
    math::{rates::apr_to_apy, u256_to_f64},
    types::*,
};

pub struct Erc4626Adapter {
    chain: Chain,
    protocol: Protocol,
    product: &'static str,
    listing: Listing,
    provider: DynProvider,
    vaults: Vec<Address>,
    tokens: ProtocolTokenCache,
}

impl Erc4626Adapter {
    pub fn new(
        context: &AdapterContext,
        protocol: Protocol,
        product: &'static str,
        listing: Listing,
        vaults: Vec<Address>,
    ) -> Self {
        Self {
            chain: context.chain,
            protocol,
            product,
            listing,
            provider: context.provider.clone(),
            vaults,
            tokens: context.token_cache(protocol, product),
        }
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub fn vaults(&self) -> &[Address] {
        &self.vaults
    }

    /// Assets redeemable for `shares` at a block.
    pub async fn convert_to_assets(
        &self,
        vault: Address,
        shares: U256,
        block_number: Option<u64>,
    ) -> Result<U256> {
        let assets = IERC4626::new(vault, self.provider.clone())
            .convertToAssets(shares)
            .block(block_id(block_number))
            .call()
            .await?;
        Ok(assets)
    }

    /// Vault events of the user, with the asset amount each one moved.
    async fn vault_movements<E: SolEvent>(
        &self,
        input: &GetEventsInput,
        owner_topic: usize,
        moved: fn(&E) -> (Address, U256),
    ) -> Result<Vec<MovementsByBlock>> {
        let tokens = self.protocol_tokens().await?;
        let vault =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;

        let owner = input.user_address;
        let filter = Filter::new()
            .address(vault.address())
            .event_signature(E::SIGNATURE_HASH)
            .from_block(input.from_block)
            .to_block(input.to_block);
        let filter = match owner_topic {
            2 => filter.topic2(owner.into_word()),
            _ => filter.topic3(owner.into_word()),
        };

        helpers::event_movements(&self.provider, &filter, &vault, |event: &E| {
            let (account, assets) = moved(event);
            (account == owner).then_some(assets)
        })
        .await
    }
}

#[async_trait]
impl Adapter for Erc4626Adapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn product_id(&self) -> &'static str {
        self.product
    }

    fn protocol_details(&self) -> ProtocolDetails {
        self.listing.details(self.chain, self.protocol, self.product)
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.tokens.get_or_fetch(|| self.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        try_join_all(self.vaults.iter().map(|&vault| async move {
            let asset = IERC4626::new(vault, self.provider.clone()).asset().call().await?;
            let (share, asset) = try_join(
                erc20_metadata(&self.provider, self.chain, vault),
                erc20_metadata(&self.provider, self.chain, asset),
            )
            .await?;
            Ok::<_, Error>(ProtocolToken::new(share, vec![asset]))
        }))
        .await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        helpers::balance_positions(self, &self.provider, input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.vault_movements::<IERC4626::Withdraw>(input, 3, |event| (event.owner, event.assets))
            .await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.vault_movements::<IERC4626::Deposit>(input, 2, |event| (event.owner, event.assets))
            .await
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
        let block = block_id(input.block_number);

        try_join_all(tokens.into_iter().map(|vault| async move {
            let total_supply = IERC20::new(vault.address(), self.provider.clone())
                .totalSupply()
                .block(block)
                .call()
                .await?;
            let total_assets = IERC4626::new(vault.address(), self.provider.clone())
                .totalAssets()
                .block(block)
                .call()
                .await?;
            Ok::<_, Error>(ProtocolTokenTvl {
                token: vault.token,
                token_type: TokenType::Protocol,
                total_supply_raw: total_supply,
                tokens: vault
                    .underlying_tokens
                    .into_iter()
                    .map(|asset| UnderlyingTokenTvl {
                        token: asset,
                        token_type: TokenType::Underlying,
                        total_supply_raw: total_assets,
                    })
                    .collect(),
            })
        }))
        .await
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        let tokens = self.protocol_tokens().await?;
        let vault =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;
        let assets = self
            .convert_to_assets(vault.address(), pow10(vault.token.decimals), input.block_number)
            .await?;

        let rates = vault
            .underlying_tokens
            .into_iter()
            .map(|asset| UnwrappedTokenExchangeRate::new(asset, assets))
            .collect();
        Ok(UnwrapExchangeRate::new(vault.token, rates))
    }

    /// Share price growth over the last day, compounded daily.
    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        let tokens = self.protocol_tokens().await?;
        let vault =
            helpers::find_protocol_token(self.chain, &tokens, input.protocol_token_address)?;

        let block = match input.block_number {
            Some(block) => block,
            None => self.provider.get_block_number().await?,
        };
        let day_before = block.saturating_sub(self.chain.blocks_per_day());
        let one_share = pow10(vault.token.decimals);

        let now = self.convert_to_assets(vault.address(), one_share, Some(block)).await?;
        let before = self
            .convert_to_assets(vault.address(), one_share, Some(day_before))
            .await?;

        let daily = if before.is_zero() {
            0.0
        } else {
            u256_to_f64(now) / u256_to_f64(before) - 1.0
        };
        Ok(ProtocolTokenApy {
            token: vault.token,
            apy_decimal: apr_to_apy(daily * 365.0, 365),
        })
    }
}
