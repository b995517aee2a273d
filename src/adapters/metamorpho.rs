//! MetaMorpho vaults.
//!
//! Vaults are plain ERC-4626 tokens over Morpho Blue markets, so everything except
//! the APY is the generic [`Erc4626Adapter`]. The APY is the supply APY of each
//! market in the vault's supply queue, weighted by what the vault has supplied to
//! it, net of the vault fee.

use std::sync::Arc;

use alloy::primitives::{Address, U256, address};
use async_trait::async_trait;

use super::{
    Listing,
    erc4626::Erc4626Adapter,
    morpho_blue::{
        PoolApy,
        contracts::{IMetaMorpho, IMorpho},
        pool_apy,
    },
};
use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext, helpers},
    error::Result,
    evm::{IERC4626, Provider, block_id},
    math::{morpho::to_assets_down, scaled_to_f64, u256_to_f64},
    types::*,
};

pub const PRODUCT_ID: &str = "vault";

const ETHEREUM_VAULTS: [Address; 3] = [
    // Steakhouse USDC
    address!("0xBEEF01735c132Ada46AA9aA4c54623cAA92A64CB"),
    // Gauntlet WETH Prime
    address!("0x2371e134e3455e0593363cBF89d3b6cf53740618"),
    // Re7 WETH
    address!("0x78Fc2c2eD1A4cDb5402365934aE5648aDAd094d0"),
];

const BASE_VAULTS: [Address; 1] = [
    // Moonwell Flagship USDC
    address!("0xc1256Ae5FF1cf2719D4937adb3bbCCab2E00A2Ca"),
];

const LISTING: Listing = Listing {
    name: "MetaMorpho",
    description: "MetaMorpho curated vaults on Morpho Blue",
    site_url: "https://morpho.org",
    icon_url: "https://cdn.morpho.org/assets/logos/morpho.svg",
    position_type: PositionType::Supply,
    asset_type: AssetType::StandardToken,
};

/// Vaults listed on a chain.
pub fn vaults(chain: Chain) -> &'static [Address] {
    match chain {
        Chain::Ethereum => &ETHEREUM_VAULTS,
        Chain::Base => &BASE_VAULTS,
        _ => &[],
    }
}

/// Factory of the `vault` product.
pub fn vault(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
    let vaults = vaults(context.chain);
    if vaults.is_empty() {
        return None;
    }
    Some(Arc::new(MetaMorphoAdapter::new(context, vaults.to_vec())))
}

/// MetaMorpho's vault APY
#[derive(Debug, Clone)]
pub struct VaultApy {
    /// Markets that compose this vault.
    pub components: Vec<VaultSupply>,
    /// Vault fee as a fraction.
    pub fee: f64,
    /// Total assets deposited into the vault.
    pub total_assets: U256,
}

#[derive(Debug, Clone)]
pub struct VaultSupply {
    /// Assets the vault has supplied to the market.
    pub supplied_assets: U256,
    pub pool: PoolApy,
}

impl VaultApy {
    /// Returns the MetaMorpho vault APY.
    pub fn apy(&self) -> f64 {
        if self.total_assets.is_zero() {
            return 0.0;
        }
        let total = u256_to_f64(self.total_assets);
        self.components
            .iter()
            .map(|component| u256_to_f64(component.supplied_assets) * component.pool.supply / total)
            .sum::<f64>()
            * (1.0 - self.fee)
    }
}

/// Reads the supply queue of a vault and the rates of each enabled market.
///
/// <https://github.com/morpho-org/metamorpho-v1.1/blob/main/src/MetaMorphoV1_1.sol>
pub async fn vault_apy<P: Provider>(
    provider: &P,
    vault: Address,
    block_number: Option<u64>,
) -> Result<VaultApy> {
    let block = block_id(block_number);
    let meta_morpho = IMetaMorpho::new(vault, provider.clone());
    // the vault is at the same time a token and holds balances
    let vault_erc4626 = IERC4626::new(vault, provider.clone());
    let (fee, supply_queue_len, total_assets, morpho_addr) = provider
        .multicall()
        .add(meta_morpho.fee())
        .add(meta_morpho.supplyQueueLength())
        .add(vault_erc4626.totalAssets())
        .add(meta_morpho.MORPHO())
        .block(block)
        .aggregate()
        .await?;

    let morpho = IMorpho::new(morpho_addr, provider.clone());
    let mut apy = VaultApy {
        components: vec![],
        fee: scaled_to_f64(U256::from(fee.to::<u128>()), 18),
        total_assets,
    };

    let supply_queue_len = supply_queue_len.saturating_to::<usize>();
    for i in 0..supply_queue_len {
        let market_id = meta_morpho.supplyQueue(U256::from(i)).block(block).call().await?;

        let (config, params, market, position) = provider
            .multicall()
            .add(meta_morpho.config(market_id))
            .add(morpho.idToMarketParams(market_id))
            .add(morpho.market(market_id))
            .add(morpho.position(market_id, vault))
            .block(block)
            .aggregate()
            .await?;

        if !config.enabled || params.is_idle() {
            log::debug!("skipping market {market_id} of vault {vault}");
            continue;
        }

        let supplied_assets = to_assets_down(
            position.supplyShares,
            U256::from(market.totalSupplyAssets),
            U256::from(market.totalSupplyShares),
        )?;
        let pool = pool_apy(provider, params, market, block_number).await?;
        apy.components.push(VaultSupply { supplied_assets, pool });
    }

    Ok(apy)
}

pub struct MetaMorphoAdapter {
    vault: Erc4626Adapter,
}

impl MetaMorphoAdapter {
    pub fn new(context: &AdapterContext, vaults: Vec<Address>) -> Self {
        Self {
            vault: Erc4626Adapter::new(context, Protocol::MetaMorpho, PRODUCT_ID, LISTING, vaults),
        }
    }
}

#[async_trait]
impl Adapter for MetaMorphoAdapter {
    fn chain(&self) -> Chain {
        self.vault.chain()
    }

    fn protocol(&self) -> Protocol {
        Protocol::MetaMorpho
    }

    fn product_id(&self) -> &'static str {
        PRODUCT_ID
    }

    fn protocol_details(&self) -> ProtocolDetails {
        self.vault.protocol_details()
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.vault.protocol_tokens().await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.vault.fetch_protocol_tokens().await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        self.vault.positions(input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.vault.withdrawals(input).await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.vault.deposits(input).await
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        self.vault.total_value_locked(input).await
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        self.vault.unwrap(input).await
    }

    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        let tokens = self.protocol_tokens().await?;
        let token =
            helpers::find_protocol_token(self.chain(), &tokens, input.protocol_token_address)?;
        let apy = vault_apy(self.vault.provider(), token.address(), input.block_number).await?;
        log::debug!(
            "{} apy over {} markets",
            token.token.symbol,
            apy.components.len()
        );
        Ok(ProtocolTokenApy {
            token: token.token,
            apy_decimal: apy.apy(),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::{primitives::B256, transports::mock::Asserter};

    use super::*;
    use crate::{
        adapters::{
            morpho_blue::{
                MORPHO,
                contracts::{Market, MarketConfig, MarketParams, Position},
            },
            testing::{self, encoded, push_aggregate, push_call},
        },
        math::morpho::{self, MarketState},
    };

    const VAULT: Address = address!("0xBEEF01735c132Ada46AA9aA4c54623cAA92A64CB");

    fn pool(supply: f64) -> PoolApy {
        PoolApy {
            params: MarketParams::default(),
            market: Market::default(),
            rate: U256::ZERO,
            borrow: supply * 2.0,
            supply,
        }
    }

    #[test]
    fn test_vault_apy_weights_markets_by_supply() {
        let apy = VaultApy {
            components: vec![
                VaultSupply {
                    supplied_assets: U256::from(750u64),
                    pool: pool(0.04),
                },
                VaultSupply {
                    supplied_assets: U256::from(250u64),
                    pool: pool(0.08),
                },
            ],
            fee: 0.1,
            total_assets: U256::from(1_000u64),
        };
        // (0.75 * 4% + 0.25 * 8%) * 0.9
        assert!((apy.apy() - 0.045).abs() < 1e-12, "{}", apy.apy());
    }

    #[test]
    fn test_idle_assets_dilute_apy() {
        let apy = VaultApy {
            components: vec![VaultSupply {
                supplied_assets: U256::from(500u64),
                pool: pool(0.1),
            }],
            fee: 0.0,
            total_assets: U256::from(1_000u64),
        };
        assert!((apy.apy() - 0.05).abs() < 1e-12);

        let empty = VaultApy {
            components: vec![],
            fee: 0.0,
            total_assets: U256::ZERO,
        };
        assert_eq!(empty.apy(), 0.0);
    }

    #[test]
    fn test_factory() {
        let asserter = Asserter::new();
        let provider = testing::mocked(&asserter);
        let adapter = vault(&AdapterContext::new(Chain::Base, provider.clone())).unwrap();
        assert_eq!(adapter.protocol(), Protocol::MetaMorpho);
        assert_eq!(adapter.protocol_details().position_type, PositionType::Supply);
        assert!(vault(&AdapterContext::new(Chain::Bsc, provider)).is_none());
    }

    #[tokio::test]
    async fn test_vault_apy_reads_the_supply_queue() {
        let asserter = Asserter::new();
        let provider = testing::mocked(&asserter);
        let params = MarketParams {
            loanToken: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            collateralToken: address!("0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"),
            oracle: address!("0x48F7E36EB6B826B2dF4B2E630B62Cd25e89E40e2"),
            irm: address!("0x870aC11D48B15DB9a138Cf899d20F13F79Ba00BC"),
            lltv: U256::from(860_000_000_000_000_000u64),
        };
        let market = Market {
            totalSupplyAssets: 10_000,
            totalSupplyShares: 10_000_000_000,
            totalBorrowAssets: 5_000,
            totalBorrowShares: 5_000_000_000,
            lastUpdate: 1_700_000_000,
            fee: 0,
        };
        let config = |enabled| MarketConfig {
            cap: Default::default(),
            enabled,
            removableAt: 0,
        };
        // the vault holds 600 of the market's 10_000 assets
        let position = Position {
            supplyShares: U256::from(600_000_000u64),
            borrowShares: 0,
            collateral: 0,
        };
        let rate = U256::from(1_547_125_957u64);

        push_aggregate(
            &asserter,
            vec![
                encoded(U256::from(100_000_000_000_000_000u64)),
                encoded(U256::from(2u64)),
                encoded(U256::from(1_000u64)),
                encoded(MORPHO),
            ],
        );
        push_call(&asserter, params.id());
        push_aggregate(
            &asserter,
            vec![
                encoded(config(true)),
                encoded(params.clone()),
                encoded(market.clone()),
                encoded(position.clone()),
            ],
        );
        push_call(&asserter, rate);
        // second market is disabled: no rate is read for it
        push_call(&asserter, B256::repeat_byte(2));
        push_aggregate(
            &asserter,
            vec![
                encoded(config(false)),
                encoded(params.clone()),
                encoded(market.clone()),
                encoded(position),
            ],
        );

        let apy = vault_apy(&provider, VAULT, Some(20_000_000)).await.unwrap();
        assert_eq!(apy.components.len(), 1);
        assert_eq!(apy.components[0].supplied_assets, U256::from(600u64));
        assert!((apy.fee - 0.1).abs() < 1e-12);

        let state = MarketState::from(&market);
        let supply = morpho::supply_apy(morpho::borrow_apy(rate), state.utilization(), 0.0);
        let expected = 0.6 * supply * 0.9;
        assert!((apy.apy() - expected).abs() < 1e-12, "{} vs {expected}", apy.apy());
    }
}
