//! Protocol adapters.
//!
//! One module per protocol; each product is a separate [`Adapter`](crate::Adapter)
//! exposed through an [`AdapterFactory`] so the controller can instantiate it on
//! every chain it is deployed to.
//!
//! | Protocol | Products |
//! |----------|----------|
//! | [`aave_v3`] | `a-token`, `variable-debt-token` |
//! | [`compound_v2`] | `supply-market`, `borrow-market` |
//! | [`morpho_blue`] | `market-supply`, `market-borrow` |
//! | [`metamorpho`] | `vault` |
//! | [`lido`] | `st-eth`, `wst-eth` |
//! | [`uniswap_v3`] | `pool` |
//! | [`prices`] | `usd` |
//!
//! [`erc4626`] is the generic vault adapter the vault products build on.

pub mod aave_v3;
pub mod compound_v2;
pub mod erc4626;
pub mod lido;
pub mod metamorpho;
pub mod morpho_blue;
pub mod prices;
pub mod uniswap_v3;

use crate::{
    Chain, Protocol,
    adapter::AdapterFactory,
    types::{AssetDetails, AssetType, PositionType, ProtocolDetails},
};

/// Every built-in product.
pub fn default_factories() -> Vec<AdapterFactory> {
    vec![
        aave_v3::a_token,
        aave_v3::variable_debt_token,
        compound_v2::supply_market,
        compound_v2::borrow_market,
        morpho_blue::market_supply,
        morpho_blue::market_borrow,
        metamorpho::vault,
        lido::st_eth,
        lido::wst_eth,
        uniswap_v3::pool,
        prices::usd_factory,
    ]
}

/// Static listing data of a product.
#[derive(Debug, Clone, Copy)]
pub struct Listing {
    pub name: &'static str,
    pub description: &'static str,
    pub site_url: &'static str,
    pub icon_url: &'static str,
    pub position_type: PositionType,
    pub asset_type: AssetType,
}

impl Listing {
    pub fn details(&self, chain: Chain, protocol: Protocol, product: &str) -> ProtocolDetails {
        ProtocolDetails {
            protocol,
            name: self.name.to_string(),
            description: self.description.to_string(),
            site_url: self.site_url.to_string(),
            icon_url: self.icon_url.to_string(),
            position_type: self.position_type,
            chain,
            product_id: product.to_string(),
            asset_details: AssetDetails {
                asset_type: self.asset_type,
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use alloy::transports::mock::Asserter;

    use super::*;
    use crate::{adapter::AdapterContext, controller::AdaptersController};

    #[test]
    fn test_default_factories_register_without_conflicts() {
        let asserter = Asserter::new();
        let providers = Chain::ALL.map(|chain| (chain, testing::mocked(&asserter)));
        let controller = AdaptersController::new(providers, &default_factories(), None).unwrap();

        assert!(controller.len() > default_factories().len());
        assert_eq!(controller.protocols().len(), Protocol::ALL.len());
        for adapter in controller.all() {
            let details = adapter.protocol_details();
            assert_eq!(details.chain, adapter.chain());
            assert_eq!(details.product_id, adapter.product_id());
        }
    }

    #[test]
    fn test_factories_skip_undeployed_chains() {
        let asserter = Asserter::new();
        let context = AdapterContext::new(Chain::Fantom, testing::mocked(&asserter));
        assert!(lido::wst_eth(&context).is_none());
        assert!(aave_v3::a_token(&context).is_none());
    }
}
