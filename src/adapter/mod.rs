//! The uniform interface every protocol adapter implements.
//!
//! An adapter reads one product of one protocol on one chain. Implementations live in
//! [`crate::adapters`]; the [`AdaptersController`](crate::AdaptersController) holds them
//! and the [`decorators`](crate::decorators) compose them.
//!
//! # Example
//!
//! ```no_run
//! use defi_adapters::{Adapter, GetPositionsInput, address};
//!
//! # async fn example(adapter: &dyn Adapter) -> anyhow::Result<()> {
//! let user = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");
//! for position in adapter.positions(&GetPositionsInput::new(user)).await? {
//!     println!("{}: {}", position.token.symbol, position.balance_raw);
//! }
//! # Ok(())
//! # }
//! ```

pub mod helpers;
#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Chain, Protocol,
    decorators::cache::{MetadataKey, MetadataStore, ProtocolTokenCache},
    error::{Error, Result},
    evm::DynProvider,
    types::*,
};

/// Everything an adapter needs to be instantiated on a chain.
#[derive(Clone)]
pub struct AdapterContext {
    pub chain: Chain,
    pub provider: DynProvider,
    /// Store backing the protocol token cache, when configured.
    pub metadata: Option<Arc<dyn MetadataStore>>,
}

impl AdapterContext {
    pub fn new(chain: Chain, provider: DynProvider) -> Self {
        Self {
            chain,
            provider,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    /// Protocol token cache of one product on this chain.
    pub fn token_cache(&self, protocol: Protocol, product: &str) -> ProtocolTokenCache {
        ProtocolTokenCache::new(
            MetadataKey::new(protocol, product, self.chain),
            self.metadata.clone(),
        )
    }
}

/// Builds an adapter for a chain, or `None` when the product is not deployed there.
pub type AdapterFactory = fn(&AdapterContext) -> Option<Arc<dyn Adapter>>;

/// A protocol product on one chain.
///
/// The optional operations default to [`Error::NotImplemented`].
#[async_trait]
pub trait Adapter: Send + Sync {
    fn chain(&self) -> Chain;

    fn protocol(&self) -> Protocol;

    fn product_id(&self) -> &'static str;

    fn settings(&self) -> AdapterSettings {
        AdapterSettings::default()
    }

    fn protocol_details(&self) -> ProtocolDetails;

    /// Every protocol token of this product with its underlying tokens.
    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>>;

    /// Protocol tokens read from the chain, bypassing any metadata cache.
    ///
    /// Adapters without a cache keep the default.
    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.protocol_tokens().await
    }

    /// Non-zero balances of a user, unwrapped into underlying tokens.
    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>>;

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>>;

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>>;

    async fn borrows(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Err(self.not_implemented("borrows"))
    }

    async fn repays(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Err(self.not_implemented("repays"))
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>>;

    /// Underlying amounts received for one whole protocol token.
    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate>;

    async fn apy(&self, _input: &GetRateInput) -> Result<ProtocolTokenApy> {
        Err(self.not_implemented("apy"))
    }

    async fn apr(&self, _input: &GetRateInput) -> Result<ProtocolTokenApr> {
        Err(self.not_implemented("apr"))
    }

    /// Claimable rewards accrued by a protocol position.
    async fn reward_positions(&self, _input: &GetRewardPositionsInput) -> Result<Vec<Underlying>> {
        Err(self.not_implemented("reward_positions"))
    }

    async fn reward_withdrawals(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Err(self.not_implemented("reward_withdrawals"))
    }

    /// Builds the error returned by unsupported operations.
    fn not_implemented(&self, method: &'static str) -> Error {
        Error::NotImplemented {
            method,
            protocol: self.protocol(),
            product: self.product_id(),
        }
    }
}

/// `protocol/product` label used in logs and errors.
pub fn adapter_label(adapter: &dyn Adapter) -> String {
    format!("{}/{}", adapter.protocol(), adapter.product_id())
}
