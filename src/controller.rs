//! The adapter registry.
//!
//! [`AdaptersController`] owns one adapter per (chain, protocol, product). It is built
//! once from a set of providers and [`AdapterFactory`] functions and answers lookups
//! by key or by protocol token address.
//!
//! # Example
//!
//! ```no_run
//! use defi_adapters::{AdaptersController, Chain, Config, Protocol};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?.with_chains(&[Chain::Ethereum]);
//! let controller = AdaptersController::from_config(&config).await?;
//!
//! let adapter = controller.adapter(Chain::Ethereum, Protocol::Lido, "wst-eth")?;
//! println!("{}", adapter.protocol_details().name);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, hash_map::Entry},
    sync::Arc,
};

use alloy::primitives::Address;
use futures::future::{join_all, try_join_all};
use tokio::sync::OnceCell;

use crate::{
    Chain, Protocol,
    adapter::{Adapter, AdapterContext, AdapterFactory, adapter_label},
    config::Config,
    decorators::cache::{JsonFileStore, MetadataStore},
    error::{Error, Result},
    evm::{self, DynProvider},
};

type Products = BTreeMap<&'static str, Arc<dyn Adapter>>;
type TokenIndex = HashMap<Address, Arc<dyn Adapter>>;

/// Registry resolving (chain, protocol, product) to an adapter.
#[derive(Default)]
pub struct AdaptersController {
    providers: BTreeMap<Chain, DynProvider>,
    adapters: BTreeMap<Chain, BTreeMap<Protocol, Products>>,
    /// Built on first use, per chain.
    token_index: HashMap<Chain, OnceCell<TokenIndex>>,
}

impl AdaptersController {
    /// Instantiates every factory on every chain that has a provider.
    ///
    /// Factories returning `None` are skipped for that chain.
    pub fn new(
        providers: impl IntoIterator<Item = (Chain, DynProvider)>,
        factories: &[AdapterFactory],
        metadata: Option<Arc<dyn MetadataStore>>,
    ) -> Result<Self> {
        let mut controller = Self {
            providers: providers.into_iter().collect(),
            ..Default::default()
        };

        let contexts: Vec<_> = controller
            .providers
            .iter()
            .map(|(chain, provider)| {
                let context = AdapterContext::new(*chain, provider.clone());
                match &metadata {
                    Some(store) => context.with_metadata(store.clone()),
                    None => context,
                }
            })
            .collect();

        for context in &contexts {
            for factory in factories {
                if let Some(adapter) = factory(context) {
                    controller.register(adapter)?;
                }
            }
        }

        log::debug!(
            "registered {} adapters on {} chains",
            controller.len(),
            controller.adapters.len()
        );
        Ok(controller)
    }

    /// Connects to every configured RPC and registers the built-in adapters.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let providers = try_join_all(config.rpc.iter().map(|(chain, url)| async move {
            let provider = evm::connect_dyn(url.as_str()).await?;
            Ok::<_, Error>((*chain, provider))
        }))
        .await?;

        let metadata = config
            .metadata_dir
            .as_ref()
            .map(|dir| Arc::new(JsonFileStore::new(dir)) as Arc<dyn MetadataStore>);

        Self::new(providers, &crate::adapters::default_factories(), metadata)
    }

    /// Adds an adapter.
    ///
    /// Fails with [`Error::DuplicateAdapter`] when its key is taken.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) -> Result<()> {
        let chain = adapter.chain();
        let protocol = adapter.protocol();
        let product = adapter.product_id();

        let products = self
            .adapters
            .entry(chain)
            .or_default()
            .entry(protocol)
            .or_default();
        if products.contains_key(product) {
            return Err(Error::DuplicateAdapter {
                chain,
                protocol,
                product: product.to_string(),
            });
        }
        products.insert(product, adapter);

        // invalidate
        self.token_index.insert(chain, OnceCell::new());
        Ok(())
    }

    pub fn adapter(
        &self,
        chain: Chain,
        protocol: Protocol,
        product: &str,
    ) -> Result<Arc<dyn Adapter>> {
        self.adapters
            .get(&chain)
            .and_then(|protocols| protocols.get(&protocol))
            .and_then(|products| products.get(product))
            .cloned()
            .ok_or_else(|| Error::AdapterNotFound {
                chain,
                protocol,
                product: product.to_string(),
            })
    }

    /// Every product of a protocol on a chain.
    pub fn products(
        &self,
        chain: Chain,
        protocol: Protocol,
    ) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters
            .get(&chain)
            .and_then(|protocols| protocols.get(&protocol))
            .into_iter()
            .flat_map(|products| products.values())
    }

    pub fn adapters_for(&self, chain: Chain) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters
            .get(&chain)
            .into_iter()
            .flat_map(|protocols| protocols.values())
            .flat_map(|products| products.values())
    }

    /// Every adapter, ordered by chain, protocol and product.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters
            .values()
            .flat_map(|protocols| protocols.values())
            .flat_map(|products| products.values())
    }

    /// Protocols with at least one adapter.
    pub fn protocols(&self) -> BTreeSet<Protocol> {
        self.adapters
            .values()
            .flat_map(|protocols| protocols.keys().copied())
            .collect()
    }

    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.adapters.keys().copied()
    }

    pub fn provider(&self, chain: Chain) -> Result<&DynProvider> {
        self.providers.get(&chain).ok_or(Error::MissingProvider(chain))
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The adapter owning a protocol token, if any.
    ///
    /// The first call per chain loads the protocol tokens of every adapter whose
    /// settings have `include_in_unwrap`; concurrent callers wait for that load.
    /// An adapter whose listing fails is left out of the index with a warning.
    pub async fn token_adapter(
        &self,
        chain: Chain,
        address: Address,
    ) -> Result<Option<Arc<dyn Adapter>>> {
        let Some(cell) = self.token_index.get(&chain) else {
            return Ok(None);
        };
        let index = cell.get_or_try_init(|| self.build_token_index(chain)).await?;
        Ok(index.get(&address).cloned())
    }

    async fn build_token_index(&self, chain: Chain) -> Result<TokenIndex> {
        let adapters = self
            .adapters_for(chain)
            .filter(|adapter| adapter.settings().include_in_unwrap);

        let listed = join_all(adapters.map(|adapter| async move {
            (adapter, adapter.protocol_tokens().await)
        }))
        .await;

        let mut index = TokenIndex::new();
        for (adapter, tokens) in listed {
            // a failed listing only drops that adapter's tokens
            let tokens = match tokens {
                Ok(tokens) => tokens,
                Err(err) => {
                    let label = adapter_label(adapter.as_ref());
                    log::warn!("skipping {label} in the token index: {err}");
                    continue;
                }
            };
            for token in tokens {
                match index.entry(token.address()) {
                    Entry::Occupied(existing) if !Arc::ptr_eq(existing.get(), adapter) => {
                        return Err(Error::DuplicateProtocolToken {
                            chain,
                            address: token.address(),
                            existing: adapter_label(existing.get().as_ref()),
                            duplicate: adapter_label(adapter.as_ref()),
                        });
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(slot) => {
                        slot.insert(adapter.clone());
                    }
                }
            }
        }

        log::debug!("indexed {} protocol tokens on {chain}", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::address,
        providers::ProviderBuilder,
        transports::mock::Asserter,
    };

    use super::*;
    use crate::{adapter::mock::MockAdapter, types::*};

    const WSTETH: Address = address!("0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0");
    const STETH: Address = address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84");

    fn wsteth() -> ProtocolToken {
        ProtocolToken::new(
            Erc20Metadata::new(WSTETH, "Wrapped liquid staked Ether 2.0", "wstETH", 18),
            vec![Erc20Metadata::new(STETH, "Liquid staked Ether 2.0", "stETH", 18)],
        )
    }

    fn mock(chain: Chain, protocol: Protocol, product: &'static str) -> MockAdapter {
        MockAdapter::new(chain, protocol, product)
    }

    fn lido_factory(context: &AdapterContext) -> Option<Arc<dyn Adapter>> {
        (context.chain == Chain::Ethereum)
            .then(|| wsteth_adapter(context.chain) as _)
    }

    fn wsteth_adapter(chain: Chain) -> Arc<MockAdapter> {
        Arc::new(mock(chain, Protocol::Lido, "wst-eth").with_token(wsteth()))
    }

    fn mocked_provider() -> DynProvider {
        DynProvider::new(ProviderBuilder::new().connect_mocked_client(Asserter::new()))
    }

    #[test]
    fn test_new_instantiates_factories_per_chain() {
        let providers = [
            (Chain::Ethereum, mocked_provider()),
            (Chain::Base, mocked_provider()),
        ];
        let controller = AdaptersController::new(providers, &[lido_factory], None).unwrap();

        assert_eq!(controller.len(), 1);
        assert!(controller.adapter(Chain::Ethereum, Protocol::Lido, "wst-eth").is_ok());
        assert!(controller.adapter(Chain::Base, Protocol::Lido, "wst-eth").is_err());
        assert!(controller.provider(Chain::Base).is_ok());
        assert!(matches!(
            controller.provider(Chain::Polygon),
            Err(Error::MissingProvider(Chain::Polygon))
        ));
    }

    #[test]
    fn test_duplicate_factory_fails() {
        let providers = [(Chain::Ethereum, mocked_provider())];
        let result = AdaptersController::new(providers, &[lido_factory, lido_factory], None);
        assert!(matches!(result, Err(Error::DuplicateAdapter { .. })));
    }

    #[test]
    fn test_register_and_lookup() {
        let mut controller = AdaptersController::default();
        controller
            .register(Arc::new(mock(Chain::Ethereum, Protocol::AaveV3, "a-token")))
            .unwrap();
        controller
            .register(Arc::new(mock(Chain::Ethereum, Protocol::AaveV3, "variable-debt-token")))
            .unwrap();
        controller
            .register(Arc::new(mock(Chain::Arbitrum, Protocol::AaveV3, "a-token")))
            .unwrap();
        controller
            .register(Arc::new(mock(Chain::Ethereum, Protocol::Lido, "st-eth")))
            .unwrap();

        assert_eq!(controller.len(), 4);
        assert_eq!(controller.adapters_for(Chain::Ethereum).count(), 3);
        assert_eq!(controller.products(Chain::Ethereum, Protocol::AaveV3).count(), 2);
        assert_eq!(
            controller.protocols().into_iter().collect::<Vec<_>>(),
            [Protocol::AaveV3, Protocol::Lido]
        );
        assert_eq!(
            controller.chains().collect::<Vec<_>>(),
            [Chain::Ethereum, Chain::Arbitrum]
        );

        let adapter = controller
            .adapter(Chain::Arbitrum, Protocol::AaveV3, "a-token")
            .unwrap();
        assert_eq!(adapter.chain(), Chain::Arbitrum);

        let err = controller
            .register(Arc::new(mock(Chain::Ethereum, Protocol::Lido, "st-eth")))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAdapter { product, .. } if product == "st-eth"));

        let err = controller
            .adapter(Chain::Ethereum, Protocol::Lido, "wst-eth")
            .err()
            .unwrap();
        assert!(matches!(err, Error::AdapterNotFound { .. }));
    }

    #[tokio::test]
    async fn test_token_adapter_is_lazy_and_memoized() {
        let adapter = wsteth_adapter(Chain::Ethereum);
        let mut controller = AdaptersController::default();
        controller.register(adapter.clone()).unwrap();
        assert_eq!(adapter.calls(), 0);

        let found = controller.token_adapter(Chain::Ethereum, WSTETH).await.unwrap();
        assert_eq!(found.unwrap().product_id(), "wst-eth");
        assert!(controller.token_adapter(Chain::Ethereum, STETH).await.unwrap().is_none());
        assert!(controller.token_adapter(Chain::Base, WSTETH).await.unwrap().is_none());
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_token_index_skips_excluded_adapters() {
        let mut excluded =
            mock(Chain::Ethereum, Protocol::CompoundV2, "borrow-market").with_token(wsteth());
        excluded.settings.include_in_unwrap = false;

        let mut controller = AdaptersController::default();
        controller.register(Arc::new(excluded)).unwrap();
        controller.register(wsteth_adapter(Chain::Ethereum)).unwrap();

        let found = controller.token_adapter(Chain::Ethereum, WSTETH).await.unwrap();
        assert_eq!(found.unwrap().protocol(), Protocol::Lido);
    }

    #[tokio::test]
    async fn test_token_index_skips_failing_adapters() {
        let mut broken = mock(Chain::Ethereum, Protocol::AaveV3, "a-token");
        broken.broken = true;
        let broken = Arc::new(broken);

        let mut controller = AdaptersController::default();
        controller.register(broken.clone()).unwrap();
        controller.register(wsteth_adapter(Chain::Ethereum)).unwrap();

        let found = controller.token_adapter(Chain::Ethereum, WSTETH).await.unwrap();
        assert_eq!(found.unwrap().protocol(), Protocol::Lido);
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_protocol_token() {
        let mut controller = AdaptersController::default();
        controller.register(wsteth_adapter(Chain::Ethereum)).unwrap();
        controller
            .register(Arc::new(
                mock(Chain::Ethereum, Protocol::MetaMorpho, "vault").with_token(wsteth()),
            ))
            .unwrap();

        let err = controller
            .token_adapter(Chain::Ethereum, WSTETH)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateProtocolToken { address, .. } if address == WSTETH));
    }

    #[tokio::test]
    #[ignore = "needs an Ethereum RPC"]
    async fn test_live_wsteth_resolves_to_lido() {
        let config = Config::from_env().unwrap().with_chains(&[Chain::Ethereum]);
        let controller = AdaptersController::from_config(&config).await.unwrap();

        let adapter = controller.token_adapter(Chain::Ethereum, WSTETH).await.unwrap().unwrap();
        assert_eq!(adapter.protocol(), Protocol::Lido);
        let rate = adapter.unwrap(&UnwrapInput::new(WSTETH, None)).await.unwrap();
        assert!(rate.tokens[0].underlying_rate_raw > crate::evm::pow10(18));
    }
}
