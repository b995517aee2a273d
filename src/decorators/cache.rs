//! Protocol token metadata caching.
//!
//! Fetching protocol tokens usually means enumerating a registry on-chain, which is
//! slow and rarely changes. Adapters read their token list through a
//! [`ProtocolTokenCache`]: the first call is served from the configured
//! [`MetadataStore`] when it has an entry, otherwise from the chain, and the result
//! is memoized for the adapter's lifetime.

use std::{
    collections::HashMap,
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::OnceCell};

use crate::{
    Chain, Protocol,
    adapter::Adapter,
    controller::AdaptersController,
    error::{Error, Result},
    types::*,
};

/// Cache key: one entry per product and chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{protocol}/{product}/{chain}")]
pub struct MetadataKey {
    pub protocol: Protocol,
    pub product: String,
    pub chain: Chain,
}

impl MetadataKey {
    pub fn new(protocol: Protocol, product: impl Into<String>, chain: Chain) -> Self {
        Self {
            protocol,
            product: product.into(),
            chain,
        }
    }
}

/// Key-value store for protocol token lists.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &MetadataKey) -> Result<Option<Vec<ProtocolToken>>>;

    async fn put(&self, key: &MetadataKey, tokens: &[ProtocolToken]) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<MetadataKey, Vec<ProtocolToken>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, key: MetadataKey, tokens: Vec<ProtocolToken>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, tokens);
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, key: &MetadataKey) -> Result<Option<Vec<ProtocolToken>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &MetadataKey, tokens: &[ProtocolToken]) -> Result<()> {
        self.insert(key.clone(), tokens.to_vec());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataFile {
    written_at: DateTime<Utc>,
    protocol_tokens: Vec<ProtocolToken>,
}

/// One JSON file per key under `<root>/<protocol>/<product>/<chain>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file backing `key`.
    pub fn path(&self, key: &MetadataKey) -> PathBuf {
        self.root
            .join(key.protocol.to_string())
            .join(&key.product)
            .join(format!("{}.json", key.chain))
    }
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn get(&self, key: &MetadataKey) -> Result<Option<Vec<ProtocolToken>>> {
        let path = self.path(key);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: MetadataFile = serde_json::from_str(&contents)?;
        Ok(Some(file.protocol_tokens))
    }

    async fn put(&self, key: &MetadataKey, tokens: &[ProtocolToken]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = MetadataFile {
            written_at: Utc::now(),
            protocol_tokens: tokens.to_vec(),
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?).await?;
        log::debug!("wrote {} protocol tokens to {}", tokens.len(), path.display());
        Ok(())
    }
}

/// Read-through, memoized protocol token list of one adapter.
pub struct ProtocolTokenCache {
    key: MetadataKey,
    store: Option<Arc<dyn MetadataStore>>,
    memo: OnceCell<Vec<ProtocolToken>>,
}

impl ProtocolTokenCache {
    pub fn new(key: MetadataKey, store: Option<Arc<dyn MetadataStore>>) -> Self {
        Self {
            key,
            store,
            memo: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &MetadataKey {
        &self.key
    }

    /// Returns the cached tokens, calling `fetch` on a miss and storing its result.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Vec<ProtocolToken>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ProtocolToken>>>,
    {
        let tokens = self
            .memo
            .get_or_try_init(|| async {
                if let Some(store) = &self.store {
                    if let Some(tokens) = store.get(&self.key).await? {
                        log::debug!("metadata cache hit for {}", self.key);
                        return Ok(tokens);
                    }
                }

                log::debug!("metadata cache miss for {}", self.key);
                let tokens = fetch().await?;
                if let Some(store) = &self.store {
                    store.put(&self.key, &tokens).await?;
                }
                Ok::<_, Error>(tokens)
            })
            .await?;
        Ok(tokens.clone())
    }
}

/// Wraps an adapter so that `protocol_tokens` reads through a [`ProtocolTokenCache`].
///
/// The built-in adapters embed their own cache; this is for adapters that don't.
/// Calls the inner adapter makes to its own `protocol_tokens` are not intercepted.
pub struct Cached<A> {
    inner: A,
    cache: ProtocolTokenCache,
}

impl<A: Adapter> Cached<A> {
    pub fn new(inner: A, store: Option<Arc<dyn MetadataStore>>) -> Self {
        let key = MetadataKey::new(inner.protocol(), inner.product_id(), inner.chain());
        Self {
            inner,
            cache: ProtocolTokenCache::new(key, store),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: Adapter> Adapter for Cached<A> {
    fn chain(&self) -> Chain {
        self.inner.chain()
    }

    fn protocol(&self) -> Protocol {
        self.inner.protocol()
    }

    fn product_id(&self) -> &'static str {
        self.inner.product_id()
    }

    fn settings(&self) -> AdapterSettings {
        self.inner.settings()
    }

    fn protocol_details(&self) -> ProtocolDetails {
        self.inner.protocol_details()
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.cache.get_or_fetch(|| self.inner.fetch_protocol_tokens()).await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.inner.fetch_protocol_tokens().await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        self.inner.positions(input).await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.inner.withdrawals(input).await
    }

    async fn deposits(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.inner.deposits(input).await
    }

    async fn borrows(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.inner.borrows(input).await
    }

    async fn repays(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.inner.repays(input).await
    }

    async fn total_value_locked(
        &self,
        input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        self.inner.total_value_locked(input).await
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        self.inner.unwrap(input).await
    }

    async fn apy(&self, input: &GetRateInput) -> Result<ProtocolTokenApy> {
        self.inner.apy(input).await
    }

    async fn apr(&self, input: &GetRateInput) -> Result<ProtocolTokenApr> {
        self.inner.apr(input).await
    }

    async fn reward_positions(&self, input: &GetRewardPositionsInput) -> Result<Vec<Underlying>> {
        self.inner.reward_positions(input).await
    }

    async fn reward_withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.inner.reward_withdrawals(input).await
    }
}

/// Writes the protocol tokens of every registered adapter into `store`.
///
/// Tokens are read from the chain, so stale entries are replaced. Returns the
/// number of entries written.
pub async fn write_metadata(
    controller: &AdaptersController,
    store: &dyn MetadataStore,
) -> Result<usize> {
    let mut written = 0;
    for adapter in controller.all() {
        if adapter.protocol() == Protocol::Prices {
            continue;
        }
        let tokens = adapter.fetch_protocol_tokens().await?;
        let key = MetadataKey::new(adapter.protocol(), adapter.product_id(), adapter.chain());
        store.put(&key, &tokens).await?;
        written += 1;
    }
    Ok(written)
}
