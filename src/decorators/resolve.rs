//! Underlying resolution across adapters.
//!
//! A position's underlying token is often itself the protocol token of another
//! adapter: a MetaMorpho vault holding wstETH, which unwraps to stETH. The functions
//! here walk such trees, asking the [`AdaptersController`] which adapter owns each
//! underlying and nesting that adapter's unwrap below it, until only plain tokens
//! remain. Leaves can then get a [`TokenType::Fiat`] price node from the price
//! adapter, which is what [`crate::aggregate`] consumes.

use futures::{
    FutureExt,
    future::{BoxFuture, try_join_all},
};

use crate::{
    Chain, Protocol,
    adapter::helpers::underlying_from_rate,
    adapters::prices,
    controller::AdaptersController,
    error::{Error, Result},
    types::*,
};

/// Nesting followed before giving up on a branch.
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub max_depth: usize,
    /// Attach a fiat price below every leaf.
    pub fiat_prices: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            fiat_prices: false,
        }
    }
}

impl ResolveOptions {
    #[must_use]
    pub fn with_fiat_prices(mut self) -> Self {
        self.fiat_prices = true;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Expands the underlying tokens of each position at `block_number`.
pub async fn resolve_underlying_positions(
    controller: &AdaptersController,
    chain: Chain,
    block_number: Option<u64>,
    positions: Vec<ProtocolPosition>,
    options: ResolveOptions,
) -> Result<Vec<ProtocolPosition>> {
    try_join_all(positions.into_iter().map(|mut position| async move {
        resolve_all(
            controller,
            chain,
            block_number,
            &mut position.tokens,
            options.max_depth,
            options.fiat_prices,
        )
        .await?;
        Ok::<_, Error>(position)
    }))
    .await
}

/// Expands the underlying deltas of each movement at the movement's block.
pub async fn resolve_underlying_movements(
    controller: &AdaptersController,
    chain: Chain,
    movements: Vec<MovementsByBlock>,
    options: ResolveOptions,
) -> Result<Vec<MovementsByBlock>> {
    try_join_all(movements.into_iter().map(|mut movement| async move {
        let block_number = Some(movement.block_number);
        resolve_all(
            controller,
            chain,
            block_number,
            &mut movement.tokens,
            options.max_depth,
            options.fiat_prices,
        )
        .await?;
        Ok::<_, Error>(movement)
    }))
    .await
}

/// The tree one whole protocol token unwraps into.
///
/// Each rate becomes a node whose balance is the rate itself, expanded like a
/// position would be.
pub async fn resolve_underlying_rates(
    controller: &AdaptersController,
    chain: Chain,
    block_number: Option<u64>,
    rate: &UnwrapExchangeRate,
    options: ResolveOptions,
) -> Result<Vec<Underlying>> {
    let mut nodes: Vec<_> = rate
        .tokens
        .iter()
        .map(|token| {
            Underlying::new(token.token.clone(), token.underlying_rate_raw, token.token_type)
        })
        .collect();
    resolve_all(
        controller,
        chain,
        block_number,
        &mut nodes,
        options.max_depth,
        options.fiat_prices,
    )
    .await?;
    Ok(nodes)
}

async fn resolve_all(
    controller: &AdaptersController,
    chain: Chain,
    block_number: Option<u64>,
    nodes: &mut [Underlying],
    depth: usize,
    fiat_prices: bool,
) -> Result<()> {
    try_join_all(
        nodes
            .iter_mut()
            .map(|node| resolve_node(controller, chain, block_number, node, depth, fiat_prices)),
    )
    .await?;
    Ok(())
}

fn resolve_node<'a>(
    controller: &'a AdaptersController,
    chain: Chain,
    block_number: Option<u64>,
    node: &'a mut Underlying,
    depth: usize,
    fiat_prices: bool,
) -> BoxFuture<'a, Result<()>> {
    async move {
        if node.token_type == TokenType::Fiat {
            return Ok(());
        }
        if !node.tokens.is_empty() {
            return resolve_all(
                controller,
                chain,
                block_number,
                &mut node.tokens,
                depth,
                fiat_prices,
            )
            .await;
        }

        if let Some(adapter) = controller.token_adapter(chain, node.token.address).await? {
            if depth == 0 {
                log::warn!(
                    "not unwrapping {} on {chain}: nesting limit reached",
                    node.token.symbol
                );
            } else {
                let rate = adapter
                    .unwrap(&UnwrapInput::new(node.token.address, block_number))
                    .await?;
                node.tokens = underlying_from_rate(node.balance_raw, &rate)?;
                return resolve_all(
                    controller,
                    chain,
                    block_number,
                    &mut node.tokens,
                    depth - 1,
                    fiat_prices,
                )
                .await;
            }
        }

        if fiat_prices {
            if let Some(leaf) = fiat_leaf(controller, chain, block_number, &node.token).await? {
                node.tokens.push(leaf);
            }
        }
        Ok(())
    }
    .boxed()
}

/// Price of one whole `token` as a fiat node, when a feed exists.
async fn fiat_leaf(
    controller: &AdaptersController,
    chain: Chain,
    block_number: Option<u64>,
    token: &Erc20Metadata,
) -> Result<Option<Underlying>> {
    let Ok(oracle) = controller.adapter(chain, Protocol::Prices, prices::PRODUCT_ID) else {
        log::debug!("no price adapter on {chain}");
        return Ok(None);
    };

    match oracle.unwrap(&UnwrapInput::new(token.address, block_number)).await {
        Ok(rate) => Ok(rate
            .tokens
            .into_iter()
            .next()
            .map(|price| Underlying::new(price.token, price.underlying_rate_raw, TokenType::Fiat))),
        Err(Error::ProtocolTokenNotFound { .. }) => {
            log::warn!("no price feed for {} on {chain}", token.symbol);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::{Address, B256, U256, address};

    use super::*;
    use crate::adapter::mock::MockAdapter;

    const VAULT: Address = address!("0x78Fc2c2eD1A4cDb5402365934aE5648aDAd094d0");
    const WSTETH: Address = address!("0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0");
    const STETH: Address = address!("0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84");
    const ETHER: u128 = 1_000_000_000_000_000_000;

    fn wsteth() -> Erc20Metadata {
        Erc20Metadata::new(WSTETH, "Wrapped liquid staked Ether 2.0", "wstETH", 18)
    }

    fn steth() -> Erc20Metadata {
        Erc20Metadata::new(STETH, "Liquid staked Ether 2.0", "stETH", 18)
    }

    fn vault_token() -> ProtocolToken {
        ProtocolToken::new(Erc20Metadata::new(VAULT, "Re7 wstETH", "Re7WSTETH", 18), vec![wsteth()])
    }

    fn wsteth_token() -> ProtocolToken {
        ProtocolToken::new(wsteth(), vec![steth()])
    }

    fn controller(with_prices: bool) -> AdaptersController {
        let mut controller = AdaptersController::default();
        controller
            .register(Arc::new(
                MockAdapter::new(Chain::Ethereum, Protocol::MetaMorpho, "vault")
                    .with_token(vault_token()),
            ))
            .unwrap();
        controller
            .register(Arc::new(
                MockAdapter::new(Chain::Ethereum, Protocol::Lido, "wst-eth")
                    .with_token(wsteth_token())
                    .with_rate(&wsteth_token(), 1_170_000_000_000_000_000),
            ))
            .unwrap();

        if with_prices {
            let feed = ProtocolToken::new(steth(), vec![prices::usd()]);
            let mut feeds = MockAdapter::new(Chain::Ethereum, Protocol::Prices, prices::PRODUCT_ID)
                .with_token(feed.clone())
                .with_rate(&feed, 3_000 * ETHER);
            feeds.settings.include_in_unwrap = false;
            controller.register(Arc::new(feeds)).unwrap();
        }
        controller
    }

    fn vault_position() -> ProtocolPosition {
        ProtocolPosition::new(
            vault_token().token,
            U256::from(2 * ETHER),
            vec![Underlying::new(wsteth(), U256::from(2 * ETHER), TokenType::Underlying)],
        )
    }

    #[tokio::test]
    async fn test_resolves_nested_protocol_tokens() {
        let controller = controller(false);
        let positions = resolve_underlying_positions(
            &controller,
            Chain::Ethereum,
            None,
            vec![vault_position()],
            ResolveOptions::default(),
        )
        .await
        .unwrap();

        let wsteth_node = &positions[0].tokens[0];
        assert_eq!(wsteth_node.token.symbol, "wstETH");
        assert_eq!(wsteth_node.tokens.len(), 1);

        let steth_node = &wsteth_node.tokens[0];
        assert_eq!(steth_node.token.symbol, "stETH");
        assert_eq!(steth_node.balance_raw, U256::from(2_340_000_000_000_000_000u128));
        assert!(steth_node.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_attaches_fiat_leaves() {
        let controller = controller(true);
        let positions = resolve_underlying_positions(
            &controller,
            Chain::Ethereum,
            Some(19_000_000),
            vec![vault_position()],
            ResolveOptions::default().with_fiat_prices(),
        )
        .await
        .unwrap();

        let steth_node = &positions[0].tokens[0].tokens[0];
        let fiat = steth_node.fiat_leaf().unwrap();
        assert_eq!(fiat.token_type, TokenType::Fiat);
        assert_eq!(fiat.token.symbol, "USD");
        assert_eq!(fiat.balance_raw, U256::from(3_000 * ETHER));
        // wstETH has no feed of its own; only the leaf is priced
        assert!(positions[0].tokens[0].fiat_leaf().is_none());
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let controller = controller(false);
        let positions = resolve_underlying_positions(
            &controller,
            Chain::Ethereum,
            None,
            vec![vault_position()],
            ResolveOptions::default().with_max_depth(0),
        )
        .await
        .unwrap();
        assert!(positions[0].tokens[0].tokens.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rates() {
        let controller = controller(false);
        let rate = UnwrapExchangeRate::new(
            vault_token().token,
            vec![UnwrappedTokenExchangeRate::new(wsteth(), U256::from(ETHER))],
        );

        let options = ResolveOptions::default();
        let nodes = resolve_underlying_rates(&controller, Chain::Ethereum, None, &rate, options)
            .await
            .unwrap();
        assert_eq!(nodes[0].balance_raw, U256::from(ETHER));
        assert_eq!(nodes[0].tokens[0].balance_raw, U256::from(1_170_000_000_000_000_000u128));
    }

    #[tokio::test]
    async fn test_resolve_movements_at_their_block() {
        let controller = controller(false);
        let movement = MovementsByBlock {
            protocol_token: MovementToken {
                token: vault_token().token,
                token_id: None,
            },
            tokens: vec![Underlying::new(wsteth(), U256::from(ETHER), TokenType::Underlying)],
            block_number: 18_000_000,
            transaction_hash: B256::ZERO,
        };

        let movements = resolve_underlying_movements(
            &controller,
            Chain::Ethereum,
            vec![movement],
            ResolveOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(movements[0].tokens[0].tokens[0].token.symbol, "stETH");
    }
}
