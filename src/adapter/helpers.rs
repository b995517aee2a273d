//! Building blocks shared by pool-style adapters.
//!
//! Most products are a plain ERC-20 receipt token whose balance is the position and
//! whose mints and burns are the deposits and withdrawals. These helpers implement
//! that shape once; adapters only have to provide `protocol_tokens` and `unwrap`.

use alloy::{
    primitives::{Address, U256},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use futures::future::try_join_all;

use super::Adapter;
use crate::{
    Chain,
    error::{Error, Result},
    evm::{IERC20, Provider, block_id, pow10},
    math::mul_div_down,
    types::*,
};

/// Direction of a protocol token movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Protocol token minted to the user.
    Mint,
    /// Protocol token burned from the user.
    Burn,
}

/// Keeps the tokens whose address is in `filter`, or all of them when unset.
///
/// Fails when the filter names a token the adapter does not know.
pub fn filter_protocol_tokens(
    chain: Chain,
    tokens: Vec<ProtocolToken>,
    filter: Option<&[Address]>,
) -> Result<Vec<ProtocolToken>> {
    let Some(filter) = filter else {
        return Ok(tokens);
    };

    filter
        .iter()
        .map(|address| {
            tokens
                .iter()
                .find(|token| token.address() == *address)
                .cloned()
                .ok_or(Error::ProtocolTokenNotFound {
                    chain,
                    address: *address,
                })
        })
        .collect()
}

/// Looks up a single protocol token.
pub fn find_protocol_token(
    chain: Chain,
    tokens: &[ProtocolToken],
    address: Address,
) -> Result<ProtocolToken> {
    tokens
        .iter()
        .find(|token| token.address() == address)
        .cloned()
        .ok_or(Error::ProtocolTokenNotFound { chain, address })
}

/// A rate where one protocol token is worth one unit of each underlying token.
pub fn one_to_one_rate(protocol_token: &ProtocolToken) -> UnwrapExchangeRate {
    let tokens = protocol_token
        .underlying_tokens
        .iter()
        .map(|underlying| {
            UnwrappedTokenExchangeRate::new(underlying.clone(), pow10(underlying.decimals))
        })
        .collect();
    UnwrapExchangeRate::new(protocol_token.token.clone(), tokens)
}

/// Applies an exchange rate to a protocol token balance.
pub fn underlying_from_rate(balance: U256, rate: &UnwrapExchangeRate) -> Result<Vec<Underlying>> {
    let scale = pow10(rate.token.decimals);
    rate.tokens
        .iter()
        .map(|underlying| {
            let amount = mul_div_down(balance, underlying.underlying_rate_raw, scale)?;
            Ok(Underlying::new(
                underlying.token.clone(),
                amount,
                underlying.token_type,
            ))
        })
        .collect()
}

/// Positions derived from `balanceOf` on each protocol token.
///
/// Zero balances are skipped; non-zero balances are unwrapped through
/// [`Adapter::unwrap`] at the same block.
pub async fn balance_positions<A, P>(
    adapter: &A,
    provider: &P,
    input: &GetPositionsInput,
) -> Result<Vec<ProtocolPosition>>
where
    A: Adapter + ?Sized,
    P: Provider,
{
    let tokens = filter_protocol_tokens(
        adapter.chain(),
        adapter.protocol_tokens().await?,
        input.protocol_token_addresses.as_deref(),
    )?;
    let block = block_id(input.block_number);

    let positions = try_join_all(tokens.into_iter().map(|token| async move {
        let balance = IERC20::new(token.address(), provider.clone())
            .balanceOf(input.user_address)
            .block(block)
            .call()
            .await?;
        if balance.is_zero() {
            return Ok::<_, Error>(None);
        }

        let rate = adapter
            .unwrap(&UnwrapInput::new(token.address(), input.block_number))
            .await?;
        let underlying = underlying_from_rate(balance, &rate)?;
        Ok(Some(ProtocolPosition::new(token.token, balance, underlying)))
    }))
    .await?;

    Ok(positions.into_iter().flatten().collect())
}

/// Mints or burns of a protocol token for a user, unwrapped at each event's block.
///
/// Transfers between two accounts are neither.
pub async fn transfer_movements<A, P>(
    adapter: &A,
    provider: &P,
    input: &GetEventsInput,
    movement: Movement,
) -> Result<Vec<MovementsByBlock>>
where
    A: Adapter + ?Sized,
    P: Provider,
{
    let tokens = adapter.protocol_tokens().await?;
    let protocol_token =
        find_protocol_token(adapter.chain(), &tokens, input.protocol_token_address)?;

    let (from, to) = match movement {
        Movement::Mint => (Address::ZERO, input.user_address),
        Movement::Burn => (input.user_address, Address::ZERO),
    };

    let filter = Filter::new()
        .address(input.protocol_token_address)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic1(from.into_word())
        .topic2(to.into_word())
        .from_block(input.from_block)
        .to_block(input.to_block);

    let logs = provider.get_logs(&filter).await?;
    log::debug!(
        "{} {:?} logs for {} on {}",
        logs.len(),
        movement,
        protocol_token.token.symbol,
        adapter.chain()
    );

    let movements = try_join_all(logs.into_iter().map(|entry| {
        let protocol_token = &protocol_token;
        async move {
            let (Some(block_number), Some(transaction_hash)) =
                (entry.block_number, entry.transaction_hash)
            else {
                log::warn!("skipping pending transfer log for {}", protocol_token.address());
                return Ok::<_, Error>(None);
            };
            let transfer = entry.log_decode::<IERC20::Transfer>()?.inner.data;
            if (transfer.from, transfer.to) != (from, to) {
                return Ok(None);
            }
            let rate = adapter
                .unwrap(&UnwrapInput::new(protocol_token.address(), Some(block_number)))
                .await?;
            Ok(Some(MovementsByBlock {
                protocol_token: MovementToken {
                    token: protocol_token.token.clone(),
                    token_id: None,
                },
                tokens: underlying_from_rate(transfer.value, &rate)?,
                block_number,
                transaction_hash,
            }))
        }
    }))
    .await?;

    Ok(movements.into_iter().flatten().collect())
}

/// Movements read from a protocol's own events.
///
/// `amount` extracts the underlying amount an event moved, or `None` for events
/// that do not belong to the user; the amount is attributed to the first
/// underlying token of `protocol_token`. Pending logs are skipped.
pub async fn event_movements<E, P, F>(
    provider: &P,
    filter: &Filter,
    protocol_token: &ProtocolToken,
    amount: F,
) -> Result<Vec<MovementsByBlock>>
where
    E: SolEvent,
    P: Provider,
    F: Fn(&E) -> Option<U256>,
{
    let Some(underlying) = protocol_token.underlying_tokens.first() else {
        return Ok(vec![]);
    };

    let logs = provider.get_logs(filter).await?;
    log::debug!("{} {} logs for {}", logs.len(), E::SIGNATURE, protocol_token.token.symbol);

    let mut movements = Vec::with_capacity(logs.len());
    for entry in logs {
        let (Some(block_number), Some(transaction_hash)) =
            (entry.block_number, entry.transaction_hash)
        else {
            continue;
        };
        let event = entry.log_decode::<E>()?;
        let Some(amount) = amount(&event.inner.data) else {
            continue;
        };
        movements.push(MovementsByBlock {
            protocol_token: MovementToken {
                token: protocol_token.token.clone(),
                token_id: None,
            },
            tokens: vec![Underlying::new(underlying.clone(), amount, TokenType::Underlying)],
            block_number,
            transaction_hash,
        });
    }
    Ok(movements)
}

/// TVL as the protocol token's total supply, unwrapped.
pub async fn total_supply_tvl<A, P>(
    adapter: &A,
    provider: &P,
    input: &GetTotalValueLockedInput,
) -> Result<Vec<ProtocolTokenTvl>>
where
    A: Adapter + ?Sized,
    P: Provider,
{
    let tokens = filter_protocol_tokens(
        adapter.chain(),
        adapter.protocol_tokens().await?,
        input.protocol_token_addresses.as_deref(),
    )?;
    let block = block_id(input.block_number);

    try_join_all(tokens.into_iter().map(|token| async move {
        let total_supply = IERC20::new(token.address(), provider.clone())
            .totalSupply()
            .block(block)
            .call()
            .await?;
        let rate = adapter
            .unwrap(&UnwrapInput::new(token.address(), input.block_number))
            .await?;
        let tokens = underlying_from_rate(total_supply, &rate)?
            .into_iter()
            .map(|underlying| UnderlyingTokenTvl {
                token: underlying.token,
                token_type: underlying.token_type,
                total_supply_raw: underlying.balance_raw,
            })
            .collect();
        Ok::<_, Error>(ProtocolTokenTvl {
            token: token.token,
            token_type: TokenType::Protocol,
            total_supply_raw: total_supply,
            tokens,
        })
    }))
    .await
}
