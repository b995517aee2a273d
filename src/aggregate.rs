//! Fiat valuation of resolved position trees and profit over a block range.
//!
//! Input trees must carry [`TokenType::Fiat`] leaves, see
//! [`resolve_underlying_positions`](crate::decorators::resolve_underlying_positions)
//! with fiat prices enabled. A node is valued with its fiat leaf when it has one,
//! otherwise as the sum of its children; a branch that ends without a price fails
//! with [`Error::MissingFiatLeaf`].

use std::collections::{BTreeSet, HashMap};

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    evm::try_from_wei,
    types::*,
};

/// A protocol token position: the token and, for NFT positions, its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionKey {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiatBalance {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub fiat_value: Decimal,
}

pub type FiatBalances = HashMap<PositionKey, FiatBalance>;

/// Fiat value of every position, keyed by protocol token.
pub fn aggregate_fiat_balances(positions: &[ProtocolPosition]) -> Result<FiatBalances> {
    let mut balances = FiatBalances::new();
    for position in positions {
        let value = tree_value(
            position.token.address,
            position.balance_raw,
            position.token.decimals,
            &position.tokens,
        )?;
        add(&mut balances, &position.token, position.token_id.clone(), value)?;
    }
    Ok(balances)
}

/// Fiat value moved per protocol token, summed over all movements.
pub fn aggregate_fiat_balances_from_movements(
    movements: &[MovementsByBlock],
) -> Result<FiatBalances> {
    let mut balances = FiatBalances::new();
    for movement in movements {
        let token = &movement.protocol_token;
        if movement.tokens.is_empty() {
            return Err(Error::MissingFiatLeaf(token.token.address));
        }
        let value = movement
            .tokens
            .iter()
            .map(node_value)
            .try_fold(Decimal::ZERO, |sum, value| checked_add(sum, value?))?;
        add(&mut balances, &token.token, token.token_id.clone(), value)?;
    }
    Ok(balances)
}

/// Fiat movements of a range, grouped by kind.
#[derive(Debug, Clone, Default)]
pub struct RangeMovements {
    pub deposits: FiatBalances,
    pub withdrawals: FiatBalances,
    pub borrows: FiatBalances,
    pub repays: FiatBalances,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTokenProfit {
    #[serde(flatten)]
    pub token: Erc20Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub start_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub end_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub profit: Decimal,
}

/// Profit of each protocol token between two snapshots.
///
/// For supply-like products the profit is
/// `end - start + withdrawals - deposits`. Debt grows against the user, so borrow
/// products use `start - end + borrows - repays`.
pub fn calculate_profits(
    position_type: PositionType,
    start: &FiatBalances,
    end: &FiatBalances,
    movements: &RangeMovements,
) -> Result<Vec<ProtocolTokenProfit>> {
    let keys: BTreeSet<&PositionKey> = start
        .keys()
        .chain(end.keys())
        .chain(movements.deposits.keys())
        .chain(movements.withdrawals.keys())
        .chain(movements.borrows.keys())
        .chain(movements.repays.keys())
        .collect();

    let value = |balances: &FiatBalances, key: &PositionKey| {
        balances.get(key).map_or(Decimal::ZERO, |balance| balance.fiat_value)
    };

    keys.into_iter()
        .filter_map(|key| {
            let token = [
                start,
                end,
                &movements.deposits,
                &movements.withdrawals,
                &movements.borrows,
                &movements.repays,
            ]
            .into_iter()
            .find_map(|balances| balances.get(key))?
            .token
            .clone();
            Some((key, token))
        })
        .map(|(key, token)| {
            let start_value = value(start, key);
            let end_value = value(end, key);
            let change = checked_sub(end_value, start_value)?;
            let profit = match position_type {
                PositionType::Borrow => checked_sub(
                    checked_add(-change, value(&movements.borrows, key))?,
                    value(&movements.repays, key),
                )?,
                _ => checked_sub(
                    checked_add(change, value(&movements.withdrawals, key))?,
                    value(&movements.deposits, key),
                )?,
            };
            Ok(ProtocolTokenProfit {
                token,
                token_id: key.token_id.clone(),
                start_value,
                end_value,
                profit,
            })
        })
        .collect()
}

fn add(
    balances: &mut FiatBalances,
    token: &Erc20Metadata,
    token_id: Option<String>,
    value: Decimal,
) -> Result<()> {
    let key = PositionKey {
        address: token.address,
        token_id: token_id.clone(),
    };
    match balances.get_mut(&key) {
        Some(balance) => balance.fiat_value = checked_add(balance.fiat_value, value)?,
        None => {
            balances.insert(
                key,
                FiatBalance {
                    token: token.clone(),
                    token_id,
                    fiat_value: value,
                },
            );
        }
    }
    Ok(())
}

fn node_value(node: &Underlying) -> Result<Decimal> {
    tree_value(node.token.address, node.balance_raw, node.token.decimals, &node.tokens)
}

fn tree_value(
    address: Address,
    balance_raw: U256,
    decimals: u8,
    tokens: &[Underlying],
) -> Result<Decimal> {
    if let Some(price) = tokens.iter().find(|t| t.token_type == TokenType::Fiat) {
        let amount = try_from_wei(balance_raw, decimals.into())?;
        let price_value = try_from_wei(price.balance_raw, price.token.decimals.into())?;
        return amount
            .checked_mul(price_value)
            .ok_or_else(|| Error::Math(format!("fiat value of {address} overflows")));
    }

    let mut children = tokens.iter().peekable();
    if children.peek().is_none() {
        return Err(Error::MissingFiatLeaf(address));
    }
    children.try_fold(Decimal::ZERO, |sum, child| checked_add(sum, node_value(child)?))
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::Math(format!("{a} + {b} overflows")))
}

fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| Error::Math(format!("{a} - {b} overflows")))
}
