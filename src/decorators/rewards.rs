//! Claimable rewards merged into an adapter's results.
//!
//! Some products pay incentives through a separate contract: the position lives in
//! one adapter and its rewards in another. [`WithClaimableRewards`] presents the pair
//! as a single adapter.

use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use futures::future::{try_join, try_join_all};

use crate::{
    Chain, Protocol,
    adapter::Adapter,
    error::{Error, Result},
    types::*,
};

/// An adapter whose positions carry the claimable rewards reported by `rewards`.
pub struct WithClaimableRewards {
    inner: Arc<dyn Adapter>,
    rewards: Arc<dyn Adapter>,
}

impl WithClaimableRewards {
    pub fn new(inner: Arc<dyn Adapter>, rewards: Arc<dyn Adapter>) -> Self {
        Self { inner, rewards }
    }

    async fn rewards_of(
        &self,
        position: &ProtocolPosition,
        block_number: Option<u64>,
        user_address: Address,
    ) -> Result<Vec<Underlying>> {
        let input = GetRewardPositionsInput {
            user_address,
            protocol_token_address: position.token.address,
            block_number,
            token_id: position.token_id.clone(),
        };
        let rewards = self.rewards.reward_positions(&input).await?;
        Ok(rewards
            .into_iter()
            .filter(|reward| !reward.balance_raw.is_zero())
            .map(|reward| Underlying {
                token_type: TokenType::Reward,
                ..reward
            })
            .collect())
    }
}

#[async_trait]
impl Adapter for WithClaimableRewards {
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
        self.inner.protocol_tokens().await
    }

    async fn fetch_protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.inner.fetch_protocol_tokens().await
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        let positions = self.inner.positions(input).await?;
        try_join_all(positions.into_iter().map(|mut position| async move {
            let rewards = self
                .rewards_of(&position, input.block_number, input.user_address)
                .await?;
            if !rewards.is_empty() {
                log::debug!(
                    "{} claimable rewards for {} on {}",
                    rewards.len(),
                    position.token.symbol,
                    self.chain()
                );
            }
            position.tokens.extend(rewards);
            Ok::<_, Error>(position)
        }))
        .await
    }

    async fn withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        let (mut withdrawals, rewards) = try_join(
            self.inner.withdrawals(input),
            self.rewards.reward_withdrawals(input),
        )
        .await?;
        withdrawals.extend(rewards);
        withdrawals.sort_by_key(|movement| movement.block_number);
        Ok(withdrawals)
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
        self.rewards.reward_positions(input).await
    }

    async fn reward_withdrawals(&self, input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        self.rewards.reward_withdrawals(input).await
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256, address};

    use super::*;
    use crate::adapter::mock::MockAdapter;

    const CTOKEN: Address = address!("0x39AA39c021dfbaE8faC545936693aC917d5E7563");
    const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
    const COMP: Address = address!("0xc00e94Cb662C3520282E6f5717214004A7f26888");
    const USER: Address = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");

    fn ctoken() -> ProtocolToken {
        ProtocolToken::new(
            Erc20Metadata::new(CTOKEN, "Compound USD Coin", "cUSDC", 8),
            vec![Erc20Metadata::new(USDC, "USD Coin", "USDC", 6)],
        )
    }

    fn comp(amount: u64) -> Underlying {
        Underlying::new(
            Erc20Metadata::new(COMP, "Compound", "COMP", 18),
            U256::from(amount),
            TokenType::Underlying,
        )
    }

    fn movement(block_number: u64, token: Erc20Metadata) -> MovementsByBlock {
        MovementsByBlock {
            protocol_token: MovementToken {
                token: token.clone(),
                token_id: None,
            },
            tokens: vec![Underlying::new(token, U256::from(1u64), TokenType::Underlying)],
            block_number,
            transaction_hash: B256::ZERO,
        }
    }

    fn pair(rewards: Vec<Underlying>) -> WithClaimableRewards {
        let mut inner = MockAdapter::new(Chain::Ethereum, Protocol::CompoundV2, "supply-market")
            .with_token(ctoken());
        inner.positions = vec![ProtocolPosition::new(
            ctoken().token,
            U256::from(5_000_000_000u64),
            vec![],
        )];
        inner.withdrawals = vec![movement(20, ctoken().token)];

        let mut rewards_adapter =
            MockAdapter::new(Chain::Ethereum, Protocol::CompoundV2, "rewards").with_token(ctoken());
        rewards_adapter.rewards = rewards;
        rewards_adapter.reward_withdrawals = vec![movement(10, comp(0).token)];

        WithClaimableRewards::new(Arc::new(inner), Arc::new(rewards_adapter))
    }

    #[tokio::test]
    async fn test_positions_carry_rewards() {
        let adapter = pair(vec![comp(42), comp(0)]);
        let positions = adapter.positions(&GetPositionsInput::new(USER)).await.unwrap();

        assert_eq!(positions.len(), 1);
        let rewards = &positions[0].tokens;
        assert_eq!(rewards.len(), 1, "zero rewards are dropped");
        assert_eq!(rewards[0].token_type, TokenType::Reward);
        assert_eq!(rewards[0].balance_raw, U256::from(42u64));
        assert_eq!(adapter.product_id(), "supply-market");
    }

    #[tokio::test]
    async fn test_withdrawals_include_reward_claims() {
        let adapter = pair(vec![]);
        let input = GetEventsInput {
            user_address: USER,
            protocol_token_address: CTOKEN,
            from_block: 0,
            to_block: 100,
            token_id: None,
        };
        let withdrawals = adapter.withdrawals(&input).await.unwrap();
        let blocks: Vec<_> = withdrawals.iter().map(|w| w.block_number).collect();
        assert_eq!(blocks, [10, 20]);
        assert_eq!(withdrawals[0].protocol_token.token.symbol, "COMP");
    }
}
