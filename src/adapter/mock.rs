//! In-memory adapter used by the controller and decorator tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::{Adapter, helpers};
use crate::{Chain, Protocol, error::Result, types::*};

pub(crate) struct MockAdapter {
    pub chain: Chain,
    pub protocol: Protocol,
    pub product: &'static str,
    pub position_type: PositionType,
    pub settings: AdapterSettings,
    pub tokens: Vec<ProtocolToken>,
    pub positions: Vec<ProtocolPosition>,
    pub rates: HashMap<Address, UnwrapExchangeRate>,
    pub rewards: Vec<Underlying>,
    pub reward_withdrawals: Vec<MovementsByBlock>,
    pub withdrawals: Vec<MovementsByBlock>,
    pub token_calls: AtomicUsize,
    /// Makes `protocol_tokens` fail like an unreachable contract.
    pub broken: bool,
}

impl MockAdapter {
    pub fn new(chain: Chain, protocol: Protocol, product: &'static str) -> Self {
        Self {
            chain,
            protocol,
            product,
            position_type: PositionType::Supply,
            settings: AdapterSettings::default(),
            tokens: vec![],
            positions: vec![],
            rates: HashMap::new(),
            rewards: vec![],
            reward_withdrawals: vec![],
            withdrawals: vec![],
            token_calls: AtomicUsize::new(0),
            broken: false,
        }
    }

    pub fn with_token(mut self, token: ProtocolToken) -> Self {
        self.tokens.push(token);
        self
    }

    /// Unwraps `token` into each underlying at `rate` raw units per whole token.
    pub fn with_rate(mut self, token: &ProtocolToken, rate: u128) -> Self {
        let tokens = token
            .underlying_tokens
            .iter()
            .map(|u| UnwrappedTokenExchangeRate::new(u.clone(), U256::from(rate)))
            .collect();
        self.rates.insert(
            token.address(),
            UnwrapExchangeRate::new(token.token.clone(), tokens),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn product_id(&self) -> &'static str {
        self.product
    }

    fn settings(&self) -> AdapterSettings {
        self.settings
    }

    fn protocol_details(&self) -> ProtocolDetails {
        ProtocolDetails {
            protocol: self.protocol,
            name: "Mock".into(),
            description: "Mock adapter".into(),
            site_url: "https://example.org".into(),
            icon_url: "https://example.org/icon.png".into(),
            position_type: self.position_type,
            chain: self.chain,
            product_id: self.product.into(),
            asset_details: AssetDetails {
                asset_type: AssetType::StandardToken,
            },
        }
    }

    async fn protocol_tokens(&self) -> Result<Vec<ProtocolToken>> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(crate::Error::Rpc(alloy::transports::TransportErrorKind::custom_str(
                "execution reverted",
            )));
        }
        Ok(self.tokens.clone())
    }

    async fn positions(&self, input: &GetPositionsInput) -> Result<Vec<ProtocolPosition>> {
        let Some(filter) = &input.protocol_token_addresses else {
            return Ok(self.positions.clone());
        };
        Ok(self
            .positions
            .iter()
            .filter(|p| filter.contains(&p.token.address))
            .cloned()
            .collect())
    }

    async fn withdrawals(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Ok(self.withdrawals.clone())
    }

    async fn deposits(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Ok(vec![])
    }

    async fn total_value_locked(
        &self,
        _input: &GetTotalValueLockedInput,
    ) -> Result<Vec<ProtocolTokenTvl>> {
        Ok(vec![])
    }

    async fn unwrap(&self, input: &UnwrapInput) -> Result<UnwrapExchangeRate> {
        if let Some(rate) = self.rates.get(&input.protocol_token_address) {
            return Ok(rate.clone());
        }
        let token =
            helpers::find_protocol_token(self.chain, &self.tokens, input.protocol_token_address)?;
        Ok(helpers::one_to_one_rate(&token))
    }

    async fn reward_positions(&self, input: &GetRewardPositionsInput) -> Result<Vec<Underlying>> {
        helpers::find_protocol_token(self.chain, &self.tokens, input.protocol_token_address)?;
        Ok(self.rewards.clone())
    }

    async fn reward_withdrawals(&self, _input: &GetEventsInput) -> Result<Vec<MovementsByBlock>> {
        Ok(self.reward_withdrawals.clone())
    }
}
