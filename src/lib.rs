//! # defi-adapters
//!
//! Per-protocol adapters that read DeFi positions, rates and events from EVM chains and
//! report them in one normalized shape.
//!
//! Every product of every protocol (an Aave aToken, a Compound borrow market, a
//! MetaMorpho vault...) is an [`Adapter`]. The [`AdaptersController`] registers them per
//! chain and finds the adapter owning any protocol token, which lets the
//! [`decorators`] unwrap nested positions down to plain tokens and price them.
//!
//! ## Quick Navigation
//!
//! | Module | Description | Common Use Cases |
//! |--------|-------------|------------------|
//! | [`adapter`] | The [`Adapter`] trait and shared helpers | Implement a new protocol |
//! | [`adapters`] | Built-in protocol adapters | Aave v3, Compound v2, Morpho, Lido, Uniswap v3 |
//! | [`controller`] | Adapter registry | Look up adapters, protocol token ownership |
//! | [`decorators`] | Caching, rewards, underlying resolution | Full position trees |
//! | [`aggregate`] | Fiat valuation and profits | Portfolio value over a block range |
//! | [`math`] | Morpho share math, rate conversions | APY from on-chain rates |
//! | [`evm`] | Providers and ERC-20 helpers | Token metadata, wei conversions |
//!
//! ## Getting Started
//!
//! ```no_run
//! use defi_adapters::{
//!     AdaptersController, Chain, Config, GetPositionsInput, address,
//!     decorators::{ResolveOptions, resolve_underlying_positions},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?.with_chains(&[Chain::Ethereum]);
//!     let controller = AdaptersController::from_config(&config).await?;
//!
//!     let user = address!("0x30cb2c51fc4f031fa5f7d4f6dd1e6a35d1c3a71f");
//!     for adapter in controller.adapters_for(Chain::Ethereum) {
//!         let positions = match adapter.positions(&GetPositionsInput::new(user)).await {
//!             Ok(positions) => positions,
//!             Err(err) if err.is_not_implemented() => continue,
//!             Err(err) => return Err(err.into()),
//!         };
//!         let positions = resolve_underlying_positions(
//!             &controller,
//!             Chain::Ethereum,
//!             None,
//!             positions,
//!             ResolveOptions::default(),
//!         )
//!         .await?;
//!         println!("{}: {positions:#?}", adapter.protocol_details().name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Amounts
//!
//! Token amounts are raw [`U256`] integers in the token's smallest unit; exchange rates
//! are the underlying amount received for one whole protocol token. Conversions to
//! [`Decimal`] live in [`evm`]. APYs and APRs are plain `f64` fractions (`0.05` is 5%).
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never installs a
//! logger; the demos use `simple_logger`.

pub mod adapter;
pub mod adapters;
pub mod aggregate;
pub mod chain;
pub mod config;
pub mod controller;
pub mod decorators;
pub mod error;
pub mod evm;
pub mod math;
pub mod protocol;
pub mod types;

pub use adapter::{Adapter, AdapterContext, AdapterFactory};
/// Re-exported primitive types from Alloy.
pub use alloy::primitives::{Address, B256, U256, address};
pub use chain::Chain;
pub use config::Config;
pub use controller::AdaptersController;
pub use error::{Error, Result};
pub use protocol::Protocol;
/// Re-exported decimal type from rust_decimal.
pub use rust_decimal::{Decimal, dec};
pub use types::*;
