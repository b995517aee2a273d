//! Composition layers over [`Adapter`](crate::Adapter)s.
//!
//! - [`cache`]: protocol token lists persisted in a metadata store
//! - [`rewards`]: claimable rewards of a second adapter merged into positions
//! - [`resolve`]: nested protocol tokens expanded down to their leaf underlyings

pub mod cache;
pub mod resolve;
pub mod rewards;

pub use cache::{Cached, JsonFileStore, MemoryStore, MetadataKey, MetadataStore, ProtocolTokenCache};
pub use resolve::{
    ResolveOptions, resolve_underlying_movements, resolve_underlying_positions,
    resolve_underlying_rates,
};
pub use rewards::WithClaimableRewards;
