//! stratus-core — shared types for Stratus state backends.
//!
//! Defines the store contract every backend implements, the
//! [`StateDocument`]/[`StateCodec`] pair backends use to treat the state as
//! an opaque versioned blob, and the `stratus.toml` config.

pub mod config;
pub mod contract;
pub mod state;

pub use config::{ConfigError, StratusConfig};
pub use contract::*;
pub use state::{CodecError, JsonCodec, State, StateCodec, StateDocument, STATE_VERSION};
