pub mod init;
pub mod lock;
pub mod state;

use std::path::Path;

use anyhow::Context;
use stratus_core::{JsonCodec, StratusConfig};
use stratus_local::LocalState;

/// Read stratus.toml, or build a default config around `state_override`.
pub fn load_config(path: &Path, state_override: Option<&Path>) -> anyhow::Result<StratusConfig> {
    let mut config = match (StratusConfig::from_file(path), state_override) {
        (Ok(config), _) => config,
        (Err(_), Some(state)) if !path.exists() => StratusConfig::scaffold(state),
        (Err(e), _) => return Err(e).with_context(|| format!("loading {}", path.display())),
    };
    if let Some(state) = state_override {
        config.state.path = state.to_path_buf();
    }
    Ok(config)
}

pub fn open(config: &StratusConfig) -> anyhow::Result<LocalState<JsonCodec>> {
    Ok(LocalState::from_config(config, JsonCodec)?)
}
