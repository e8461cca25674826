use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use stratus_core::{JsonCodec, StateCodec, StratusConfig};
use stratus_local::LocalState;
use tracing::{info, warn};

type Local = LocalState<JsonCodec>;

pub fn show(config: &StratusConfig) -> anyhow::Result<()> {
    let mut local = super::open(config)?;
    local.refresh_state()?;
    match local.state() {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => println!("No state."),
    }
    Ok(())
}

pub fn push(config: &StratusConfig, file: &Path, lock: bool, reason: &str) -> anyhow::Result<()> {
    let doc = {
        let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
        JsonCodec
            .decode(&mut BufReader::new(f))
            .with_context(|| format!("reading {}", file.display()))?
    };

    let mut local = super::open(config)?;
    let serial = locked(&mut local, lock && config.lock_enabled(), reason, |local| {
        // Establish the baseline the serial is compared against.
        local.refresh_state()?;
        local.write_state(Some(doc))?;
        Ok(local.state().map(|s| s.serial))
    })?;

    info!(path = %local.store().write_path().display(), ?serial, "state pushed");
    println!("✓ State written to {}", local.store().write_path().display());
    Ok(())
}

pub fn rm(config: &StratusConfig, lock: bool) -> anyhow::Result<()> {
    let mut local = super::open(config)?;
    locked(&mut local, lock && config.lock_enabled(), "rm", |local| {
        local.write_state(None)?;
        Ok(())
    })?;
    println!("✓ Removed {}", local.store().write_path().display());
    Ok(())
}

/// Run `f` with the state locked, releasing the lock whatever `f` returns.
fn locked<T>(
    local: &mut Local,
    enabled: bool,
    reason: &str,
    f: impl FnOnce(&mut Local) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let handle = if enabled { Some(local.lock(reason)?) } else { None };

    let result = f(local);

    if let Some(handle) = handle {
        if let Err(e) = local.unlock(handle) {
            if result.is_ok() {
                return Err(e.into());
            }
            warn!(error = %e, "failed to release state lock");
        }
    }
    result
}
