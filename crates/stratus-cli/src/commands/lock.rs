use anyhow::bail;
use stratus_core::StratusConfig;
use stratus_local::LockError;

pub fn status(config: &StratusConfig) -> anyhow::Result<()> {
    let local = super::open(config)?;
    match local.lock_info() {
        Ok(None) => println!("Unlocked: {}", config.state.path.display()),
        Ok(Some(info)) => {
            println!("Locked: {}", config.state.path.display());
            println!("  Reason:  {}", info.reason);
            println!("  Who:     {}", info.who);
            println!("  Created: {}", info.time);
            println!("  Expires: {} (advisory)", info.expires);
            println!("  ID:      {}", info.id);
        }
        Err(e @ LockError::LockedWithoutInfo { .. }) => println!("Locked: {e}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub fn force_unlock(config: &StratusConfig, force: bool) -> anyhow::Result<()> {
    if !force {
        bail!(
            "refusing to remove the lock on {} without --force; make sure the holder is no longer running",
            config.state.path.display()
        );
    }
    let local = super::open(config)?;
    if let Ok(Some(info)) = local.lock_info() {
        println!("Removing lock held by {} since {} ({})", info.who, info.time, info.reason);
    }
    local.force_unlock()?;
    println!("✓ Lock released");
    Ok(())
}
