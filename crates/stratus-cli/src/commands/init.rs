use std::path::Path;

use anyhow::bail;
use stratus_core::StratusConfig;

pub fn init(config_path: &Path, state_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    let config = StratusConfig::scaffold(state_path);
    std::fs::write(config_path, config.to_toml_string()?)?;
    println!("✓ Generated {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_parseable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratus.toml");

        init(&path, Path::new("prod.tfstate")).unwrap();
        let config = StratusConfig::from_file(&path).unwrap();
        assert_eq!(config.state.path, Path::new("prod.tfstate"));

        assert!(init(&path, Path::new("other.tfstate")).is_err());
    }
}
