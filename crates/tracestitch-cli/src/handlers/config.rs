use anyhow::{Context, Result};
use std::path::Path;

use tracestitch_runtime::Config;

/// Print the configuration in effect: the file if present, else defaults
pub fn show(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    print!("{}", config.to_toml()?);
    Ok(())
}

pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default().save_to(config_path)?;
    println!("Config written to {}", config_path.display());
    Ok(())
}
