//! Config command implementation.
//!
//! Reads and edits the persisted simulation configuration by option name.

use std::path::Path;

use anyhow::Result;

use graphfield_layout::config::OPTION_NAMES;
use graphfield_layout::SimulationConfig;

use crate::config;

/// Show the effective configuration.
pub fn show(effective: &SimulationConfig, path: Option<&Path>) -> Result<()> {
    println!("graphfield simulation configuration");
    println!("{:-<40}", "");
    for name in OPTION_NAMES {
        println!(
            "{:<30} {}",
            name,
            effective.get(name).unwrap_or_default()
        );
    }
    if let Some(path) = path {
        println!("\nConfig file: {}", path.display());
    }
    Ok(())
}

/// Print one option of the effective configuration.
pub fn get(effective: &SimulationConfig, key: &str) -> Result<()> {
    let Some(value) = effective.get(key) else {
        anyhow::bail!(
            "Unknown config key: {}. Valid keys: {}",
            key,
            OPTION_NAMES.join(", ")
        );
    };
    println!("{}", value);
    Ok(())
}

/// Set one option in the config file. Environment and `--set` overrides
/// are not persisted.
pub fn set(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut file = config::load_file(Some(path))?;
    file.set(key, value)?;
    config::save(&file, path)?;
    println!("Set {} to: {}", key, file.get(key).unwrap_or_default());
    Ok(())
}

/// Reset the config file to defaults.
pub fn reset(path: &Path) -> Result<()> {
    config::save(&SimulationConfig::default(), path)?;
    println!("Configuration reset to defaults");
    Ok(())
}
