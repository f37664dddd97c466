//! Where the simulation configuration comes from.
//!
//! Precedence, lowest first: built-in defaults, the config file,
//! `GF_SPACE_SIZE` from the environment, then `--set key=value` overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use graphfield_layout::SimulationConfig;

/// Environment variable overriding the space size.
pub const SPACE_SIZE_ENV: &str = "GF_SPACE_SIZE";

/// Default location of the config file.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "graphfield", "gf").map(|dirs| dirs.config_dir().join("config.json"))
}

/// The config file in use: `--config` if given, the platform default otherwise.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(default_config_path)
}

/// The file configuration alone, defaults when the file does not exist.
pub fn load_file(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        Some(path) if path.exists() => SimulationConfig::load(path)
            .with_context(|| format!("Failed to read config from {}", path.display())),
        _ => Ok(SimulationConfig::default()),
    }
}

/// The effective configuration for a command.
pub fn load(path: Option<&Path>, overrides: &[String]) -> Result<SimulationConfig> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    let mut config = load_file(path)?;

    if let Ok(space_size) = std::env::var(SPACE_SIZE_ENV) {
        config
            .set("spaceSize", &space_size)
            .with_context(|| format!("Invalid {}", SPACE_SIZE_ENV))?;
    }

    for pair in overrides {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Override must be key=value, got {}", pair))?;
        config
            .set(key.trim(), value.trim())
            .with_context(|| format!("Invalid override {}", pair))?;
    }

    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
pub fn save(config: &SimulationConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_overrides_apply_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let file = SimulationConfig {
            gravity: 0.5,
            repulsion: 2.0,
            ..Default::default()
        };
        save(&file, &path).unwrap();

        let config = load(Some(&path), &["repulsion=3".to_string()]).unwrap();
        assert_eq!(config.gravity, 0.5);
        assert_eq!(config.repulsion, 3.0);
    }

    #[test]
    fn test_malformed_override_is_rejected() {
        assert!(load(None, &["gravity".to_string()]).is_err());
        assert!(load(None, &["noSuchOption=1".to_string()]).is_err());
    }
}
