use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub mod schema;
pub mod validation;

pub use schema::{Config, HostRecord, Role};

/// Load, parse, and validate a configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    info!("Loading configuration from {}", path.display());

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse YAML in config file: {}", path.display()))?;

    validation::validate_config_structure(&config)
        .with_context(|| format!("Invalid configuration in file: {}", path.display()))?;

    debug!("Loaded {} host(s)", config.host_count());
    Ok(config)
}

/// Validate a configuration file without building anything.
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<()> {
    load_config(path)?;
    info!("Configuration file is valid");
    Ok(())
}
