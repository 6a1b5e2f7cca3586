use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use super::schema::{Config, Role};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid hostname {0:?}: must start alphanumeric and contain only [A-Za-z0-9._-]")]
    InvalidHostname(String),

    #[error("Duplicate hostname across roles: {0}")]
    DuplicateHostname(String),

    #[error("Invalid partition table reference {0:?}: must be a bare file name")]
    InvalidPartTableName(String),
}

/// Validate the structure of a configuration
pub fn validate_config_structure(config: &Config) -> Result<()> {
    debug!("Validating configuration structure");

    // Hostnames become artifact file names, so they must stay path-safe.
    let hostname_pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();

    let mut seen = HashSet::new();
    for role in Role::ALL {
        for host in config.hosts(role) {
            if host.hostname.is_empty() {
                return Err(anyhow!(ValidationError::MissingField(format!(
                    "{}[].hostname",
                    role
                ))));
            }
            if !hostname_pattern.is_match(&host.hostname) {
                return Err(anyhow!(ValidationError::InvalidHostname(
                    host.hostname.clone()
                )));
            }
            if !seen.insert(host.hostname.clone()) {
                return Err(anyhow!(ValidationError::DuplicateHostname(
                    host.hostname.clone()
                )));
            }
            if let Some(name) = &host.custom_part_table {
                if name.is_empty()
                    || name.contains('/')
                    || name.contains('\\')
                    || name.contains("..")
                {
                    return Err(anyhow!(ValidationError::InvalidPartTableName(name.clone())));
                }
            }
        }
    }

    if config.host_count() == 0 {
        warn!("No hosts configured. The output image will carry no kickstart files.");
    }

    Ok(())
}
