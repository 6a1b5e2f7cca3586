use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::error::BuildError;

/// Resolve a required external tool on PATH.
pub fn require_tool(name: &str) -> Result<PathBuf, BuildError> {
    which::which(name).map_err(|_| BuildError::MissingTool(name.to_string()))
}

/// Run an external command to completion. A non-zero exit becomes an error
/// naming the failing stage.
pub async fn run_stage(stage: &'static str, command: &mut Command) -> Result<(), BuildError> {
    debug!("Running {}: {:?}", stage, command.as_std());

    let status = command
        .status()
        .await
        .map_err(|source| BuildError::SpawnFailed { stage, source })?;

    if status.success() {
        Ok(())
    } else {
        Err(BuildError::StageFailed { stage, status })
    }
}
