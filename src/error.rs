use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failures that abort a build outright.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Required host tool not found: {0}")]
    MissingTool(String),

    #[error("Required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(
        "Checksum mismatch for {}\nExpected:   {expected}\nCalculated: {calculated}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        calculated: String,
    },

    #[error("Failed to spawn {stage}: {source}")]
    SpawnFailed {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed with {status}")]
    StageFailed {
        stage: &'static str,
        status: ExitStatus,
    },
}
