use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write the full contents to `path`, creating parent directories as
/// needed, and flush before returning.
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    debug!("Writing file: {}", path.display());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create parent directory: {}", parent.display())
        })?;
    }

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("Failed to flush file: {}", path.display()))?;

    Ok(())
}
