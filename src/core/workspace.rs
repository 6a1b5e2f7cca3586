use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Scratch state for one build: the read-only source mount point, the
/// mutable working tree, the unpacked boot-archive tree, and the keypair
/// directory. Owned exclusively by a single build and released exactly
/// once, through `teardown` or `persist`.
pub struct Workspace {
    mount_point: Option<TempDir>,
    working_dir: Option<TempDir>,
    initrd_dir: Option<TempDir>,
    keys_dir: Option<TempDir>,
}

impl Workspace {
    /// Allocate all four scratch directories.
    pub fn allocate() -> Result<Self> {
        let scratch = |label: &str| {
            tempfile::Builder::new()
                .prefix(&format!("onion-farmer-{label}-"))
                .tempdir()
                .with_context(|| format!("Failed to allocate {label} scratch directory"))
        };

        let workspace = Self {
            mount_point: Some(scratch("mount")?),
            working_dir: Some(scratch("work")?),
            initrd_dir: Some(scratch("initrd")?),
            keys_dir: Some(scratch("keys")?),
        };
        debug!(
            "Workspace allocated: mount={} work={} initrd={} keys={}",
            workspace.mount_point().display(),
            workspace.working_dir().display(),
            workspace.initrd_dir().display(),
            workspace.keys_dir().display()
        );
        Ok(workspace)
    }

    pub fn mount_point(&self) -> &Path {
        self.mount_point.as_ref().expect("workspace released").path()
    }

    pub fn working_dir(&self) -> &Path {
        self.working_dir.as_ref().expect("workspace released").path()
    }

    pub fn initrd_dir(&self) -> &Path {
        self.initrd_dir.as_ref().expect("workspace released").path()
    }

    pub fn keys_dir(&self) -> &Path {
        self.keys_dir.as_ref().expect("workspace released").path()
    }

    /// Unmount the source image and remove every scratch directory.
    /// Best-effort: individual failures are logged and do not stop the
    /// remaining steps or mask the build result.
    pub async fn teardown(mut self) {
        info!("Cleaning up");
        self.unmount_source().await;

        for slot in [
            &mut self.working_dir,
            &mut self.initrd_dir,
            &mut self.keys_dir,
            &mut self.mount_point,
        ] {
            if let Some(dir) = slot.take() {
                let path = dir.path().to_path_buf();
                info!("Removing {}", path.display());
                if let Err(e) = dir.close() {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Leave every scratch directory (and the source mount) in place for
    /// post-hoc inspection.
    pub fn persist(mut self) {
        for slot in [
            &mut self.mount_point,
            &mut self.working_dir,
            &mut self.initrd_dir,
            &mut self.keys_dir,
        ] {
            if let Some(dir) = slot.take() {
                let kept = dir.keep();
                info!("Keeping {}", kept.display());
            }
        }
    }

    async fn unmount_source(&self) {
        let Some(mount) = self.mount_point.as_ref() else {
            return;
        };

        info!("Unmounting source image");
        match tokio::process::Command::new("umount")
            .arg(mount.path())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                info!("Good unmount");
            }
            Ok(output) => {
                // An already-unmounted source is a successful teardown.
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("not mounted") {
                    debug!("Source image already unmounted");
                } else {
                    warn!("umount {} failed: {}", mount.path().display(), stderr.trim());
                }
            }
            Err(e) => warn!("Failed to run umount: {}", e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Backstop for panic and early-drop paths; teardown() and persist()
        // empty the slots, so this fires only when neither ran. The scratch
        // directories themselves are removed by TempDir.
        if let Some(mount) = self.mount_point.as_ref() {
            let _ = std::process::Command::new("umount")
                .arg(mount.path())
                .output();
        }
    }
}
