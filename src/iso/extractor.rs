use anyhow::{Context as _, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::core::workspace::Workspace;
use crate::error::BuildError;
use crate::utils::process;

pub struct IsoExtractor;

impl IsoExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Mount the source image read-only, copy its tree into the working
    /// directory, and unpack the boot archive into the initrd tree. Each
    /// step blocks until its external process completes; the mount stays
    /// active until workspace teardown.
    pub async fn extract(&self, iso_path: &Path, workspace: &Workspace) -> Result<()> {
        if !iso_path.exists() {
            return Err(BuildError::MissingFile(iso_path.to_path_buf()).into());
        }

        info!("Mounting source image");
        process::run_stage(
            "mount",
            Command::new("mount")
                .args(["-o", "loop,ro"])
                .arg(iso_path)
                .arg(workspace.mount_point()),
        )
        .await?;
        info!("Good mount");

        info!("Copying files over to working directory");
        // --inplace keeps a retried copy from corrupting files that already
        // transferred.
        let mut source = workspace.mount_point().as_os_str().to_os_string();
        source.push("/");
        process::run_stage(
            "rsync",
            Command::new("rsync")
                .args(["-a", "--inplace"])
                .arg(&source)
                .arg(workspace.working_dir()),
        )
        .await?;
        info!("Good copy");

        info!("Extracting initrd");
        self.unpack_initrd(workspace).await?;
        info!("Good extraction");

        Ok(())
    }

    /// Stream the boot archive through `xz -dc` into `cpio -idm` rooted at
    /// the initrd scratch tree, preserving member structure and attributes.
    async fn unpack_initrd(&self, workspace: &Workspace) -> Result<()> {
        let initrd_img = workspace.working_dir().join(super::INITRD_NAME);
        let archive = std::fs::File::open(&initrd_img)
            .with_context(|| format!("Failed to open boot archive: {}", initrd_img.display()))?;

        let mut xz = Command::new("xz")
            .arg("-dc")
            .stdin(Stdio::from(archive))
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| BuildError::SpawnFailed {
                stage: "xz -dc",
                source,
            })?;

        let decompressed: Stdio = xz
            .stdout
            .take()
            .expect("xz stdout piped")
            .try_into()
            .context("Failed to wire xz output into cpio")?;

        let mut cpio = Command::new("cpio")
            .args(["-idm"])
            .current_dir(workspace.initrd_dir())
            .stdin(decompressed)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| BuildError::SpawnFailed {
                stage: "cpio -idm",
                source,
            })?;

        let (xz_status, cpio_status) = tokio::join!(xz.wait(), cpio.wait());
        let xz_status = xz_status.context("Failed waiting for xz")?;
        let cpio_status = cpio_status.context("Failed waiting for cpio")?;

        if !xz_status.success() {
            return Err(BuildError::StageFailed {
                stage: "xz -dc",
                status: xz_status,
            }
            .into());
        }
        if !cpio_status.success() {
            return Err(BuildError::StageFailed {
                stage: "cpio -idm",
                status: cpio_status,
            }
            .into());
        }
        Ok(())
    }
}
