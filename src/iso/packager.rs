use anyhow::{Context as _, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;
use walkdir::WalkDir;

use crate::core::workspace::Workspace;
use crate::error::BuildError;
use crate::utils::process;

/// Hybrid-MBR boot sector template for BIOS/USB boot paths.
pub const ISOHYBRID_MBR: &str = "/usr/share/syslinux/isohdpfx.bin";

/// Volume label the stock installer image carries; boot entries reference
/// it by name, so the authored image keeps it.
const VOLUME_LABEL: &str = "CentOS 7 x86_64";

pub struct IsoPackager;

impl IsoPackager {
    pub fn new() -> Self {
        Self
    }

    /// Re-encode the boot archive from the initrd tree, then author the
    /// output image from the working tree.
    pub async fn repack(&self, workspace: &Workspace, output_path: &Path) -> Result<()> {
        info!("Repacking initrd");
        self.repack_initrd(workspace).await?;
        info!("Repacked");

        info!("Building ISO");
        self.author_iso(workspace.working_dir(), output_path).await?;
        Ok(())
    }

    /// Stream the initrd tree's member list through `cpio -o -H newc` into
    /// `xz -1 --format=lzma`, overwriting the working tree's boot archive.
    /// The lowest compression level trades size for build speed.
    async fn repack_initrd(&self, workspace: &Workspace) -> Result<()> {
        let root = workspace.initrd_dir();
        let member_list = archive_members(root)?;

        let archive_path = workspace.working_dir().join(super::INITRD_NAME);
        let archive = std::fs::File::create(&archive_path)
            .with_context(|| format!("Failed to create boot archive: {}", archive_path.display()))?;

        let mut cpio = Command::new("cpio")
            .args(["-o", "-H", "newc", "--null"])
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| BuildError::SpawnFailed {
                stage: "cpio -o",
                source,
            })?;

        let member_stream: Stdio = cpio
            .stdout
            .take()
            .expect("cpio stdout piped")
            .try_into()
            .context("Failed to wire cpio output into xz")?;

        let mut xz = Command::new("xz")
            .args(["-1", "--format=lzma", "-c"])
            .stdin(member_stream)
            .stdout(Stdio::from(archive))
            .spawn()
            .map_err(|source| BuildError::SpawnFailed {
                stage: "xz -1",
                source,
            })?;

        let mut stdin = cpio.stdin.take().expect("cpio stdin piped");
        stdin
            .write_all(&member_list)
            .await
            .context("Failed to stream member list to cpio")?;
        drop(stdin);

        let (cpio_status, xz_status) = tokio::join!(cpio.wait(), xz.wait());
        let cpio_status = cpio_status.context("Failed waiting for cpio")?;
        let xz_status = xz_status.context("Failed waiting for xz")?;

        if !cpio_status.success() {
            return Err(BuildError::StageFailed {
                stage: "cpio -o",
                status: cpio_status,
            }
            .into());
        }
        if !xz_status.success() {
            return Err(BuildError::StageFailed {
                stage: "xz -1",
                status: xz_status,
            }
            .into());
        }
        Ok(())
    }

    /// Author a hybrid BIOS/EFI-bootable, Joliet- and Rock-Ridge-extended
    /// image from the working tree. The El Torito parameters mirror the
    /// stock image so the result boots on the same targets.
    async fn author_iso(&self, tree: &Path, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }

        let mut cmd = Command::new("xorriso");
        cmd.args(["-as", "mkisofs", "-r", "-o"])
            .arg(output_path)
            .args(["-J", "-joliet-long"])
            .args(["-b", "isolinux.bin", "-c", "boot.cat"])
            .args(["-boot-load-size", "4", "-boot-info-table", "-no-emul-boot"])
            .args(["-T", "-R", "-v", "-l", "-iso-level", "3"])
            .args(["-eltorito-alt-boot"])
            .args(["-isohybrid-mbr", ISOHYBRID_MBR])
            .args(["-V", VOLUME_LABEL])
            .arg(tree);

        process::run_stage("xorriso", &mut cmd).await?;
        Ok(())
    }
}

/// NUL-separated member paths of the archive, relative to `root`, in
/// `./path` form. Symbolic links are listed as themselves, never followed.
fn archive_members(root: &Path) -> Result<Vec<u8>> {
    let mut list = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.context("Failed to walk initrd tree")?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields children of root");
        if relative.as_os_str().is_empty() {
            // the root itself
            continue;
        }
        list.extend_from_slice(b"./");
        list.extend_from_slice(relative.as_os_str().as_encoded_bytes());
        list.push(0);
    }
    Ok(list)
}
