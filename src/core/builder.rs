use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::core::renderer::ProvisioningRenderer;
use crate::core::workspace::Workspace;
use crate::error::BuildError;
use crate::iso::{packager::ISOHYBRID_MBR, IsoExtractor, IsoPackager};
use crate::utils::{process, ChecksumVerifier};

/// SHA-1 fingerprint of the supported upstream installer image.
pub const SOURCE_ISO_SHA1: &str = "14e842e39edbb55a104263281cf25bf88a2e9d67";

/// External tools every build invokes.
const REQUIRED_TOOLS: &[&str] = &["mount", "umount", "rsync", "xz", "cpio", "xorriso"];

pub struct Builder {
    config: Config,
    source_iso: PathBuf,
    output_path: PathBuf,
    templates_dir: PathBuf,
    partition_tables_dir: PathBuf,
    expected_sha1: String,
    keep_workspace: bool,
    checksum_verifier: ChecksumVerifier,
    extractor: IsoExtractor,
    packager: IsoPackager,
}

impl Builder {
    pub fn new(config: Config, source_iso: PathBuf, output_path: PathBuf) -> Self {
        Self {
            config,
            source_iso,
            output_path,
            templates_dir: PathBuf::from("templates"),
            partition_tables_dir: PathBuf::from("partition_tables"),
            expected_sha1: SOURCE_ISO_SHA1.to_string(),
            keep_workspace: false,
            checksum_verifier: ChecksumVerifier::new(),
            extractor: IsoExtractor::new(),
            packager: IsoPackager::new(),
        }
    }

    pub fn set_keep_workspace(&mut self, keep: bool) {
        self.keep_workspace = keep;
    }

    pub fn set_templates_dir(&mut self, dir: PathBuf) {
        self.templates_dir = dir;
    }

    pub fn set_partition_tables_dir(&mut self, dir: PathBuf) {
        self.partition_tables_dir = dir;
    }

    pub fn set_expected_sha1(&mut self, sha1: String) {
        self.expected_sha1 = sha1;
    }

    pub async fn build(&self) -> Result<()> {
        info!("Starting build from {}", self.source_iso.display());

        // An unverified image is never mounted or modified.
        self.checksum_verifier
            .verify_file(&self.source_iso, &self.expected_sha1)
            .context("Source image verification failed")?;

        self.check_prerequisites()?;

        let mut renderer =
            ProvisioningRenderer::new(&self.templates_dir, &self.partition_tables_dir)?;

        let workspace = Workspace::allocate()?;
        let result = self.run_stages(&mut renderer, &workspace).await;

        if self.keep_workspace {
            info!("Leaving workspace in place as requested");
            workspace.persist();
        } else {
            workspace.teardown().await;
        }

        result?;
        info!("Done, ISO should be at {}", self.output_path.display());
        Ok(())
    }

    async fn run_stages(
        &self,
        renderer: &mut ProvisioningRenderer,
        workspace: &Workspace,
    ) -> Result<()> {
        self.extractor.extract(&self.source_iso, workspace).await?;
        renderer.render_all(&self.config, workspace).await?;
        self.packager.repack(workspace, &self.output_path).await?;
        Ok(())
    }

    /// Fail before any mount if a required tool or reference file is absent.
    fn check_prerequisites(&self) -> Result<()> {
        for tool in REQUIRED_TOOLS {
            process::require_tool(tool)?;
        }
        if self.config.inject_ssh_keys {
            process::require_tool("ssh-keygen")?;
        }
        if !Path::new(ISOHYBRID_MBR).is_file() {
            return Err(BuildError::MissingFile(PathBuf::from(ISOHYBRID_MBR)).into());
        }
        if !self.templates_dir.is_dir() {
            return Err(BuildError::MissingFile(self.templates_dir.clone()).into());
        }
        Ok(())
    }
}
