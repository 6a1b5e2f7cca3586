use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

use crate::utils::process;

/// Base name of the generated key files inside the keys scratch directory.
const KEY_FILE_NAME: &str = "sokey";

/// An SSH keypair staged for template injection. The private half travels
/// base64-encoded so it can be embedded verbatim in rendered text files.
#[derive(Debug, Clone, Serialize)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl Keypair {
    /// Generate a passphrase-less 4096-bit RSA keypair into `keys_dir` and
    /// load both halves.
    pub async fn generate(keys_dir: &Path) -> Result<Self> {
        info!("Generating ssh keys");

        let key_path = keys_dir.join(KEY_FILE_NAME);
        process::run_stage(
            "ssh-keygen",
            Command::new("ssh-keygen")
                .args(["-q", "-t", "rsa", "-b", "4096", "-N", ""])
                .arg("-f")
                .arg(&key_path),
        )
        .await?;

        let keypair = Self::load(&key_path)?;
        info!("Good generation");
        Ok(keypair)
    }

    /// Load a keypair from `<key_path>` and `<key_path>.pub`.
    pub fn load(key_path: &Path) -> Result<Self> {
        let private = std::fs::read(key_path)
            .with_context(|| format!("Failed to read private key: {}", key_path.display()))?;

        let public_path = key_path.with_extension("pub");
        let public_key = std::fs::read_to_string(&public_path)
            .with_context(|| format!("Failed to read public key: {}", public_path.display()))?;

        Ok(Self {
            public_key,
            private_key: STANDARD.encode(private),
        })
    }
}
