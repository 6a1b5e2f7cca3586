use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::error::BuildError;

pub struct ChecksumVerifier;

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Compare a file's SHA-1 fingerprint against an expected hex digest,
    /// case-insensitively. Never mutates the file.
    pub fn verify_file(&self, file_path: &Path, expected: &str) -> Result<()> {
        info!("Verifying checksum for: {}", file_path.display());

        let calculated = self.calculate_sha1(file_path)?;
        debug!("Expected: {}, Calculated: {}", expected, calculated);

        if calculated.eq_ignore_ascii_case(expected) {
            info!("✓ Checksum verification passed");
            Ok(())
        } else {
            Err(BuildError::ChecksumMismatch {
                path: file_path.to_path_buf(),
                expected: expected.to_lowercase(),
                calculated,
            }
            .into())
        }
    }

    pub fn calculate_sha1(&self, file_path: &Path) -> Result<String> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let mut reader = BufReader::new(file);
        let mut buffer = vec![0; 8192];
        let mut hasher = Sha1::new();

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .context("Failed to read file data")?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}
