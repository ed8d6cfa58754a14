use std::path::{Path, PathBuf};
use std::process::Command;
use crate::digest::{parse_partition_digests, PartitionDigest, PayloadVerifier};
use crate::error::{ApexError, Result};

/// Runs `avbtool print_partition_digests --image <path>`.
#[derive(Debug, Clone)]
pub struct AvbtoolVerifier {
    tool: PathBuf,
}

impl AvbtoolVerifier {
    pub fn new(tool: impl Into<PathBuf>) -> AvbtoolVerifier {
        AvbtoolVerifier { tool: tool.into() }
    }
}

impl PayloadVerifier for AvbtoolVerifier {
    fn partition_digests(&self, image: &Path) -> Result<Vec<PartitionDigest>> {
        tracing::debug!("running {} print_partition_digests --image {}", self.tool.display(), image.display());
        let output = Command::new(&self.tool)
            .arg("print_partition_digests")
            .arg("--image")
            .arg(image)
            .output()
            .map_err(|e| ApexError::DigestUnavailable(format!("failed to run {}: {}", self.tool.display(), e)))?;
        if !output.status.success() {
            return Err(ApexError::DigestUnavailable(format!(
                "{} exited with {}: {}",
                self.tool.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_partition_digests(&String::from_utf8_lossy(&output.stdout))
    }
}
