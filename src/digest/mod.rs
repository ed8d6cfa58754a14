//! Payload digest: the fingerprint recorded in the payload image's own AVB
//! metadata rather than a hash of the raw file.

mod avb;
mod avbtool;

use std::path::Path;
use crate::error::{ApexError, Result};

pub use avb::{read_partition_digests, AvbFooterVerifier};
pub use avbtool::AvbtoolVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDigest {
    pub name: String,
    pub digest: String,
}

/// Reports the digest of every partition described by a payload image.
pub trait PayloadVerifier: Send + Sync {
    fn partition_digests(&self, image: &Path) -> Result<Vec<PartitionDigest>>;
}

/// Parses `<name>: <value>` lines as printed by `avbtool print_partition_digests`.
pub fn parse_partition_digests(text: &str) -> Result<Vec<PartitionDigest>> {
    let mut res = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (name, digest) = line.split_once(": ")
            .ok_or_else(|| ApexError::DigestUnavailable(format!("unexpected verifier output line '{}'", line)))?;
        let digest = digest.trim();
        if digest.is_empty() {
            return Err(ApexError::DigestUnavailable(format!("empty digest for partition '{}'", name)));
        }
        res.push(PartitionDigest {
            name: name.trim().to_string(),
            digest: digest.to_string(),
        });
    }
    Ok(res)
}

/// Digest of `image`. Prefers the partition named `partition_hint`, falling
/// back to the first one the verifier reports.
pub fn digest_of(verifier: &dyn PayloadVerifier, image: &Path, partition_hint: Option<&str>) -> Result<String> {
    let digests = verifier.partition_digests(image)?;
    let chosen = partition_hint
        .and_then(|hint| digests.iter().find(|d| d.name == hint))
        .or_else(|| digests.first())
        .ok_or_else(|| ApexError::DigestUnavailable(format!("no partition digests in {}", image.display())))?;
    tracing::debug!("payload digest for partition {}: {}", chosen.name, chosen.digest);
    Ok(chosen.digest.clone())
}
