use std::path::{Path, PathBuf};
use crate::digest::{AvbFooterVerifier, AvbtoolVerifier, PayloadVerifier};
use crate::manifest::{ConvApexManifestCodec, ManifestCodec, TextFormatCodec};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;
pub const DEFAULT_ALIGNMENT: usize = 4096;
pub const AVBTOOL: &str = "avbtool";
pub const CONV_APEX_MANIFEST: &str = "conv_apex_manifest";

/// Everything the transcoder needs to know about its environment. Helper
/// tools are named explicitly here; when absent, native implementations are
/// used instead.
#[derive(Clone, Debug)]
pub struct Config {
    /// `avbtool` binary used to read payload digests.
    pub avbtool: Option<PathBuf>,
    /// `conv_apex_manifest` binary used to print manifests.
    pub conv_apex_manifest: Option<PathBuf>,
    /// Deflate level for `original_apex`, 0..=9.
    pub compression_level: u32,
    /// Alignment of stored entry data inside the CAPEX, at most 65536.
    pub alignment: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            avbtool: None,
            conv_apex_manifest: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl Config {
    /// Picks up `avbtool` and `conv_apex_manifest` from `dir` when they exist
    /// there. Tools already configured are left alone.
    pub fn with_tool_dir(mut self, dir: &Path) -> Self {
        if self.avbtool.is_none() {
            self.avbtool = Some(dir.join(AVBTOOL)).filter(|p| p.is_file());
        }
        if self.conv_apex_manifest.is_none() {
            self.conv_apex_manifest = Some(dir.join(CONV_APEX_MANIFEST)).filter(|p| p.is_file());
        }
        self
    }

    pub fn verifier(&self) -> Box<dyn PayloadVerifier> {
        match &self.avbtool {
            Some(tool) => Box::new(AvbtoolVerifier::new(tool)),
            None => Box::new(AvbFooterVerifier),
        }
    }

    pub fn manifest_codec(&self) -> Box<dyn ManifestCodec> {
        match &self.conv_apex_manifest {
            Some(tool) => Box::new(ConvApexManifestCodec::new(tool)),
            None => Box::new(TextFormatCodec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_with_tool_dir_only_takes_existing_tools() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(AVBTOOL), b"#!/bin/sh\n").unwrap();
        let config = Config::default().with_tool_dir(dir.path());
        assert_eq!(config.avbtool, Some(dir.path().join(AVBTOOL)));
        assert_eq!(config.conv_apex_manifest, None);
    }

    #[test]
    fn test_explicit_tool_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(AVBTOOL), b"").unwrap();
        let config = Config {
            avbtool: Some(PathBuf::from("/opt/avbtool")),
            ..Config::default()
        }
        .with_tool_dir(dir.path());
        assert_eq!(config.avbtool, Some(PathBuf::from("/opt/avbtool")));
    }
}
