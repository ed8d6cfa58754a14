//! Error taxonomy for compress / decompress / classify.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApexError {
    /// Input archive is unreadable, corrupt, or lacks a required entry
    #[error("{}: malformed APEX container: {reason}", .path.display())]
    MalformedContainer { path: PathBuf, reason: String },

    /// Low-level zip structure error
    #[error("zip format error at: {offset}, reason: {reason}")]
    ContainerParse { offset: usize, reason: String },

    #[error("entry '{0}' not found in container")]
    EntryNotFound(String),

    #[error("failed to parse apex manifest: {0}")]
    ManifestParse(String),

    /// Decompression was requested for a container without `original_apex`
    #[error("{} is not a compressed APEX", .path.display())]
    NotCompressed { path: PathBuf },

    #[error("payload digest unavailable: {0}")]
    DigestUnavailable(String),

    #[error("failed to write '{}': {source}", .path.display())]
    ContainerWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read '{}': {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ApexError>;

impl ApexError {
    pub fn is_not_compressed(&self) -> bool {
        matches!(self, ApexError::NotCompressed { .. })
    }

    /// Only verifier failures are worth retrying; everything else is
    /// deterministic for a given input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApexError::DigestUnavailable(_))
    }

    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        ApexError::MalformedContainer {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        ApexError::ContainerParse {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: &Path, source: io::Error) -> Self {
        ApexError::ContainerWrite {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: io::Error) -> Self {
        ApexError::InputRead {
            path: path.to_path_buf(),
            source,
        }
    }
}
