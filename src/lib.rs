//! Compression and decompression of APEX containers.
//!
//! A compressed APEX (CAPEX) keeps the small metadata entries stored and
//! readable, records the payload digest in its manifest, and carries the
//! whole original APEX as a single deflated `original_apex` entry.

pub mod apex_zip;
pub mod cli;
pub mod compressor;
pub mod config;
pub mod decompressor;
pub mod digest;
pub mod error;
pub mod manifest;
mod utils;

use std::path::Path;

pub use apex_zip::ApexType;
pub use compressor::Compressor;
pub use config::Config;
pub use decompressor::Decompressor;
pub use error::{ApexError, Result};

use apex_zip::ApexFile;
use utils::read_file;

/// Compresses with the default configuration (native AVB footer reader).
pub fn compress(input: &Path, output: &Path) -> Result<()> {
    Compressor::from_config(Config::default()).compress(input, output)
}

pub fn decompress(input: &Path, output: &Path) -> Result<()> {
    Decompressor::new(Config::default()).decompress(input, output)
}

/// COMPRESSED iff the container has an `original_apex` entry.
pub fn classify(path: &Path) -> Result<ApexType> {
    let data = read_file(path)?;
    Ok(ApexFile::from(path, &data)?.apex_type())
}

/// The raw `apex_manifest.pb` of an APEX or CAPEX.
pub fn read_manifest(path: &Path) -> Result<Vec<u8>> {
    let data = read_file(path)?;
    ApexFile::from(path, &data)?.get_manifest()
}
