use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::Path;
use crate::apex_zip::zip::ZipFile;
use crate::error::{ApexError, Result};

pub const APEX_MANIFEST_PB: &str = "apex_manifest.pb";
pub const APEX_MANIFEST_JSON: &str = "apex_manifest.json";
pub const APEX_PUBKEY: &str = "apex_pubkey";
pub const APEX_BUILD_INFO: &str = "apex_build_info.pb";
pub const ANDROID_MANIFEST: &str = "AndroidManifest.xml";
pub const APEX_PAYLOAD_IMG: &str = "apex_payload.img";
pub const APEX_PAYLOAD_ZIP: &str = "apex_payload.zip";
pub const ORIGINAL_APEX: &str = "original_apex";

/// Entries carried over into a CAPEX, in the order they are written.
pub const CAPEX_METADATA_ENTRIES: [&str; 5] = [
    APEX_MANIFEST_PB,
    APEX_MANIFEST_JSON,
    APEX_PUBKEY,
    APEX_BUILD_INFO,
    ANDROID_MANIFEST,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApexType {
    Uncompressed,
    Compressed
}

impl ApexType {
    /// Decided from entry names alone.
    pub fn of(zip: &ZipFile) -> ApexType {
        if zip.contains(ORIGINAL_APEX) {
            ApexType::Compressed
        } else {
            ApexType::Uncompressed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApexType::Uncompressed => "UNCOMPRESSED",
            ApexType::Compressed => "COMPRESSED"
        }
    }
}

impl Display for ApexType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An APEX or CAPEX opened from memory. Structural errors from the zip layer
/// are reported as `MalformedContainer` naming the file.
#[derive(Debug)]
pub struct ApexFile<'a> {
    path: &'a Path,
    zip: ZipFile<'a>,
}

impl<'a> ApexFile<'a> {

    pub fn from(path: &'a Path, data: &'a [u8]) -> Result<ApexFile<'a>> {
        let zip = ZipFile::from(data).map_err(|e| ApexError::malformed(path, e.to_string()))?;
        Ok(ApexFile { path, zip })
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn zip(&self) -> &ZipFile<'a> {
        &self.zip
    }

    pub fn apex_type(&self) -> ApexType {
        ApexType::of(&self.zip)
    }

    fn lift(&self, err: ApexError) -> ApexError {
        match err {
            ApexError::ContainerParse { .. } | ApexError::EntryNotFound(_) => {
                ApexError::malformed(self.path, err.to_string())
            }
            other => other
        }
    }

    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.zip.read_entry(name).map_err(|e| self.lift(e))
    }

    pub fn extract_to<W: Write>(&self, name: &str, writer: &mut W, dest: &Path) -> Result<u64> {
        self.zip.extract_to(name, writer, dest).map_err(|e| self.lift(e))
    }

    pub fn get_manifest(&self) -> Result<Vec<u8>> {
        self.read_entry(APEX_MANIFEST_PB)
    }

    /// Name of the payload entry; an APEX carries exactly one.
    pub fn payload_entry(&self) -> Result<&'static str> {
        match (self.zip.contains(APEX_PAYLOAD_IMG), self.zip.contains(APEX_PAYLOAD_ZIP)) {
            (true, false) => Ok(APEX_PAYLOAD_IMG),
            (false, true) => Ok(APEX_PAYLOAD_ZIP),
            (true, true) => Err(ApexError::malformed(self.path, "both apex_payload.img and apex_payload.zip present")),
            (false, false) => Err(ApexError::malformed(self.path, "no payload entry")),
        }
    }

    /// The CAPEX metadata entries this container actually has, in write order.
    pub fn metadata_entries(&self) -> Vec<&'static str> {
        CAPEX_METADATA_ENTRIES.iter()
            .copied()
            .filter(|name| self.zip.contains(name))
            .collect()
    }

}
