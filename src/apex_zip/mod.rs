pub(crate) mod zip;
pub(crate) mod writer;
mod wrap;

pub use wrap::{ApexFile, ApexType};
pub use wrap::{
    ANDROID_MANIFEST, APEX_BUILD_INFO, APEX_MANIFEST_JSON, APEX_MANIFEST_PB, APEX_PAYLOAD_IMG,
    APEX_PAYLOAD_ZIP, APEX_PUBKEY, CAPEX_METADATA_ENTRIES, ORIGINAL_APEX,
};
pub use writer::{ZipWriter, MAX_ALIGNMENT};
pub use zip::{ZipEntry, ZipFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressMethod {
    Stored = 0,
    Deflated = 8
}

impl CompressMethod {
    pub fn convert_from_u16(value: u16) -> Option<CompressMethod> {
        match value {
            0 => Some(CompressMethod::Stored),
            8 => Some(CompressMethod::Deflated),
            _ => None
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            CompressMethod::Stored => 0,
            CompressMethod::Deflated => 8
        }
    }

    // minimum "version needed to extract" for the method
    pub(crate) fn version_needed(&self) -> u16 {
        match self {
            CompressMethod::Stored => 10,
            CompressMethod::Deflated => 20
        }
    }
}

const LOCAL_FILE_HEADER: u32 = 0x4034b50;
const CENTRAL_DIRECTORY_END: u32 = 0x6054b50;
const CENTRAL_DIRECTORY: u32 = 0x2014b50;

const LOCAL_FILE_HEADER_LEN: usize = 30;
const CENTRAL_DIRECTORY_LEN: usize = 46;
const CENTRAL_DIRECTORY_END_LEN: usize = 22;

// 2008-01-01 00:00:00 in MS-DOS format, used for every written entry
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = ((2008 - 1980) << 9) | (1 << 5) | 1;
