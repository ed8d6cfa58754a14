use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use flate2::read::DeflateDecoder;
use crate::error::{ApexError, Result};
use crate::utils::{get_leu16_value, get_leu32_value, get_slice};
use crate::apex_zip::{CENTRAL_DIRECTORY, CENTRAL_DIRECTORY_END, CENTRAL_DIRECTORY_END_LEN,
                      CENTRAL_DIRECTORY_LEN, CompressMethod, LOCAL_FILE_HEADER, LOCAL_FILE_HEADER_LEN};

const MAX_COMMENT_LEN: usize = 0xffff;
const ZIP64_MARKER: u32 = 0xffffffff;
const FLAG_ENCRYPTED: u16 = 0x1;

#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub(crate) origin_size: u32,
    pub(crate) compressed_size: u32,
    pub(crate) file_name: String,
    pub(crate) crc_32: u32,
    pub(crate) compress_method: CompressMethod,
    pub(crate) local_file_header_offset: u32,
}

impl ZipEntry {
    pub fn name(&self) -> &str {
        &self.file_name
    }

    pub fn compress_method(&self) -> CompressMethod {
        self.compress_method
    }

    pub fn size(&self) -> u32 {
        self.origin_size
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }
}

/// Read-only view of a zip archive held in memory.
#[derive(Debug)]
pub struct ZipFile<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) entries: Vec<ZipEntry>,
    pub(crate) file_name_map: HashMap<String, usize>
}

fn truncated(offset: usize) -> ApexError {
    ApexError::parse(offset, "unexpected end of data")
}

fn find_central_directory_end(data: &[u8]) -> Result<usize> {
    if data.len() < CENTRAL_DIRECTORY_END_LEN {
        return Err(ApexError::parse(0, "file too small to be a zip archive"));
    }
    let last = data.len() - CENTRAL_DIRECTORY_END_LEN;
    for seek_index in 0..=last.min(MAX_COMMENT_LEN) {
        let offset = last - seek_index;
        if get_leu32_value(data, offset) == Some(CENTRAL_DIRECTORY_END) {
            return Ok(offset);
        }
    }
    Err(ApexError::parse(last, "Central directory end not found"))
}

impl<'a> ZipFile<'a> {

    pub fn from(data: &'a [u8]) -> Result<ZipFile<'a>> {
        let mut res = ZipFile {
            data,
            entries: vec![],
            file_name_map: HashMap::new()
        };

        let central_directory_end_offset = find_central_directory_end(data)?;
        let eocd = central_directory_end_offset;
        let dir_count = get_leu16_value(data, eocd + 10).ok_or_else(|| truncated(eocd))?;
        let central_directory_offset = get_leu32_value(data, eocd + 16).ok_or_else(|| truncated(eocd))?;
        if central_directory_offset == ZIP64_MARKER {
            return Err(ApexError::parse(eocd, "zip64 archives are not supported"));
        }

        let mut current_offset = central_directory_offset as usize;
        for _ in 0..dir_count {
            let entry_at = current_offset;
            if get_leu32_value(data, entry_at) != Some(CENTRAL_DIRECTORY) {
                return Err(ApexError::parse(entry_at, "magic of central directory error"));
            }
            let field16 = |rel: usize| get_leu16_value(data, entry_at + rel).ok_or_else(|| truncated(entry_at));
            let field32 = |rel: usize| get_leu32_value(data, entry_at + rel).ok_or_else(|| truncated(entry_at));

            let flags = field16(8)?;
            if flags & FLAG_ENCRYPTED != 0 {
                return Err(ApexError::parse(entry_at, "encrypted entries are not supported"));
            }
            let method = field16(10)?;
            let compress_method = CompressMethod::convert_from_u16(method)
                .ok_or_else(|| ApexError::parse(entry_at, format!("unsupported compression method {}", method)))?;
            let compressed_size = field32(20)?;
            let origin_size = field32(24)?;
            let local_file_header_offset = field32(42)?;
            if compressed_size == ZIP64_MARKER || origin_size == ZIP64_MARKER
                || local_file_header_offset == ZIP64_MARKER {
                return Err(ApexError::parse(entry_at, "zip64 entries are not supported"));
            }

            let file_name_len = field16(28)? as usize;
            let ext_len = field16(30)? as usize;
            let comment_len = field16(32)? as usize;
            let file_name_data = get_slice(data, entry_at + CENTRAL_DIRECTORY_LEN, file_name_len)
                .ok_or_else(|| truncated(entry_at))?;
            let file_name = String::from_utf8(file_name_data.to_vec())
                .map_err(|_| ApexError::parse(entry_at, "convert string fail"))?;
            if res.file_name_map.contains_key(&file_name) {
                return Err(ApexError::parse(entry_at, format!("duplicate entry '{}'", file_name)));
            }
            res.file_name_map.insert(file_name.clone(), res.entries.len());

            res.entries.push(ZipEntry {
                origin_size,
                compressed_size,
                file_name,
                crc_32: field32(16)?,
                compress_method,
                local_file_header_offset,
            });
            current_offset = entry_at + CENTRAL_DIRECTORY_LEN + file_name_len + ext_len + comment_len;
        }
        Ok(res)
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Entry names in central directory order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file_name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file_name_map.contains_key(name)
    }

    pub fn get_file(&self, name: &str) -> Option<&ZipEntry> {
        let idx = self.file_name_map.get(name)?;
        self.entries.get(*idx)
    }

    fn entry_or_missing(&self, name: &str) -> Result<&ZipEntry> {
        self.get_file(name).ok_or_else(|| ApexError::EntryNotFound(name.to_string()))
    }

    /// Raw (possibly deflated) bytes of the entry, located through its local
    /// file header.
    pub fn get_file_compress_data(&self, entry: &ZipEntry) -> Result<&'a [u8]> {
        let data = self.data;
        let header_offset = entry.local_file_header_offset as usize;
        if get_leu32_value(data, header_offset) != Some(LOCAL_FILE_HEADER) {
            return Err(ApexError::parse(header_offset, "magic of local file header error"));
        }
        let file_name_len = get_leu16_value(data, header_offset + 26).ok_or_else(|| truncated(header_offset))?;
        let ext_len = get_leu16_value(data, header_offset + 28).ok_or_else(|| truncated(header_offset))?;
        let file_start_offset = header_offset + LOCAL_FILE_HEADER_LEN + file_name_len as usize + ext_len as usize;
        get_slice(data, file_start_offset, entry.compressed_size as usize)
            .ok_or_else(|| truncated(file_start_offset))
    }

    /// Decompresses `name` into memory and checks its CRC-32.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entry_or_missing(name)?;
        let mut out = Vec::with_capacity(entry.origin_size as usize);
        self.extract_to(name, &mut out, Path::new(name))?;
        Ok(out)
    }

    /// Streams the decompressed bytes of `name` into `writer`. `dest` only
    /// labels write errors.
    pub fn extract_to<W: Write>(&self, name: &str, writer: &mut W, dest: &Path) -> Result<u64> {
        let entry = self.entry_or_missing(name)?;
        let raw = self.get_file_compress_data(entry)?;
        let at = entry.local_file_header_offset as usize;
        let mut hasher = crc32fast::Hasher::new();
        let mut written: u64 = 0;

        match entry.compress_method {
            CompressMethod::Stored => {
                hasher.update(raw);
                writer.write_all(raw).map_err(|e| ApexError::write(dest, e))?;
                written = raw.len() as u64;
            }
            CompressMethod::Deflated => {
                let mut decoder = DeflateDecoder::new(raw);
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = decoder.read(&mut buf)
                        .map_err(|e| ApexError::parse(at, format!("inflate '{}' failed: {}", name, e)))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                    writer.write_all(&buf[..n]).map_err(|e| ApexError::write(dest, e))?;
                    written += n as u64;
                }
            }
        }

        if written != entry.origin_size as u64 {
            return Err(ApexError::parse(at, format!(
                "size of '{}' is {} but central directory says {}", name, written, entry.origin_size)));
        }
        if hasher.finalize() != entry.crc_32 {
            return Err(ApexError::parse(at, format!("crc32 mismatch for '{}'", name)));
        }
        Ok(written)
    }

}
