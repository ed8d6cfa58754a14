use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use crate::apex_zip::{CENTRAL_DIRECTORY, CENTRAL_DIRECTORY_END, CENTRAL_DIRECTORY_LEN, CompressMethod,
                      DOS_DATE, DOS_TIME, LOCAL_FILE_HEADER, LOCAL_FILE_HEADER_LEN};
use crate::utils::check_cancel;

const DEFLATE_CHUNK: usize = 1024 * 1024;
// MS-DOS host, spec version 2.0
const VERSION_MADE_BY: u16 = 20;
/// Padding lives in the 16-bit extra field length, so it must stay below this.
pub const MAX_ALIGNMENT: usize = u16::MAX as usize + 1;

struct AppendZipEntry<'a> {
    data: Cow<'a, [u8]>,
    compress_method: CompressMethod,
    file_name: String,
}

/// Builds a zip archive from scratch. Entries are emitted in the order they
/// were appended, with fixed timestamps, so equal input gives equal bytes.
pub struct ZipWriter<'a> {
    append_entries: Vec<AppendZipEntry<'a>>,
    level: Compression,
}

struct FileHeaderBuilder<'a> {
    file_name: &'a str,
    compress_method: CompressMethod,
    origin_size: u32,
    compress_size: u32,
    crc32: u32,
}

fn too_large(what: &str, name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{} of '{}' exceeds zip32 limits", what, name))
}

fn to_u32(value: usize, what: &str, name: &str) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| too_large(what, name))
}

impl<'a> FileHeaderBuilder<'a> {

    fn new(file_name: &'a str, compress_method: CompressMethod, origin_size: u32, compress_size: u32, crc32: u32) -> FileHeaderBuilder<'a> {
        FileHeaderBuilder {
            file_name,
            compress_method,
            origin_size,
            compress_size,
            crc32,
        }
    }

    fn write_cd<W: Write>(&self, mut writer: W, lfh_offset: u32) -> io::Result<usize> {
        writer.write_u32::<LittleEndian>(CENTRAL_DIRECTORY)?;
        writer.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        writer.write_u16::<LittleEndian>(self.compress_method.version_needed())?;
        writer.write_u16::<LittleEndian>(0)?; // flag
        writer.write_u16::<LittleEndian>(self.compress_method.value())?;
        writer.write_u16::<LittleEndian>(DOS_TIME)?;
        writer.write_u16::<LittleEndian>(DOS_DATE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compress_size)?;
        writer.write_u32::<LittleEndian>(self.origin_size)?;
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(0)?; // ext len
        writer.write_u16::<LittleEndian>(0)?; // comment
        writer.write_u16::<LittleEndian>(0)?; // disk
        writer.write_u16::<LittleEndian>(0)?; // internal
        writer.write_u32::<LittleEndian>(0)?; // external
        writer.write_u32::<LittleEndian>(lfh_offset)?;
        writer.write_all(self.file_name.as_bytes())?;
        Ok(CENTRAL_DIRECTORY_LEN + self.file_name.len())
    }

    // Stored entries get their data aligned to `align` by zero-padding the extra field.
    fn write_lfh<W: Write>(&self, mut writer: W, offset: usize, align: usize) -> io::Result<usize> {
        let header_len = LOCAL_FILE_HEADER_LEN + self.file_name.len();
        let align_count: usize = if self.compress_method != CompressMethod::Stored || align <= 1 {
            0
        } else {
            (align - ((offset + header_len) % align)) % align
        };
        let extra_len = u16::try_from(align_count).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput,
                           format!("alignment padding of {} bytes for '{}' does not fit the extra field",
                                   align_count, self.file_name))
        })?;
        writer.write_u32::<LittleEndian>(LOCAL_FILE_HEADER)?;
        writer.write_u16::<LittleEndian>(self.compress_method.version_needed())?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(self.compress_method.value())?;
        writer.write_u16::<LittleEndian>(DOS_TIME)?;
        writer.write_u16::<LittleEndian>(DOS_DATE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compress_size)?;
        writer.write_u32::<LittleEndian>(self.origin_size)?;
        writer.write_u16::<LittleEndian>(self.file_name.len() as u16)?;
        writer.write_u16::<LittleEndian>(extra_len)?;
        writer.write_all(self.file_name.as_bytes())?;
        for _ in 0..align_count {
            writer.write_u8(0)?;
        }
        Ok(header_len + align_count)
    }
}

impl<'a> Default for ZipWriter<'a> {
    fn default() -> Self {
        ZipWriter::new()
    }
}

impl<'a> ZipWriter<'a> {

    pub fn new() -> ZipWriter<'a> {
        ZipWriter {
            append_entries: vec![],
            level: Compression::best(),
        }
    }

    /// Deflate level, clamped to 0..=9.
    pub fn with_level(mut self, level: u32) -> ZipWriter<'a> {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Borrowed data is written without being copied.
    pub fn append_file<D: Into<Cow<'a, [u8]>>>(&mut self, data: D, file_name: String, method: CompressMethod) {
        self.append_entries.push(AppendZipEntry {
            data: data.into(),
            compress_method: method,
            file_name,
        });
    }

    pub fn entry_count(&self) -> usize {
        self.append_entries.len()
    }

    pub fn finish<W: Write>(&self, writer: W, align: usize) -> io::Result<u64> {
        self.finish_with_cancel(writer, align, &AtomicBool::new(false))
    }

    /// Writes the whole archive and returns its length. Checks `cancel_signal`
    /// between entries and while deflating.
    pub fn finish_with_cancel<W: Write>(&self, mut writer: W, align: usize, cancel_signal: &AtomicBool) -> io::Result<u64> {
        if align > MAX_ALIGNMENT {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      format!("alignment {} exceeds {}", align, MAX_ALIGNMENT)));
        }
        let mut seen = HashSet::new();
        for entry in &self.append_entries {
            if !seen.insert(entry.file_name.as_str()) {
                return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                          format!("duplicate entry '{}'", entry.file_name)));
            }
            if entry.file_name.len() > u16::MAX as usize {
                return Err(too_large("name", &entry.file_name));
            }
        }

        let mut central_directory_data: Vec<u8> = Vec::new();
        let mut current_offset: usize = 0;

        for new_entry in &self.append_entries {
            check_cancel(cancel_signal)?;
            let name = new_entry.file_name.as_str();

            let mut hash = crc32fast::Hasher::new();
            hash.update(&new_entry.data);
            let crc32_hash = hash.finalize();

            let compress_data_opt = match new_entry.compress_method {
                CompressMethod::Stored => None,
                CompressMethod::Deflated => Some(self.deflate(&new_entry.data, cancel_signal)?),
            };
            let payload: &[u8] = match &compress_data_opt {
                Some(data) => data.as_slice(),
                None => &new_entry.data,
            };

            let file_header = FileHeaderBuilder::new(
                name,
                new_entry.compress_method,
                to_u32(new_entry.data.len(), "size", name)?,
                to_u32(payload.len(), "compressed size", name)?,
                crc32_hash
            );

            file_header.write_cd(&mut central_directory_data, to_u32(current_offset, "offset", name)?)?;
            current_offset += file_header.write_lfh(&mut writer, current_offset, align)?;
            writer.write_all(payload)?;
            current_offset += payload.len();
        }

        let file_count = u16::try_from(self.append_entries.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many entries"))?;
        let central_directory_offset = to_u32(current_offset, "offset", "central directory")?;
        writer.write_all(central_directory_data.as_slice())?;
        writer.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_END)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(file_count)?;
        writer.write_u16::<LittleEndian>(file_count)?;
        writer.write_u32::<LittleEndian>(central_directory_data.len() as u32)?;
        writer.write_u32::<LittleEndian>(central_directory_offset)?;
        writer.write_u16::<LittleEndian>(0)?;
        Ok((current_offset + central_directory_data.len() + 22) as u64)
    }

    fn deflate(&self, data: &[u8], cancel_signal: &AtomicBool) -> io::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        for chunk in data.chunks(DEFLATE_CHUNK) {
            check_cancel(cancel_signal)?;
            encoder.write_all(chunk)?;
        }
        encoder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use crate::apex_zip::ZipFile;

    fn sample() -> ZipWriter<'static> {
        let mut writer = ZipWriter::new();
        writer.append_file(b"meta".to_vec(), "meta".to_string(), CompressMethod::Stored);
        writer.append_file(vec![7u8; 10_000], "blob".to_string(), CompressMethod::Deflated);
        writer
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        let len = sample().finish(&mut first, 4).unwrap();
        sample().finish(&mut second, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(len as usize, first.len());
    }

    #[test]
    fn test_stored_entries_are_aligned() {
        let mut out = Vec::new();
        let mut writer = ZipWriter::new();
        writer.append_file(vec![1u8; 3], "odd".to_string(), CompressMethod::Stored);
        writer.append_file(vec![2u8; 5], "x".to_string(), CompressMethod::Stored);
        writer.finish(&mut out, 4096).unwrap();
        let zip = ZipFile::from(&out).unwrap();
        for entry in zip.entries() {
            let raw = zip.get_file_compress_data(entry).unwrap();
            assert_eq!((raw.as_ptr() as usize - out.as_ptr() as usize) % 4096, 0);
        }
        assert_eq!(zip.read_entry("x").unwrap(), vec![2u8; 5]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut writer = ZipWriter::new();
        writer.append_file(vec![], "a".to_string(), CompressMethod::Stored);
        writer.append_file(vec![], "a".to_string(), CompressMethod::Deflated);
        let err = writer.finish(Vec::new(), 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_largest_alignment_is_honoured() {
        let mut out = Vec::new();
        let mut writer = ZipWriter::new();
        writer.append_file(vec![3u8; 7], "page".to_string(), CompressMethod::Stored);
        writer.append_file(vec![4u8; 9], "next".to_string(), CompressMethod::Stored);
        writer.finish(&mut out, MAX_ALIGNMENT).unwrap();
        let zip = ZipFile::from(&out).unwrap();
        for entry in zip.entries() {
            let raw = zip.get_file_compress_data(entry).unwrap();
            assert_eq!((raw.as_ptr() as usize - out.as_ptr() as usize) % MAX_ALIGNMENT, 0);
        }
        assert_eq!(zip.read_entry("next").unwrap(), vec![4u8; 9]);
    }

    #[test]
    fn test_oversized_alignment_rejected() {
        let mut out = Vec::new();
        let err = sample().finish(&mut out, 100_000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }

    #[test]
    fn test_padding_must_fit_extra_field() {
        let header = FileHeaderBuilder::new("a", CompressMethod::Stored, 1, 1, 0);
        let mut out = Vec::new();
        let err = header.write_lfh(&mut out, 0, 100_000).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }

    #[test]
    fn test_cancel_stops_writing() {
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::SeqCst);
        let err = sample().finish_with_cancel(Vec::new(), 4, &cancel).unwrap_err();
        assert_eq!(err.to_string(), "received cancel signal");
    }
}
