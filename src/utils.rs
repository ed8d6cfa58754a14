use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use crate::error::{ApexError, Result};

pub(crate) fn get_leu32_value<I: AsRef<[u8]>>(data: I, offset: usize) -> Option<u32> {
    let bytes = data.as_ref().get(offset..offset.checked_add(4)?)?;
    Some((bytes[0] as u32) | ((bytes[1] as u32) << 8)
        | ((bytes[2] as u32) << 16) | ((bytes[3] as u32) << 24))
}

pub(crate) fn get_leu16_value<I: AsRef<[u8]>>(data: I, offset: usize) -> Option<u16> {
    let bytes = data.as_ref().get(offset..offset.checked_add(2)?)?;
    Some((bytes[0] as u16) | ((bytes[1] as u16) << 8))
}

pub(crate) fn get_slice(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    data.get(offset..offset.checked_add(len)?)
}

pub(crate) fn check_cancel(cancel_signal: &AtomicBool) -> io::Result<()> {
    if cancel_signal.load(Ordering::SeqCst) {
        // not Interrupted: write_all and io::copy retry on that kind
        return Err(io::Error::new(io::ErrorKind::Other, "received cancel signal"));
    }
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| ApexError::read(path, e))
}

/// Writes `output` through a temporary file in the same directory and renames
/// it into place only when `fill` succeeds. On any error the temporary file is
/// dropped, so no partial container is ever visible at `output`.
pub(crate) fn write_atomically<F>(output: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<()>,
{
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ApexError::write(output, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush().map_err(|e| ApexError::write(output, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| ApexError::write(output, e))?;
    tmp.persist(output).map_err(|e| ApexError::write(output, e.error))?;
    Ok(())
}
