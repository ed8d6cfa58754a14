use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::apex_zip::{ApexFile, ApexType, ORIGINAL_APEX};
use crate::config::Config;
use crate::error::{ApexError, Result};
use crate::utils::{check_cancel, read_file, write_atomically};

/// Recovers the original APEX from a CAPEX. This is a pure extraction: nothing
/// is re-signed or re-digested.
#[derive(Debug, Clone, Default)]
pub struct Decompressor {
    config: Config,
}

struct CancellableWriter<'a, W> {
    inner: W,
    cancel_signal: &'a AtomicBool,
}

impl<W: Write> Write for CancellableWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check_cancel(self.cancel_signal)?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Decompressor {
    pub fn new(config: Config) -> Decompressor {
        Decompressor { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn decompress(&self, input: &Path, output: &Path) -> Result<()> {
        self.decompress_with_cancel(input, output, &AtomicBool::new(false))
    }

    pub fn decompress_with_cancel(&self, input: &Path, output: &Path, cancel_signal: &AtomicBool) -> Result<()> {
        tracing::debug!("decompressing {} with {:?}", input.display(), self.config);
        let data = read_file(input)?;
        let apex = ApexFile::from(input, &data)?;
        if apex.apex_type() != ApexType::Compressed {
            return Err(ApexError::NotCompressed { path: input.to_path_buf() });
        }

        let mut written = 0;
        write_atomically(output, |w| {
            let mut writer = CancellableWriter { inner: w, cancel_signal };
            written = apex.extract_to(ORIGINAL_APEX, &mut writer, output)
                .map_err(|e| if cancel_signal.load(Ordering::SeqCst) { ApexError::Cancelled } else { e })?;
            Ok(())
        })?;

        tracing::info!("decompressed {} -> {} ({} -> {} bytes)",
                       input.display(), output.display(), data.len(), written);
        Ok(())
    }
}
