use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::apex_zip::{ApexFile, ApexType, CompressMethod, ZipWriter, APEX_MANIFEST_PB, APEX_PAYLOAD_IMG, ORIGINAL_APEX};
use crate::config::Config;
use crate::digest::{digest_of, PayloadVerifier};
use crate::error::{ApexError, Result};
use crate::manifest::{set_original_digest, ApexManifest};
use crate::utils::{check_cancel, read_file, write_atomically};

/// Turns an APEX into a CAPEX.
pub struct Compressor {
    config: Config,
    verifier: Box<dyn PayloadVerifier>,
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor").field("config", &self.config).finish_non_exhaustive()
    }
}

fn cancelled_or(cancel_signal: &AtomicBool, err: ApexError) -> ApexError {
    if cancel_signal.load(Ordering::SeqCst) {
        ApexError::Cancelled
    } else {
        err
    }
}

impl Compressor {
    pub fn new(config: Config, verifier: Box<dyn PayloadVerifier>) -> Compressor {
        Compressor { config, verifier }
    }

    /// Uses the verifier the config names.
    pub fn from_config(config: Config) -> Compressor {
        let verifier = config.verifier();
        Compressor { config, verifier }
    }

    pub fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        self.compress_with_cancel(input, output, &AtomicBool::new(false))
    }

    pub fn compress_with_cancel(&self, input: &Path, output: &Path, cancel_signal: &AtomicBool) -> Result<()> {
        let data = read_file(input)?;
        let apex = ApexFile::from(input, &data)?;
        if apex.apex_type() == ApexType::Compressed {
            return Err(ApexError::malformed(input, "input is already a compressed APEX"));
        }
        let payload = apex.payload_entry()?;
        let manifest = apex.get_manifest()?;
        let partition = ApexManifest::from(&manifest)?.name()?;
        if payload != APEX_PAYLOAD_IMG {
            return Err(ApexError::malformed(input, format!("{} has no AVB footer to take a digest from", payload)));
        }
        check_cancel(cancel_signal).map_err(|_| ApexError::Cancelled)?;

        let digest = self.payload_digest(&apex, partition.as_deref())?;
        let patched = set_original_digest(&manifest, &digest)?;
        check_cancel(cancel_signal).map_err(|_| ApexError::Cancelled)?;

        let mut writer = ZipWriter::new().with_level(self.config.compression_level);
        for name in apex.metadata_entries() {
            if name == APEX_MANIFEST_PB {
                writer.append_file(patched.as_slice(), name.to_string(), CompressMethod::Stored);
            } else {
                writer.append_file(apex.read_entry(name)?, name.to_string(), CompressMethod::Stored);
            }
            tracing::debug!("stored {}", name);
        }
        writer.append_file(data.as_slice(), ORIGINAL_APEX.to_string(), CompressMethod::Deflated);

        let mut written = 0;
        write_atomically(output, |w| {
            written = writer.finish_with_cancel(w, self.config.alignment, cancel_signal)
                .map_err(|e| cancelled_or(cancel_signal, ApexError::write(output, e)))?;
            Ok(())
        })?;

        if written >= data.len() as u64 {
            tracing::warn!("{} ({} bytes) is not smaller than {} ({} bytes)",
                           output.display(), written, input.display(), data.len());
        }
        tracing::info!("compressed {} -> {} ({} -> {} bytes, digest {})",
                       input.display(), output.display(), data.len(), written, digest);
        Ok(())
    }

    fn payload_digest(&self, apex: &ApexFile, partition: Option<&str>) -> Result<String> {
        let workdir = tempfile::tempdir().map_err(|e| ApexError::write(&std::env::temp_dir(), e))?;
        let image_path = workdir.path().join(APEX_PAYLOAD_IMG);
        let file = File::create(&image_path).map_err(|e| ApexError::write(&image_path, e))?;
        let mut image = BufWriter::new(file);
        apex.extract_to(APEX_PAYLOAD_IMG, &mut image, &image_path)?;
        image.flush().map_err(|e| ApexError::write(&image_path, e))?;
        drop(image);
        digest_of(self.verifier.as_ref(), &image_path, partition)
    }
}
