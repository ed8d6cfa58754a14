use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use byteorder::{BigEndian, ReadBytesExt};
use crate::digest::{PartitionDigest, PayloadVerifier};
use crate::error::{ApexError, Result};

const FOOTER_MAGIC: &[u8; 4] = b"AVBf";
const VBMETA_MAGIC: &[u8; 4] = b"AVB0";
const FOOTER_SIZE: u64 = 64;
const VBMETA_HEADER_SIZE: u64 = 256;
const DESCRIPTOR_HEADER_SIZE: usize = 16;

const TAG_HASHTREE: u64 = 1;
const TAG_HASH: u64 = 2;

// fixed part of each descriptor body, before name/salt/digest
const HASHTREE_FIXED_SIZE: usize = 164;
const HASH_FIXED_SIZE: usize = 116;

/// Reads partition digests straight from the AVB footer and vbmeta
/// descriptors of the image, without spawning any tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvbFooterVerifier;

impl PayloadVerifier for AvbFooterVerifier {
    fn partition_digests(&self, image: &Path) -> Result<Vec<PartitionDigest>> {
        let file = File::open(image)
            .map_err(|e| unavailable(format!("cannot open {}: {}", image.display(), e)))?;
        read_partition_digests(BufReader::new(file))
    }
}

fn unavailable(reason: impl Into<String>) -> ApexError {
    ApexError::DigestUnavailable(reason.into())
}

fn io_unavailable(e: std::io::Error) -> ApexError {
    unavailable(format!("reading vbmeta: {}", e))
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}

/// Locates the vbmeta blob (through the footer, or at offset 0 for a bare
/// vbmeta image) and returns the digest of every hash and hashtree descriptor.
pub fn read_partition_digests<R: Read + Seek>(mut reader: R) -> Result<Vec<PartitionDigest>> {
    let len = reader.seek(SeekFrom::End(0)).map_err(io_unavailable)?;

    let mut vbmeta_offset = 0;
    let mut vbmeta_limit = len;
    if len >= FOOTER_SIZE {
        reader.seek(SeekFrom::Start(len - FOOTER_SIZE)).map_err(io_unavailable)?;
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(io_unavailable)?;
        if &magic == FOOTER_MAGIC {
            let _version_major = reader.read_u32::<BigEndian>().map_err(io_unavailable)?;
            let _version_minor = reader.read_u32::<BigEndian>().map_err(io_unavailable)?;
            let _original_image_size = reader.read_u64::<BigEndian>().map_err(io_unavailable)?;
            vbmeta_offset = reader.read_u64::<BigEndian>().map_err(io_unavailable)?;
            let vbmeta_size = reader.read_u64::<BigEndian>().map_err(io_unavailable)?;
            vbmeta_limit = vbmeta_offset.checked_add(vbmeta_size)
                .filter(|end| *end <= len - FOOTER_SIZE)
                .ok_or_else(|| unavailable("AVB footer points outside the image"))?;
        }
    }

    if vbmeta_limit < vbmeta_offset + VBMETA_HEADER_SIZE {
        return Err(unavailable("image has no AVB footer or vbmeta header"));
    }
    reader.seek(SeekFrom::Start(vbmeta_offset)).map_err(io_unavailable)?;
    let mut header = [0u8; VBMETA_HEADER_SIZE as usize];
    reader.read_exact(&mut header).map_err(io_unavailable)?;
    if &header[0..4] != VBMETA_MAGIC {
        return Err(unavailable("image has no AVB footer or vbmeta header"));
    }

    let mut fields = &header[12..];
    let auth_size = fields.read_u64::<BigEndian>().map_err(io_unavailable)?;
    let aux_size = fields.read_u64::<BigEndian>().map_err(io_unavailable)?;
    let mut fields = &header[96..];
    let descriptors_offset = fields.read_u64::<BigEndian>().map_err(io_unavailable)?;
    let descriptors_size = fields.read_u64::<BigEndian>().map_err(io_unavailable)?;

    let aux_start = (vbmeta_offset + VBMETA_HEADER_SIZE).checked_add(auth_size);
    let aux_end = aux_start.and_then(|s| s.checked_add(aux_size));
    let (aux_start, _) = match (aux_start, aux_end) {
        (Some(s), Some(e)) if e <= vbmeta_limit => (s, e),
        _ => return Err(unavailable("vbmeta blocks exceed image size")),
    };
    let desc_end = descriptors_offset.checked_add(descriptors_size)
        .filter(|end| *end <= aux_size)
        .ok_or_else(|| unavailable("vbmeta descriptors exceed auxiliary block"))?;

    let mut descriptors = vec![0u8; (desc_end - descriptors_offset) as usize];
    reader.seek(SeekFrom::Start(aux_start + descriptors_offset)).map_err(io_unavailable)?;
    reader.read_exact(&mut descriptors).map_err(io_unavailable)?;

    parse_descriptors(&descriptors)
}

fn parse_descriptors(mut data: &[u8]) -> Result<Vec<PartitionDigest>> {
    let mut res = Vec::new();
    while data.len() >= DESCRIPTOR_HEADER_SIZE {
        let tag = (&data[0..8]).read_u64::<BigEndian>().map_err(io_unavailable)?;
        let following = (&data[8..16]).read_u64::<BigEndian>().map_err(io_unavailable)?;
        let body_len = usize::try_from(following)
            .ok()
            .filter(|n| *n <= data.len() - DESCRIPTOR_HEADER_SIZE)
            .ok_or_else(|| unavailable("truncated vbmeta descriptor"))?;
        let body = &data[DESCRIPTOR_HEADER_SIZE..DESCRIPTOR_HEADER_SIZE + body_len];
        match tag {
            TAG_HASHTREE => res.push(digest_from_body(body, HASHTREE_FIXED_SIZE, 88)?),
            TAG_HASH => res.push(digest_from_body(body, HASH_FIXED_SIZE, 40)?),
            _ => {}
        }
        data = &data[DESCRIPTOR_HEADER_SIZE + body_len..];
    }
    Ok(res)
}

// Both descriptor kinds end with name_len, salt_len, digest_len at
// `lens_at`, followed after the fixed part by name, salt and digest.
fn digest_from_body(body: &[u8], fixed: usize, lens_at: usize) -> Result<PartitionDigest> {
    let lens = (be_u32(body, lens_at), be_u32(body, lens_at + 4), be_u32(body, lens_at + 8));
    let (Some(name_len), Some(salt_len), Some(digest_len)) = lens else {
        return Err(unavailable("truncated vbmeta descriptor"));
    };
    let name_start = fixed;
    let digest_start = name_start + name_len as usize + salt_len as usize;
    let digest_end = digest_start + digest_len as usize;
    if digest_end > body.len() {
        return Err(unavailable("truncated vbmeta descriptor"));
    }
    let name = String::from_utf8(body[name_start..name_start + name_len as usize].to_vec())
        .map_err(|_| unavailable("partition name is not UTF-8"))?;
    Ok(PartitionDigest {
        name,
        digest: hex::encode(&body[digest_start..digest_end]),
    })
}
