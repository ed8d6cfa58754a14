#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use apex_compression_tool::apex_zip::{
    CompressMethod, ZipWriter, ANDROID_MANIFEST, APEX_BUILD_INFO, APEX_MANIFEST_JSON,
    APEX_MANIFEST_PB, APEX_PAYLOAD_IMG, APEX_PAYLOAD_ZIP, APEX_PUBKEY,
};
use apex_compression_tool::manifest::proto::{encode_len_field, encode_varint};

pub const TEST_APEX_NAME: &str = "com.android.example";
pub const ROOT_DIGEST: [u8; 8] = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0];
pub const ROOT_DIGEST_HEX: &str = "123456789abcdef0";

pub fn manifest_pb() -> Vec<u8> {
    let mut out = Vec::new();
    encode_len_field(1, TEST_APEX_NAME.as_bytes(), &mut out);
    out.push(0x10);
    encode_varint(1, &mut out);
    encode_len_field(5, b"1.0", &mut out);
    out
}

fn hashtree_descriptor(name: &str, root: &[u8]) -> Vec<u8> {
    let salt = [0x5a; 4];
    let mut body = vec![0u8; 164];
    body[56..62].copy_from_slice(b"sha256");
    body[88..92].copy_from_slice(&(name.len() as u32).to_be_bytes());
    body[92..96].copy_from_slice(&(salt.len() as u32).to_be_bytes());
    body[96..100].copy_from_slice(&(root.len() as u32).to_be_bytes());
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(&salt);
    body.extend_from_slice(root);
    while body.len() % 8 != 0 {
        body.push(0);
    }
    let mut out = 1u64.to_be_bytes().to_vec();
    out.extend_from_slice(&(body.len() as u64).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// A filesystem-like image followed by a vbmeta blob and a 64-byte AVB footer.
pub fn payload_image() -> Vec<u8> {
    let mut image = Vec::new();
    for block in 0..64u32 {
        let line = format!("block {:04} of a very repetitive filesystem image\n", block);
        while image.len() < (block as usize + 1) * 4096 {
            image.extend_from_slice(line.as_bytes());
        }
        image.truncate((block as usize + 1) * 4096);
    }
    let original_size = image.len() as u64;

    let descriptors = hashtree_descriptor(TEST_APEX_NAME, &ROOT_DIGEST);
    let mut vbmeta = vec![0u8; 256];
    vbmeta[0..4].copy_from_slice(b"AVB0");
    vbmeta[20..28].copy_from_slice(&(descriptors.len() as u64).to_be_bytes());
    vbmeta[104..112].copy_from_slice(&(descriptors.len() as u64).to_be_bytes());
    vbmeta.extend_from_slice(&descriptors);

    let vbmeta_offset = image.len() as u64;
    image.extend_from_slice(&vbmeta);
    image.resize(image.len() + 4096 - image.len() % 4096 - 64, 0);

    let mut footer = b"AVBf".to_vec();
    footer.extend_from_slice(&1u32.to_be_bytes());
    footer.extend_from_slice(&0u32.to_be_bytes());
    footer.extend_from_slice(&original_size.to_be_bytes());
    footer.extend_from_slice(&vbmeta_offset.to_be_bytes());
    footer.extend_from_slice(&(vbmeta.len() as u64).to_be_bytes());
    footer.resize(64, 0);
    image.extend_from_slice(&footer);
    image
}

pub fn metadata() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        (APEX_MANIFEST_JSON, format!("{{\"name\": \"{}\", \"version\": 1}}", TEST_APEX_NAME).into_bytes()),
        (APEX_PUBKEY, (0..=255u8).cycle().take(1032).collect()),
        (APEX_BUILD_INFO, b"\x0a\x05hello\x12\x03abc".to_vec()),
        (ANDROID_MANIFEST, b"\x03\x00\x08\x00binary xml".to_vec()),
    ]
}

fn write_zip(path: &Path, entries: Vec<(&str, Vec<u8>, CompressMethod)>) {
    let mut writer = ZipWriter::new();
    for (name, data, method) in entries {
        writer.append_file(data, name.to_string(), method);
    }
    let mut out = Vec::new();
    writer.finish(&mut out, 4096).unwrap();
    fs::write(path, out).unwrap();
}

/// An uncompressed APEX in the usual entry order: manifest, payload, metadata.
pub fn write_test_apex(dir: &Path) -> PathBuf {
    let path = dir.join(format!("{}.apex", TEST_APEX_NAME));
    let mut entries = vec![
        (APEX_MANIFEST_PB, manifest_pb(), CompressMethod::Stored),
        (APEX_PAYLOAD_IMG, payload_image(), CompressMethod::Stored),
    ];
    for (name, data) in metadata() {
        // the json mirror is usually deflated inside an APEX
        let method = if name == APEX_MANIFEST_JSON { CompressMethod::Deflated } else { CompressMethod::Stored };
        entries.push((name, data, method));
    }
    write_zip(&path, entries);
    path
}

pub fn write_zip_backed_apex(dir: &Path) -> PathBuf {
    let path = dir.join("zip_backed.apex");
    write_zip(&path, vec![
        (APEX_MANIFEST_PB, manifest_pb(), CompressMethod::Stored),
        (APEX_PAYLOAD_ZIP, b"PK\x05\x06".to_vec(), CompressMethod::Stored),
    ]);
    path
}

pub fn write_apex_without_payload(dir: &Path) -> PathBuf {
    let path = dir.join("no_payload.apex");
    write_zip(&path, vec![(APEX_MANIFEST_PB, manifest_pb(), CompressMethod::Stored)]);
    path
}

/// The same APEX as `write_test_apex`, but written by the `zip` crate.
pub fn write_foreign_apex(dir: &Path) -> PathBuf {
    let path = dir.join("foreign.apex");
    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    let mut entries = vec![(APEX_MANIFEST_PB, manifest_pb()), (APEX_PAYLOAD_IMG, payload_image())];
    entries.extend(metadata());
    for (name, data) in entries {
        let method = if name == APEX_MANIFEST_JSON {
            zip::CompressionMethod::Deflated
        } else {
            zip::CompressionMethod::Stored
        };
        let options = zip::write::SimpleFileOptions::default().compression_method(method);
        writer.start_file(name, options).unwrap();
        writer.write_all(&data).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// A well-formed APEX whose `apex_manifest.pb` holds `manifest` verbatim.
pub fn write_apex_with_manifest(dir: &Path, manifest: &[u8]) -> PathBuf {
    let path = dir.join("bad_manifest.apex");
    write_zip(&path, vec![
        (APEX_MANIFEST_PB, manifest.to_vec(), CompressMethod::Stored),
        (APEX_PAYLOAD_IMG, payload_image(), CompressMethod::Stored),
    ]);
    path
}

pub fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let data = fs::read(path).unwrap();
    apex_compression_tool::apex_zip::ZipFile::from(&data).unwrap().read_entry(name).unwrap()
}
