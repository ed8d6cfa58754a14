mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use common::*;

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_apex_compression_tool"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn run_and_check_output(args: &[&str]) -> String {
    let output = run(args);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn get_type(path: &Path) -> String {
    run_and_check_output(&["info", "--print-type", s(path)]).trim().to_string()
}

#[test]
fn test_compress_decompress_via_cli() {
    let dir = tempfile::tempdir().unwrap();
    let uncompressed = write_test_apex(dir.path());
    let compressed = dir.path().join("out.capex");
    let decompressed = dir.path().join("out.apex");

    run_and_check_output(&["compress", "--input", s(&uncompressed),
                           "--output", s(&compressed)]);
    assert_eq!(get_type(&compressed), "COMPRESSED");

    let manifest = run_and_check_output(&["print-manifest", s(&compressed)]);
    assert!(manifest.contains(&format!("originalApexDigest: \"{}\"", ROOT_DIGEST_HEX)), "{}", manifest);
    assert!(manifest.contains(&format!("name: \"{}\"", TEST_APEX_NAME)));

    run_and_check_output(&["decompress", "--input", s(&compressed),
                           "--output", s(&decompressed)]);
    assert_eq!(get_type(&decompressed), "UNCOMPRESSED");
    assert_eq!(fs::read(&decompressed).unwrap(), fs::read(&uncompressed).unwrap());
}

#[test]
fn test_decompress_uncompressed_fails() {
    let dir = tempfile::tempdir().unwrap();
    let uncompressed = write_test_apex(dir.path());
    let output = dir.path().join("never.apex");
    let result = run(&["decompress", "--input", s(&uncompressed),
                       "--output", s(&output)]);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains(&format!("{} is not a compressed APEX", uncompressed.display())), "{}", stderr);
    assert!(!output.exists());
}
