use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use crate::error::{ApexError, Result};
use crate::manifest::proto::{Field, Message, WireType};

/// Turns a binary manifest into human-readable text.
pub trait ManifestCodec {
    fn print(&self, manifest: &[u8]) -> Result<String>;
}

#[derive(Clone, Copy)]
enum Kind {
    String,
    Int64,
    Bool,
    Message(&'static [FieldSpec]),
}

#[derive(Clone, Copy)]
struct FieldSpec {
    number: u32,
    name: &'static str,
    kind: Kind,
}

const fn spec(number: u32, name: &'static str, kind: Kind) -> FieldSpec {
    FieldSpec { number, name, kind }
}

const CAPEX_METADATA_FIELDS: &[FieldSpec] = &[
    spec(1, "originalApexDigest", Kind::String),
];

const APEX_MANIFEST_FIELDS: &[FieldSpec] = &[
    spec(1, "name", Kind::String),
    spec(2, "version", Kind::Int64),
    spec(3, "preInstallHook", Kind::String),
    spec(4, "postInstallHook", Kind::String),
    spec(5, "versionName", Kind::String),
    spec(6, "noCode", Kind::Bool),
    spec(7, "provideNativeLibs", Kind::String),
    spec(8, "requireNativeLibs", Kind::String),
    spec(9, "jniLibs", Kind::String),
    spec(10, "requireSharedApexLibs", Kind::String),
    spec(11, "provideSharedApexLibs", Kind::Bool),
    spec(12, "capexMetadata", Kind::Message(CAPEX_METADATA_FIELDS)),
    spec(13, "supportsRebootlessUpdate", Kind::Bool),
];

/// Prints protobuf text format natively, e.g.
/// `capexMetadata {\n  originalApexDigest: "..."\n}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatCodec;

impl ManifestCodec for TextFormatCodec {
    fn print(&self, manifest: &[u8]) -> Result<String> {
        let message = Message::parse(manifest)?;
        let mut out = String::new();
        print_message(&message, APEX_MANIFEST_FIELDS, 0, &mut out)?;
        Ok(out)
    }
}

fn escape_bytes(bytes: &[u8], out: &mut String) {
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
}

fn wrong_type(name: &str) -> ApexError {
    ApexError::ManifestParse(format!("{} has wrong wire type", name))
}

fn print_unknown(field: &Field, indent: &str, out: &mut String) {
    let _ = write!(out, "{}{}: ", indent, field.number);
    match field.wire_type {
        WireType::Varint => {
            let _ = write!(out, "{}", field.as_varint().unwrap_or_default());
        }
        WireType::Fixed64 => {
            let _ = write!(out, "0x{:016x}", field.as_fixed64().unwrap_or_default());
        }
        WireType::Fixed32 => {
            let _ = write!(out, "0x{:08x}", field.as_fixed32().unwrap_or_default());
        }
        WireType::LengthDelimited => {
            out.push('"');
            escape_bytes(field.value(), out);
            out.push('"');
        }
    }
    out.push('\n');
}

fn print_message(message: &Message, specs: &[FieldSpec], depth: usize, out: &mut String) -> Result<()> {
    let indent = "  ".repeat(depth);
    for field in message.fields() {
        let Some(spec) = specs.iter().find(|s| s.number == field.number) else {
            print_unknown(field, &indent, out);
            continue;
        };
        match spec.kind {
            Kind::String => {
                if field.wire_type != WireType::LengthDelimited {
                    return Err(wrong_type(spec.name));
                }
                let _ = write!(out, "{}{}: \"", indent, spec.name);
                escape_bytes(field.value(), out);
                out.push_str("\"\n");
            }
            Kind::Int64 => {
                let value = field.as_varint().ok_or_else(|| wrong_type(spec.name))?;
                let _ = writeln!(out, "{}{}: {}", indent, spec.name, value as i64);
            }
            Kind::Bool => {
                let value = field.as_varint().ok_or_else(|| wrong_type(spec.name))?;
                let _ = writeln!(out, "{}{}: {}", indent, spec.name, value != 0);
            }
            Kind::Message(nested) => {
                if field.wire_type != WireType::LengthDelimited {
                    return Err(wrong_type(spec.name));
                }
                let inner = Message::parse(field.value())?;
                let _ = writeln!(out, "{}{} {{", indent, spec.name);
                print_message(&inner, nested, depth + 1, out)?;
                let _ = writeln!(out, "{}}}", indent);
            }
        }
    }
    Ok(())
}

/// Delegates to an external `conv_apex_manifest print <file>`.
#[derive(Debug, Clone)]
pub struct ConvApexManifestCodec {
    tool: PathBuf,
}

impl ConvApexManifestCodec {
    pub fn new(tool: impl Into<PathBuf>) -> ConvApexManifestCodec {
        ConvApexManifestCodec { tool: tool.into() }
    }
}

impl ManifestCodec for ConvApexManifestCodec {
    fn print(&self, manifest: &[u8]) -> Result<String> {
        let tool_error = |reason: String| {
            ApexError::ManifestParse(format!("{}: {}", self.tool.display(), reason))
        };
        let mut tmp = NamedTempFile::new().map_err(|e| tool_error(e.to_string()))?;
        tmp.write_all(manifest).map_err(|e| tool_error(e.to_string()))?;
        tmp.flush().map_err(|e| tool_error(e.to_string()))?;

        tracing::debug!("running {} print {}", self.tool.display(), tmp.path().display());
        let output = Command::new(&self.tool)
            .arg("print")
            .arg(tmp.path())
            .output()
            .map_err(|e| tool_error(e.to_string()))?;
        if !output.status.success() {
            return Err(tool_error(format!("exit {}: {}", output.status,
                                          String::from_utf8_lossy(&output.stderr).trim())));
        }
        String::from_utf8(output.stdout).map_err(|e| tool_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::apex_manifest::set_original_digest;
    use crate::manifest::apex_manifest::tests::sample_manifest;

    #[test]
    fn test_print_known_fields() {
        let manifest = sample_manifest("com.android.example", 3);
        let text = TextFormatCodec.print(&manifest).unwrap();
        assert_eq!(text, "name: \"com.android.example\"\n\
                          version: 3\n\
                          provideNativeLibs: \"libfoo.so\"\n\
                          supportsRebootlessUpdate: true\n");
    }

    #[test]
    fn test_print_digest() {
        let manifest = sample_manifest("a", 1);
        let patched = set_original_digest(&manifest, "0123abcd").unwrap();
        let text = TextFormatCodec.print(&patched).unwrap();
        assert!(text.contains("capexMetadata {\n  originalApexDigest: \"0123abcd\"\n}\n"));
        assert!(text.contains("originalApexDigest: \"0123abcd\""));
    }

    #[test]
    fn test_print_unknown_and_escapes() {
        // 1: "a\"b\n\x01", 40: 5
        let data = [0x0a, 0x04, b'a', b'"', b'\n', 0x01, 0xc0, 0x02, 0x05];
        let text = TextFormatCodec.print(&data).unwrap();
        assert_eq!(text, "name: \"a\\\"\\n\\001\"\n40: 5\n");
    }

    #[test]
    fn test_print_wrong_type() {
        // name as varint
        assert!(TextFormatCodec.print(&[0x08, 0x01]).is_err());
    }

    #[test]
    fn test_missing_tool() {
        let codec = ConvApexManifestCodec::new("/nonexistent/conv_apex_manifest");
        assert!(matches!(codec.print(&[]), Err(ApexError::ManifestParse(_))));
    }
}
