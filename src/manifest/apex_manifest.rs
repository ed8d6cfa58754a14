use crate::error::{ApexError, Result};
use crate::manifest::proto::{encode_len_field, Message, WireType};

pub const NAME_FIELD: u32 = 1;
pub const VERSION_FIELD: u32 = 2;
pub const CAPEX_METADATA_FIELD: u32 = 12;
pub const ORIGINAL_APEX_DIGEST_FIELD: u32 = 1;

/// Read-only view of an `ApexManifest` protobuf.
#[derive(Debug, Clone)]
pub struct ApexManifest<'a> {
    message: Message<'a>,
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ApexError::ManifestParse(format!("{} is not valid UTF-8", what)))
}

impl<'a> ApexManifest<'a> {
    pub fn from(data: &'a [u8]) -> Result<ApexManifest<'a>> {
        Ok(ApexManifest {
            message: Message::parse(data)?,
        })
    }

    pub fn message(&self) -> &Message<'a> {
        &self.message
    }

    pub fn name(&self) -> Result<Option<String>> {
        match self.message.get(NAME_FIELD) {
            Some(field) if field.wire_type == WireType::LengthDelimited => Ok(Some(utf8(field.value(), "name")?)),
            Some(_) => Err(ApexError::ManifestParse("name has wrong wire type".to_string())),
            None => Ok(None),
        }
    }

    pub fn version(&self) -> Option<i64> {
        self.message.get(VERSION_FIELD)?.as_varint().map(|v| v as i64)
    }

    /// Every `capexMetadata` record merged into one sub-message body, the way
    /// a protobuf parser merges repeated occurrences of a message field.
    fn capex_metadata(&self) -> Result<Option<Vec<u8>>> {
        let mut merged: Option<Vec<u8>> = None;
        for field in self.message.get_all(CAPEX_METADATA_FIELD) {
            if field.wire_type != WireType::LengthDelimited {
                return Err(ApexError::ManifestParse("capexMetadata has wrong wire type".to_string()));
            }
            // validate the nested message as well
            Message::parse(field.value())?;
            merged.get_or_insert_with(Vec::new).extend_from_slice(field.value());
        }
        Ok(merged)
    }

    pub fn original_digest(&self) -> Result<Option<String>> {
        let Some(body) = self.capex_metadata()? else {
            return Ok(None);
        };
        let metadata = Message::parse(&body)?;
        match metadata.get(ORIGINAL_APEX_DIGEST_FIELD) {
            Some(field) if field.wire_type == WireType::LengthDelimited => {
                Ok(Some(utf8(field.value(), "originalApexDigest")?))
            }
            Some(_) => Err(ApexError::ManifestParse("originalApexDigest has wrong wire type".to_string())),
            None => Ok(None),
        }
    }
}

/// Returns `manifest` with `capexMetadata.originalApexDigest` set to `digest`.
/// Other `capexMetadata` subfields survive; every other record is copied as is.
pub fn set_original_digest(manifest: &[u8], digest: &str) -> Result<Vec<u8>> {
    let parsed = ApexManifest::from(manifest)?;
    let existing = parsed.capex_metadata()?.unwrap_or_default();

    let mut digest_record = Vec::new();
    encode_len_field(ORIGINAL_APEX_DIGEST_FIELD, digest.as_bytes(), &mut digest_record);
    let metadata_body = Message::parse(&existing)?.with_replaced(ORIGINAL_APEX_DIGEST_FIELD, &digest_record);

    let mut metadata_record = Vec::new();
    encode_len_field(CAPEX_METADATA_FIELD, &metadata_body, &mut metadata_record);
    Ok(parsed.message.with_replaced(CAPEX_METADATA_FIELD, &metadata_record))
}

/// Drops `capexMetadata` entirely, like `ClearField("capexMetadata")`.
pub fn clear_original_digest(manifest: &[u8]) -> Result<Vec<u8>> {
    let parsed = ApexManifest::from(manifest)?;
    parsed.capex_metadata()?;
    Ok(parsed.message.without(CAPEX_METADATA_FIELD))
}

pub fn original_digest(manifest: &[u8]) -> Result<Option<String>> {
    ApexManifest::from(manifest)?.original_digest()
}
