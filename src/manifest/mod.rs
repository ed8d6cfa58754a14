pub mod proto;
pub mod apex_manifest;
mod codec;

pub use apex_manifest::{clear_original_digest, original_digest, set_original_digest, ApexManifest};
pub use codec::{ConvApexManifestCodec, ManifestCodec, TextFormatCodec};
