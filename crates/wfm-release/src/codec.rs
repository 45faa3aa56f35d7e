//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Release descriptor encoding."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;

use crate::release::Release;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to compress release: {0}")]
    Compress(#[source] std::io::Error),
    #[error("failed to decompress release: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("release payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("release payload is not a valid descriptor: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Encode a release as base64 text over a best-compression gzip stream of
/// its protobuf form.
pub fn encode_release(release: &Release) -> Result<String, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&release.encode_to_vec())
        .map_err(CodecError::Compress)?;
    let compressed = encoder.finish().map_err(CodecError::Compress)?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`encode_release`]. Payloads that were stored without gzip
/// are accepted as well.
pub fn decode_release(payload: &str) -> Result<Release, CodecError> {
    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.len() > GZIP_MAGIC.len() && bytes.starts_with(&GZIP_MAGIC) {
        let mut raw = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut raw)
            .map_err(CodecError::Decompress)?;
        return Ok(Release::decode(raw.as_slice())?);
    }
    Ok(Release::decode(bytes.as_slice())?)
}
