//! Optional zstd compression with transparent read-side detection
//!
//! Compressed save files keep their normal name; readers sniff the zstd
//! magic prefix and decompress when present, so one read path handles both
//! compressed and plain historical files.

use thiserror::Error;
use tracing::debug;

/// zstd frame magic number, little-endian on disk
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compression/decompression errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// zstd compression failed
    #[error("compression failed: {0}")]
    Compress(std::io::Error),

    /// zstd decompression failed (magic present but frame unreadable)
    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),
}

impl From<CodecError> for chronicle_core::SaveError {
    fn from(e: CodecError) -> Self {
        chronicle_core::SaveError::SerializationFailed(e.to_string())
    }
}

/// Whether `bytes` starts with the zstd magic prefix
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= ZSTD_MAGIC.len() && bytes[..ZSTD_MAGIC.len()] == ZSTD_MAGIC
}

/// Compress `bytes` at the given zstd level
pub fn compress(bytes: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    let out = zstd::encode_all(bytes, level).map_err(CodecError::Compress)?;
    debug!(raw = bytes.len(), compressed = out.len(), "Compressed payload");
    Ok(out)
}

/// Decompress `bytes` if they carry the zstd magic, pass through otherwise
pub fn decompress_auto(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if is_compressed(bytes) {
        zstd::decode_all(bytes).map_err(CodecError::Decompress)
    } else {
        Ok(bytes.to_vec())
    }
}
