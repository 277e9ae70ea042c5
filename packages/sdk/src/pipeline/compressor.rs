// packages/sdk/src/pipeline/compressor.rs
//! zstd body compression
//!
//! Batch POST bodies are compressed when large enough to benefit. Small
//! bodies are sent as-is so the content-encoding header is only set when
//! compression was actually applied.

use crate::utils::errors::{MonitorError, Result};
use tracing::debug;

/// Compression levels.
#[derive(Debug, Clone, Copy)]
pub enum CompressionLevel {
    /// Fast compression (level 1)
    Fast,

    /// Balanced (level 3)
    Balanced,

    /// Best compression (level 19)
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Minimum body size worth compressing.
pub const DEFAULT_MIN_SIZE: usize = 1024;

/// Body compressor.
pub struct Compressor {
    level: CompressionLevel,
    min_size: usize,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self {
            level,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    pub fn with_min_size(level: CompressionLevel, min_size: usize) -> Self {
        Self { level, min_size }
    }

    /// Compress `data` if it is large enough and compression shrinks it.
    ///
    /// Returns `None` when the body should be sent uncompressed.
    pub fn maybe_compress(&self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        if data.len() < self.min_size {
            return Ok(None);
        }

        let compressed = zstd::encode_all(data, self.level.as_i32())
            .map_err(|e| MonitorError::CompressionFailed(e.to_string()))?;

        if compressed.len() >= data.len() {
            return Ok(None);
        }

        debug!(
            original = data.len(),
            compressed = compressed.len(),
            "compressed batch body"
        );

        Ok(Some(compressed))
    }

    /// Decompress a previously compressed body.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| MonitorError::CompressionFailed(e.to_string()))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Balanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_body_skipped() {
        let compressor = Compressor::default();
        let body = br#"{"events":[]}"#;
        assert!(compressor.maybe_compress(body).unwrap().is_none());
    }

    #[test]
    fn test_round_trip() {
        let compressor = Compressor::with_min_size(CompressionLevel::Balanced, 16);
        let body = br#"{"events":[{"type":"behavior","action":"click"}]}"#.repeat(50);

        let compressed = compressor.maybe_compress(&body).unwrap().unwrap();
        assert!(compressed.len() < body.len());

        let restored = compressor.decompress(&compressed).unwrap();
        assert_eq!(restored, body);
    }

    #[test]
    fn test_levels() {
        assert_eq!(CompressionLevel::Fast.as_i32(), 1);
        assert_eq!(CompressionLevel::Balanced.as_i32(), 3);
        assert_eq!(CompressionLevel::Best.as_i32(), 19);
    }
}
