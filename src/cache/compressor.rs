//! At-rest compression for stored response bodies.
//!
//! Bodies written by the disk store are optionally zstd-compressed. The
//! encoding is recorded next to each entry so decoding never guesses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompressionConfig;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Zstd compression failed: {0}")]
    ZstdError(#[from] std::io::Error),
}

/// How a stored body is encoded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Identity,
    Zstd,
}

pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Encode a body for storage.
    ///
    /// Empty bodies and bodies that do not shrink are kept as-is.
    pub fn encode(&self, body: &[u8]) -> Result<(BodyEncoding, Vec<u8>), CompressionError> {
        if !self.config.zstd_bodies || body.is_empty() {
            return Ok((BodyEncoding::Identity, body.to_vec()));
        }

        let compressed = self.zstd_compress(body)?;
        if compressed.len() < body.len() {
            Ok((BodyEncoding::Zstd, compressed))
        } else {
            Ok((BodyEncoding::Identity, body.to_vec()))
        }
    }

    /// Reverse [`Compressor::encode`].
    pub fn decode(&self, encoding: BodyEncoding, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match encoding {
            BodyEncoding::Identity => Ok(data.to_vec()),
            BodyEncoding::Zstd => self.zstd_decompress(data),
        }
    }

    fn zstd_compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let compressed = zstd::encode_all(data, self.config.zstd_level)?;
        Ok(compressed)
    }

    fn zstd_decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let decompressed = zstd::decode_all(data)?;
        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip() {
        let compressor = Compressor::new(CompressionConfig::default());
        let data = vec![42u8; 4096];

        let (encoding, encoded) = compressor.encode(&data).unwrap();
        assert_eq!(encoding, BodyEncoding::Zstd);
        assert!(encoded.len() < data.len());

        let decoded = compressor.decode(encoding, &encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_disabled_keeps_identity() {
        let compressor = Compressor::new(CompressionConfig {
            zstd_bodies: false,
            ..Default::default()
        });
        let (encoding, encoded) = compressor.encode(b"aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(encoding, BodyEncoding::Identity);
        assert_eq!(encoded, b"aaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_empty_body_is_identity() {
        let compressor = Compressor::new(CompressionConfig::default());
        let (encoding, encoded) = compressor.encode(b"").unwrap();
        assert_eq!(encoding, BodyEncoding::Identity);
        assert!(encoded.is_empty());
    }
}
