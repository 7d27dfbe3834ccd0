//! Compression utilities for cache payloads.

use crate::types::CompressionType;
use cellcache_core::{Error, Result};
use std::io::{Read, Write};

/// zstd level; favours speed since entries are written on the hot path.
const ZSTD_LEVEL: i32 = 3;

/// Compress data using the specified algorithm.
pub fn compress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zstd => zstd::encode_all(data, ZSTD_LEVEL)
            .map_err(|e| Error::Compression(format!("zstd encode failed: {}", e))),
        CompressionType::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
            encoder
                .write_all(data)
                .map_err(|e| Error::Compression(format!("gzip write failed: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Compression(format!("gzip finish failed: {}", e)))
        }
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decompress data using the specified algorithm.
pub fn decompress(data: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Zstd => zstd::decode_all(data)
            .map_err(|e| Error::Compression(format!("zstd decode failed: {}", e))),
        CompressionType::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut output = Vec::new();
            decoder
                .read_to_end(&mut output)
                .map_err(|e| Error::Compression(format!("gzip read failed: {}", e)))?;
            Ok(output)
        }
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Compression(format!("lz4 decode failed: {}", e))),
    }
}
