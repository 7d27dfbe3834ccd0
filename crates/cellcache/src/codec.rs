//! Payload encoding for cache entries.
//!
//! An entry is one tag byte naming the compression, followed by the
//! compressed JSON form of the value. Values holding NaN or infinite floats
//! are refused since JSON cannot carry them.

use crate::compression::{compress, decompress};
use crate::finite;
use crate::types::CompressionType;
use cellcache_core::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize a value into entry bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T, compression: CompressionType) -> Result<Vec<u8>> {
    finite::check(value).map_err(|e| Error::Serialization(e.to_string()))?;
    let json = serde_json::to_vec(value)?;
    let body = compress(&json, compression)?;

    let mut entry = Vec::with_capacity(body.len() + 1);
    entry.push(compression.tag());
    entry.extend_from_slice(&body);
    Ok(entry)
}

/// Deserialize entry bytes written by [`encode`].
pub fn decode<T: DeserializeOwned>(entry: &[u8]) -> Result<T> {
    let (tag, body) = entry
        .split_first()
        .ok_or_else(|| Error::Serialization("empty cache entry".into()))?;
    let compression = CompressionType::from_tag(*tag)
        .ok_or_else(|| Error::Serialization(format!("unknown entry tag {}", tag)))?;

    let json = decompress(body, compression)?;
    Ok(serde_json::from_slice(&json)?)
}
