//! Cache key derivation.
//!
//! A key is the sanitized logical name followed by 128 bits of a SHA-256
//! digest over a canonical encoding of the name and the call arguments.

use crate::types::CacheKey;
use cellcache_core::{ArgValue, CallArgs, Error, Result};
use sha2::{Digest, Sha256};

/// Maximum length of the human-readable part of a key.
const MAX_READABLE_LEN: usize = 64;

/// Bytes of the digest kept in the key (128 bits).
const DIGEST_BYTES: usize = 16;

/// Derive the storage key for a logical name and its call arguments.
pub fn derive_key(name: &str, args: &CallArgs) -> Result<CacheKey> {
    let mut buf = Vec::with_capacity(64);

    encode_str(name, &mut buf);

    encode_len(args.positional.len(), &mut buf);
    for (index, value) in args.positional.iter().enumerate() {
        encode_value(value, &mut buf)
            .map_err(|e| Error::KeyDerivation(format!("positional argument {}: {}", index, e)))?;
    }

    // BTreeMap iteration is already sorted by name
    encode_len(args.keyword.len(), &mut buf);
    for (kw, value) in &args.keyword {
        encode_str(kw, &mut buf);
        encode_value(value, &mut buf)
            .map_err(|e| Error::KeyDerivation(format!("keyword argument '{}': {}", kw, e)))?;
    }

    let hash = Sha256::digest(&buf);
    let hash_str = hex::encode(&hash[..DIGEST_BYTES]);

    Ok(CacheKey::from_storage(format!(
        "{}-{}",
        readable_part(name),
        hash_str
    )))
}

/// Sanitize a key for use in filenames and object names.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            _ => c,
        })
        .collect()
}

fn readable_part(name: &str) -> String {
    let mut readable: String = sanitize_key(name).chars().take(MAX_READABLE_LEN).collect();
    // Dotfiles in the local root are in-flight writes
    if readable.starts_with('.') {
        readable.replace_range(..1, "_");
    }
    if readable.is_empty() {
        readable.push_str("anon");
    }
    readable
}

fn encode_len(len: usize, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(len as u64).to_le_bytes());
}

fn encode_str(s: &str, buf: &mut Vec<u8>) {
    encode_len(s.len(), buf);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_value(value: &ArgValue, buf: &mut Vec<u8>) -> std::result::Result<(), String> {
    match value {
        ArgValue::Null => buf.push(b'n'),
        ArgValue::Bool(b) => {
            buf.push(b'b');
            buf.push(u8::from(*b));
        }
        ArgValue::Int(i) => {
            buf.push(b'i');
            buf.extend_from_slice(&i.to_le_bytes());
        }
        ArgValue::UInt(u) => {
            buf.push(b'u');
            buf.extend_from_slice(&u.to_le_bytes());
        }
        ArgValue::Float(f) => {
            if !f.is_finite() {
                return Err(format!("non-finite float {} has no canonical form", f));
            }
            // 0.0 == -0.0, so both must hash alike
            let f = if *f == 0.0 { 0.0f64 } else { *f };
            buf.push(b'f');
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        ArgValue::Str(s) => {
            buf.push(b's');
            encode_str(s, buf);
        }
        ArgValue::Bytes(bytes) => {
            buf.push(b'x');
            encode_len(bytes.len(), buf);
            buf.extend_from_slice(bytes);
        }
        ArgValue::Seq(items) => {
            buf.push(b'l');
            encode_len(items.len(), buf);
            for item in items {
                encode_value(item, buf)?;
            }
        }
        ArgValue::Map(map) => {
            buf.push(b'm');
            encode_len(map.len(), buf);
            for (k, v) in map {
                encode_str(k, buf);
                encode_value(v, buf)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_derive_key_is_stable() {
        let args = CallArgs::new().arg(3).kwarg("scale", 1.5);
        let a = derive_key("compute", &args).unwrap();
        let b = derive_key("compute", &args).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("compute-"));
        assert_eq!(a.as_str().len(), "compute-".len() + 32);
    }

    #[test]
    fn test_derive_key_differs_by_name_and_args() {
        let none = CallArgs::new();
        let three = CallArgs::new().arg(3);
        let six = CallArgs::new().arg(6);

        let keys = [
            derive_key("a", &none).unwrap(),
            derive_key("b", &none).unwrap(),
            derive_key("a", &three).unwrap(),
            derive_key("a", &six).unwrap(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_positional_and_keyword_are_not_interchangeable() {
        let positional = CallArgs::new().arg(3);
        let keyword = CallArgs::new().kwarg("n", 3);
        assert_ne!(
            derive_key("f", &positional).unwrap(),
            derive_key("f", &keyword).unwrap()
        );
    }

    #[test]
    fn test_kind_is_part_of_the_key() {
        let int = CallArgs::new().arg(1);
        let float = CallArgs::new().arg(1.0);
        let string = CallArgs::new().arg("1");
        assert_ne!(derive_key("f", &int).unwrap(), derive_key("f", &float).unwrap());
        assert_ne!(derive_key("f", &int).unwrap(), derive_key("f", &string).unwrap());
    }

    #[test]
    fn test_map_insertion_order_is_irrelevant() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("k{}", i), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("k{}", i), i);
        }

        let a = CallArgs::new().try_arg(&first).unwrap();
        let b = CallArgs::new().try_arg(&second).unwrap();
        assert_eq!(derive_key("f", &a).unwrap(), derive_key("f", &b).unwrap());
    }

    #[test]
    fn test_nested_sequences_do_not_collide() {
        let flat = CallArgs::new().arg(vec![1, 2]).arg(vec![3]);
        let shifted = CallArgs::new().arg(vec![1]).arg(vec![2, 3]);
        assert_ne!(derive_key("f", &flat).unwrap(), derive_key("f", &shifted).unwrap());
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let args = CallArgs::new().kwarg("x", f64::NAN);
        let err = derive_key("f", &args).unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(msg) if msg.contains("'x'")));

        let args = CallArgs::new().arg(f64::INFINITY);
        assert!(derive_key("f", &args).is_err());
    }

    #[test]
    fn test_negative_zero_matches_zero() {
        let a = CallArgs::new().arg(0.0);
        let b = CallArgs::new().arg(-0.0);
        assert_eq!(derive_key("f", &a).unwrap(), derive_key("f", &b).unwrap());
    }

    #[test]
    fn test_readable_part_is_sanitized() {
        let key = derive_key("../my cell:v1", &CallArgs::new()).unwrap();
        let readable = key.as_str().rsplit_once('-').unwrap().0;
        assert_eq!(readable, "_._my_cell_v1");

        let anon = derive_key("", &CallArgs::new()).unwrap();
        assert!(anon.as_str().starts_with("anon-"));

        let long = derive_key(&"x".repeat(500), &CallArgs::new()).unwrap();
        assert_eq!(long.as_str().len(), MAX_READABLE_LEN + 1 + 32);
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("my/cache/key"), "my_cache_key");
        assert_eq!(sanitize_key("cache:key"), "cache_key");
    }
}
