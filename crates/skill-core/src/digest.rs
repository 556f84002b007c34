//! Order-insensitive canonical encoding and digest computation.
//!
//! The canonical form follows RFC 8785 for scalars and objects:
//! - UTF-16 code unit ordering for object keys (§3.2.3)
//! - Number normalization (integer-valued floats → integers; reject NaN/Infinity)
//!
//! and departs from it for arrays: every list is treated as a multiset. Each
//! element is canonicalized on its own and the element encodings are sorted,
//! so two evaluator runs that report the same findings in a different order
//! produce the same digest. Duplicates are kept.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::value::Value;

/// Errors produced while canonicalizing a value.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("NaN/Infinity not permitted in canonical form")]
    NonFiniteNumber,

    #[error("value cannot be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn utf16_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn canonical_number(n: &serde_json::Number) -> Result<String, DigestError> {
    if n.is_i64() || n.is_u64() {
        return Ok(n.to_string());
    }
    match n.as_f64() {
        Some(f) if !f.is_finite() => Err(DigestError::NonFiniteNumber),
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok((f as i64).to_string())
        }
        _ => Ok(n.to_string()),
    }
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), DigestError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)?),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::List(items) => {
            let mut encoded = items
                .iter()
                .map(|item| {
                    let mut buf = String::new();
                    write_canonical(item, &mut buf).map(|_| buf)
                })
                .collect::<Result<Vec<_>, _>>()?;
            encoded.sort();
            out.push('[');
            out.push_str(&encoded.join(","));
            out.push(']');
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| utf16_cmp(a, b));
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Convert a value to its canonical, order-insensitive encoding.
pub fn canonical_json(value: &Value) -> Result<String, DigestError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// Compute the SHA256 hex digest of the canonical encoding.
pub fn compute_digest(value: &Value) -> Result<String, DigestError> {
    let canonical = canonical_json(value)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Digest any serializable structure, treating its sequences as sets.
pub fn digest_of<T: Serialize>(value: &T) -> Result<String, DigestError> {
    compute_digest(&Value::encode(value)?)
}

/// Plain SHA256 hex digest of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
