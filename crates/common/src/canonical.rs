//! Canonical JSON encoding and body digests.
//!
//! Signer and verifier must agree byte for byte on what was signed, so payloads
//! are rendered with object keys in lexicographic order and without
//! insignificant whitespace. Arrays keep their order. Scalars use the
//! `serde_json` encoding.

use error_stack::{Report, ResultExt};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::constants::DIGEST_PREFIX;
use crate::error::PensiunError;

/// Renders a JSON value in canonical form.
///
/// # Errors
///
/// Returns an error if a string or number cannot be encoded.
pub fn canonicalize(value: &Value) -> Result<String, Report<PensiunError>> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Serializes any value to JSON and renders it in canonical form.
///
/// # Errors
///
/// Returns an error if the value does not serialize to JSON.
pub fn canonicalize_serializable<T: Serialize>(
    value: &T,
) -> Result<String, Report<PensiunError>> {
    let value = serde_json::to_value(value).change_context(PensiunError::Canonicalization {
        message: "Failed to convert payload to JSON".into(),
    })?;
    canonicalize(&value)
}

fn write_value(value: &Value, out: &mut String) -> Result<(), Report<PensiunError>> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                write_value(&map[key], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<(), Report<PensiunError>> {
    let encoded = serde_json::to_string(s).change_context(PensiunError::Canonicalization {
        message: "Failed to encode JSON string".into(),
    })?;
    out.push_str(&encoded);
    Ok(())
}

/// Computes the SHA-256 digest of a request body as `sha256:<hex>`.
#[must_use]
pub fn compute_body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{}{}", DIGEST_PREFIX, hex::encode(hasher.finalize()))
}

/// Computes the SHA-256 digest of a settings document.
///
/// Line endings are normalized to LF so the hash is stable across platforms.
#[must_use]
pub fn compute_settings_hash(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    compute_body_digest(normalized.as_bytes())
}
