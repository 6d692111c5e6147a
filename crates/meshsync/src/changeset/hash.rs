//! Structural content hashing.
//!
//! Objects are hashed over a canonical JSON rendering (object keys sorted
//! recursively, no whitespace) so that field order never changes the hash.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash of a JSON value that ignores object key order.
pub fn structural_hash(value: &Value) -> u64 {
    let mut canonical = Vec::new();
    write_canonical(value, &mut canonical);
    digest_u64(&canonical)
}

/// Hash of a raw serialized object.
///
/// JSON input is hashed structurally; anything else falls back to the bytes.
pub fn hash_object_bytes(raw: &[u8]) -> u64 {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) => structural_hash(&value),
        Err(_) => digest_u64(raw),
    }
}

fn digest_u64(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            // Already sorted with the default map; `preserve_order` would keep insertion order
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_canonical(val, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::String(s) => write_string(s, out),
        // Display of scalar values is already compact JSON
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(Value::String(s.to_string()).to_string().as_bytes());
}
