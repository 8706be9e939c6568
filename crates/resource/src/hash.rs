//! Content hash used for name suffixes.
//!
//! SHA-256 over the canonical JSON encoding (keys sorted), truncated to ten
//! hex characters and re-encoded so the suffix never spells words.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use stratum_core::{tree, Result};

const SUFFIX_LEN: usize = 10;

/// Hash the parts of `body` that identify its content.
///
/// ConfigMaps hash kind, name, data and binaryData; Secrets hash kind, type,
/// name and data; anything else hashes the whole object.
pub fn hash_resource(body: &Value) -> Result<String> {
    let field = |path: &[&str]| tree::lookup(body, path).cloned().unwrap_or(Value::Null);
    let kind = tree::lookup_str(body, &["kind"]).unwrap_or("");
    let encoded = match kind {
        "ConfigMap" => encode(&json!({
            "kind": "ConfigMap",
            "name": field(&["metadata", "name"]),
            "data": field(&["data"]),
            "binaryData": field(&["binaryData"]),
        }))?,
        "Secret" => encode(&json!({
            "kind": "Secret",
            "type": field(&["type"]),
            "name": field(&["metadata", "name"]),
            "data": field(&["data"]),
        }))?,
        _ => encode(body)?,
    };
    Ok(hash_str(&encoded))
}

fn encode(v: &Value) -> Result<String> {
    Ok(serde_json::to_string(v)?)
}

fn hash_str(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    let hexed = hex::encode(digest);
    hexed[..SUFFIX_LEN].chars().map(encode_char).collect()
}

fn encode_char(c: char) -> char {
    match c {
        '0' => 'g',
        '1' => 'h',
        '3' => 'k',
        'a' => 'm',
        'e' => 't',
        other => other,
    }
}
