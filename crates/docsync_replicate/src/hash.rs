//! Content fingerprints.
//!
//! Documents are hashed over a canonical JSON form (object keys sorted, no
//! whitespace) so two documents with the same content always share a
//! fingerprint regardless of key insertion order. Attachments are hashed
//! over their raw bytes.

use docsync_storage::Document;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical JSON serialization of a document.
pub fn canonicalize(doc: &Document) -> String {
    let mut out = String::new();
    write_object(doc, &mut out);
    out
}

/// Canonical JSON serialization of any JSON value.
pub fn canonicalize_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Fingerprint of a document's canonical form.
pub fn hash_document(doc: &Document) -> String {
    hash_bytes(canonicalize(doc).as_bytes())
}

/// Fingerprint of a JSON value's canonical form.
pub fn hash_value(value: &Value) -> String {
    hash_bytes(canonicalize_value(value).as_bytes())
}

/// Fingerprint of raw attachment bytes.
pub fn hash_attachment(bytes: &[u8]) -> String {
    hash_bytes(bytes)
}

fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        // Scalars already have a single JSON spelling.
        other => out.push_str(&other.to_string()),
    }
}

fn write_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    out.push_str(&Value::String(s.to_string()).to_string());
}
