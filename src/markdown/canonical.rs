//! Text canonicalization and content hashing.
//!
//! Hashes are always taken over the canonical form, so documents that differ
//! only in line endings or trailing whitespace hash identically.

use sha2::{Digest, Sha256};

pub const HASH_PREFIX: &str = "sha256:";

/// LF line endings, no trailing spaces or tabs on any line, and a final newline.
pub fn canonicalize_text(input: &str) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = normalized
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Lowercase hex SHA-256 of the raw input.
pub fn sha256_hex(input: &str) -> String {
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    format!("{:x}", h.finalize())
}

/// `sha256:<64 hex>` over the canonical form of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{HASH_PREFIX}{}", sha256_hex(&canonicalize_text(text)))
}

/// True if `value` has the `sha256:` + 64 lowercase hex shape.
pub fn is_content_hash(value: &str) -> bool {
    value.strip_prefix(HASH_PREFIX).is_some_and(|hex| {
        hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

/// Stable JSON rendering with object keys sorted, for integrity hashing.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    fn sort(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for key in keys {
                    out.insert(key.clone(), sort(&map[key]));
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_normalizes_endings_and_whitespace() {
        assert_eq!(canonicalize_text("a  \r\nb\t\rc"), "a\nb\nc\n");
        assert_eq!(canonicalize_text(""), "\n");
        assert_eq!(canonicalize_text("x\n"), "x\n");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_text("## A \n\n- item\t\n");
        assert_eq!(canonicalize_text(&once), once);
    }

    #[test]
    fn hash_is_deterministic() {
        let text = "# Title\n\n## Section\n";
        assert_eq!(content_hash(text), content_hash(text));
        assert_ne!(content_hash(text), content_hash(&format!("{text}x")));
    }

    #[test]
    fn hash_ignores_canonicalization_only_differences() {
        assert_eq!(content_hash("line one\nline two\n"), content_hash("line one   \r\nline two"));
    }

    #[test]
    fn hash_has_expected_shape() {
        let h = content_hash("anything");
        assert!(h.starts_with("sha256:"));
        assert_eq!(h.len(), "sha256:".len() + 64);
        assert!(is_content_hash(&h));
        assert!(!is_content_hash("sha256:XYZ"));
        assert!(!is_content_hash("md5:abc"));
    }

    #[test]
    fn json_canonical_form_sorts_keys() {
        let a = serde_json::json!({"b": 1, "a": {"d": 2, "c": [3, {"z": 1, "y": 0}]}});
        assert_eq!(canonicalize_json(&a), r#"{"a":{"c":[3,{"y":0,"z":1}],"d":2},"b":1}"#);
    }
}
