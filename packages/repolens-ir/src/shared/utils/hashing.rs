//! Content and file hashing
//!
//! Node content hashes use SHA-256 over span text normalized so that a
//! hash changes iff the code meaningfully changed: line comments are
//! elided, trailing whitespace is stripped, blank lines are dropped. This
//! is what lets a comment-only edit classify as a no-op. File-level change
//! detection uses blake3 over raw bytes.

use sha2::{Digest, Sha256};

/// Strip a `#` line comment, respecting string quoting
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1; // skip escaped char
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if b == b'#' {
                    return &line[..i];
                }
            }
        }
        i += 1;
    }
    line
}

/// Normalize span text: elide line comments, strip trailing whitespace,
/// drop blank lines
pub fn normalize_span_text(text: &str) -> String {
    text.lines()
        .map(strip_line_comment)
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// SHA-256 content hash of a node's span text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_span_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// blake3 hash of raw file bytes, for change detection and cache keys
pub fn file_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_ignores_trailing_whitespace() {
        let a = content_hash("def f():\n    return 1\n");
        let b = content_hash("def f():   \n    return 1   \n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_ignores_comments() {
        let a = content_hash("def f():\n    return 1");
        let b = content_hash("def f():\n    # explain\n    return 1  # why");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_in_string_is_not_a_comment() {
        let a = content_hash("x = 'a#b'");
        let b = content_hash("x = 'a'");
        assert_ne!(a, b);
        assert_eq!(normalize_span_text("x = 'a#b'"), "x = 'a#b'");
    }

    #[test]
    fn test_content_hash_sensitive_to_body() {
        let a = content_hash("def f():\n    return 1");
        let b = content_hash("def f():\n    return 2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_sensitive_to_indentation() {
        let a = content_hash("x = 1");
        let b = content_hash("    x = 1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_hash_deterministic() {
        assert_eq!(file_hash(b"abc"), file_hash(b"abc"));
        assert_ne!(file_hash(b"abc"), file_hash(b"abd"));
    }
}
