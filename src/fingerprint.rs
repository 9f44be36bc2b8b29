//! Semantic fingerprinting of error patterns.
//!
//! The fingerprint is the cross-message cache key: all analyzer instances
//! agree on the derivation, so the record store is the only coordination
//! point. Inputs are the normalized error identity fields only; stack traces,
//! bodies and identifiers never participate.

use crate::models::ErrorPattern;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref UUID_RE: Regex = Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"
    )
    .unwrap();
    static ref TIMESTAMP_RE: Regex = Regex::new(
        r"\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?"
    )
    .unwrap();
    static ref NUM_WITH_UNIT_RE: Regex =
        Regex::new(r"\b\d+(?:\.\d+)?\s?(ms|msec|secs?|seconds?|mins?|hrs?|kb|mb|gb|tb|s|m|h|b)\b")
            .unwrap();
    // Runs of 4+ digits normalize away; shorter integers (HTTP status codes,
    // small counts) are part of the error identity and survive.
    static ref LONG_INT_RE: Regex = Regex::new(r"\b\d{4,}\b").unwrap();
    static ref HEX_RUN_RE: Regex = Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap();
    static ref X_RUN_RE: Regex = Regex::new(r"X(?:\s*X)+").unwrap();
}

/// Replace volatile values in an error message with placeholders so that
/// messages differing only in identifiers, timestamps or magnitudes collapse
/// to the same string. Idempotent: `normalize_value(normalize_value(s)) ==
/// normalize_value(s)`.
pub fn normalize_value(input: &str) -> String {
    let s = UUID_RE.replace_all(input, "X");
    let s = TIMESTAMP_RE.replace_all(&s, "X");
    let s = NUM_WITH_UNIT_RE.replace_all(&s, "X${1}");
    let s = LONG_INT_RE.replace_all(&s, "X");
    let s = HEX_RUN_RE.replace_all(&s, "X");
    let s = X_RUN_RE.replace_all(&s, "X");
    s.into_owned()
}

/// Compute the stable 16-hex-char semantic fingerprint of an error pattern.
pub fn semantic_fingerprint(pattern: &ErrorPattern) -> String {
    let first_line = pattern.message.lines().next().unwrap_or("");

    let mut hasher = Sha256::new();
    hasher.update(pattern.error_type.to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(
        pattern
            .code
            .as_deref()
            .unwrap_or("")
            .to_uppercase()
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(normalize_value(first_line).as_bytes());
    hasher.update(b"|");
    hasher.update(pattern.affected_service.to_lowercase().as_bytes());

    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}
