//! SHA-256 hex digests over canonically encoded field sets.
//!
//! Both the audit ledger and the retention-process snapshot hash go through
//! [`canonical_json`] so that the digest depends only on field values, never
//! on key insertion order.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Serialize a JSON value to its canonical compact form.
///
/// `serde_json`'s default object map is a `BTreeMap`, so object keys are
/// emitted in sorted order. Nested objects canonicalize the same way.
pub fn canonical_json(value: &serde_json::Value) -> String {
    value.to_string()
}

/// Hash a JSON value: canonical encoding, then SHA-256 hex.
pub fn hash_json(value: &serde_json::Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}
