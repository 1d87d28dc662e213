//! ETag computation for stored objects.

use sha2::{Digest, Sha256};

/// Strong ETag over the object's bytes: a quoted hex SHA-256 digest.
pub fn compute_etag(bytes: &[u8]) -> String {
  let hash = Sha256::digest(bytes);
  format!("\"{}\"", hex::encode(hash))
}

/// Whether an `If-None-Match` header value matches `etag`.
///
/// Accepts `*`, comma-separated lists, and weak validators.
pub fn if_none_match(header: &str, etag: &str) -> bool {
  header.split(',').map(str::trim).any(|candidate| {
    candidate == "*" || candidate.trim_start_matches("W/") == etag
  })
}
