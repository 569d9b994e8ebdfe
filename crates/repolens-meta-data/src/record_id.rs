//! Deterministic identity for embedding records and content hashing

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fixed namespace for record IDs so every process derives the same UUID
/// for the same `(source_id, unit_path)` pair.
const RECORD_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6e, 0x2a, 0x41, 0x7b, 0x9c, 0x35, 0x4d, 0x8f, 0xa1, 0x5e, 0xd4, 0x20, 0x7f, 0x66, 0x03,
    0x92,
]);

/// Derive the stable record ID for a content unit
///
/// Re-ingesting the same path in the same source yields the same ID, which
/// makes writes idempotent across both storage backends.
pub fn generate_record_id(source_id: &str, unit_path: &str) -> Uuid {
    let name = format!("{source_id}\u{1f}{unit_path}");
    Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes())
}

/// SHA-256 hash of content, hex encoded
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().fold(String::new(), |mut acc, byte| {
        use std::fmt::Write;
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_is_deterministic() {
        let a = generate_record_id("gitlab.example.com/team/app", "src/main.rs");
        let b = generate_record_id("gitlab.example.com/team/app", "src/main.rs");
        assert_eq!(a, b);
    }

    #[test]
    fn record_id_distinguishes_paths_and_sources() {
        let base = generate_record_id("repo-a", "lib.rs");
        assert_ne!(base, generate_record_id("repo-a", "main.rs"));
        assert_ne!(base, generate_record_id("repo-b", "lib.rs"));
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let hash = hash_content("fn main() {}");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_content("fn main() {}"));
        assert_ne!(hash, hash_content("fn main() { }"));
    }
}
