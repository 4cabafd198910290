//! CF-009: BLAKE3 content digests for `file_unchanged` checks.
//!
//! Digests are tagged with the algorithm so saved values stay comparable if
//! the algorithm ever changes.

use std::fs::File;
use std::path::Path;

const DIGEST_TAG: &str = "blake3";

fn tagged(hash: blake3::Hash) -> String {
    format!("{}:{}", DIGEST_TAG, hash.to_hex())
}

/// Digest of a file's contents, streamed.
pub fn file_digest(path: &Path) -> Result<String, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_reader(file)
        .map_err(|e| format!("cannot hash {}: {}", path.display(), e))?;
    Ok(tagged(hasher.finalize()))
}

/// Digest of in-memory text, in the same format as [`file_digest`].
pub fn text_digest(text: &str) -> String {
    tagged(blake3::hash(text.as_bytes()))
}
