//! Content fingerprints used as cache keys.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of a piece of content.
///
/// The fingerprint is the lowercase hex SHA-256 digest of the bytes, so equal
/// content always maps to the same key regardless of where it came from.
pub fn fingerprint(content: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(content.as_ref());
    format!("{digest:x}")
}

/// Compute a fingerprint for a set of files.
///
/// Members are `(path, fingerprint)` pairs. They are sorted before hashing so
/// the result does not depend on iteration order.
pub fn fingerprint_set<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut members: Vec<(&str, &str)> = members.into_iter().collect();
    members.sort_unstable();

    let mut hasher = Sha256::new();
    for (path, fp) in members {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(fp.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}
