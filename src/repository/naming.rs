use unicode_normalization::UnicodeNormalization;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{RepoError, RepoResult};

/// Object names are stored and compared in NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Rejects names that cannot appear as a path segment.
pub fn validate_name(name: &str) -> RepoResult<()> {
    if name.is_empty() {
        return Err(RepoError::invalid("object name cannot be empty"));
    }
    if name.contains('/') {
        return Err(RepoError::invalid(format!("object name '{}' cannot contain '/'", name)));
    }
    if name.chars().any(|c| c == '\u{0000}') {
        return Err(RepoError::invalid("object name cannot contain NUL characters"));
    }
    Ok(())
}

/// NFC segments of an absolute path; a missing leading `/` is tolerated and empty segments skipped.
pub fn split_path(path: &str) -> Vec<String> {
    normalize_nfc(path).split('/').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') { format!("{}{}", parent, name) } else { format!("{}/{}", parent, name) }
}

/// Stable content id for a byte slice, fixed-width lowercase hex.
pub fn etag_for_bytes(bytes: &[u8]) -> String {
    let h = xxh3_64(bytes);
    format!("{h:016x}")
}

/// Label following `previous` in a version series: `N.0` for major, `N.m` for minor check-ins.
pub fn next_version_label(previous: Option<&str>, major: bool) -> String {
    let (n, m) = previous
        .and_then(|p| p.split_once('.'))
        .and_then(|(a, b)| Some((a.parse::<u32>().ok()?, b.parse::<u32>().ok()?)))
        .unwrap_or((0, 0));
    if major { format!("{}.0", n + 1) } else { format!("{}.{}", n, m + 1) }
}
