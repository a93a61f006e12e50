//! Facelock Vault - Path Normalization
//!
//! Tracked paths are stored in one canonical form so lookups behave the same
//! regardless of which separator the caller typed. Canonical form: forward
//! slashes, suffix stripped (kept in its own column).

/// Reserved suffix marking a locked file on disk
pub const LOCKED_SUFFIX: &str = "locked";

/// Sentinel stored for files that have no suffix at all
pub const NO_SUFFIX: &str = "no suffix";

/// Normalize a path string to the canonical form: every `\` becomes `/`.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Split a normalized path into (base, suffix). The suffix is everything
/// after the last `.` of the final component; a component without a dot (or
/// with only a leading dot) yields the [`NO_SUFFIX`] sentinel and the path
/// unchanged.
pub fn split_suffix(path: &str) -> (String, String) {
    let (dir, name) = match path.rfind('/') {
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("", path),
    };

    match name.rfind('.') {
        Some(i) if i > 0 => (
            format!("{dir}{}", &name[..i]),
            name[i + 1..].to_string(),
        ),
        _ => (path.to_string(), NO_SUFFIX.to_string()),
    }
}

/// Rebuild the on-disk open path from a (base, suffix) pair.
pub fn join_suffix(base: &str, suffix: &str) -> String {
    if suffix == NO_SUFFIX {
        base.to_string()
    } else {
        format!("{base}.{suffix}")
    }
}

/// The `.locked` sibling of a base path.
pub fn locked_path(base: &str) -> String {
    format!("{base}.{LOCKED_SUFFIX}")
}
