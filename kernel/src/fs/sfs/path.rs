//! Path handling over the flat namespace.
//!
//! Every stored name is an absolute path. Hierarchy exists only as string
//! prefixes: `/a/b` is a child of `/a` because it extends it by one segment.

use core::fmt;
use core::ops::Deref;

use super::config::MAX_PATH_LEN;
use super::error::SfsError;

/// A normalized absolute path that fits the directory entry name field
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NormalizedPath {
    buf: [u8; MAX_PATH_LEN],
    len: usize,
}

impl NormalizedPath {
    /// The root directory
    pub const ROOT: NormalizedPath = {
        let mut buf = [0u8; MAX_PATH_LEN];
        buf[0] = b'/';
        NormalizedPath { buf, len: 1 }
    };

    pub fn as_str(&self) -> &str {
        // Only ever built from `&str` pieces split at ASCII '/'
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("/")
    }

    pub fn is_root(&self) -> bool {
        self.len == 1
    }
}

impl Deref for NormalizedPath {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a caller-supplied path.
///
/// Empty input is the root. Relative input gains a leading `/`. Trailing
/// `/` are stripped except for the root itself. The length limit applies to
/// the full result, so nothing is ever silently cut off.
pub fn normalize(path: &str) -> Result<NormalizedPath, SfsError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(NormalizedPath::ROOT);
    }

    let prefix = if trimmed.starts_with('/') { 0 } else { 1 };
    let len = trimmed.len() + prefix;
    if len > MAX_PATH_LEN {
        return Err(SfsError::PathTooLong);
    }

    let mut buf = [0u8; MAX_PATH_LEN];
    buf[0] = b'/';
    buf[prefix..len].copy_from_slice(trimmed.as_bytes());
    Ok(NormalizedPath { buf, len })
}

/// Parent directory of a normalized path. The root is its own parent.
pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

/// Final segment of a path
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// True if `candidate` sits exactly one segment below `dir`.
///
/// Comparison happens on the relative forms, so names stored before the
/// absolute-path convention (no leading `/`) resolve the same way.
pub fn is_direct_child(dir: &str, candidate: &str) -> bool {
    let dir = dir.trim_start_matches('/');
    let candidate = candidate.trim_start_matches('/');
    if candidate.is_empty() {
        return false;
    }
    if dir.is_empty() {
        return !candidate.contains('/');
    }
    candidate
        .strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .map_or(false, |rest| !rest.is_empty() && !rest.contains('/'))
}
