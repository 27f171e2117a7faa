//! Mount boundaries that recursive descent must not cross.
//!
//! Mount paths are normalized lexically when the set is built: repeated
//! separators, `.` components and trailing separators are dropped. Symlinks
//! are not resolved. Matching is component-wise, so `/mnt/data` covers
//! `/mnt/data/x` but not `/mnt/database`.

use std::path::{Component, Path, PathBuf};

/// Set of mount-point path prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPoints {
    prefixes: Vec<PathBuf>,
}

impl MountPoints {
    /// Build a set from raw mount paths, normalizing each one.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut prefixes: Vec<PathBuf> = Vec::new();
        for path in paths {
            let normalized = normalize(path.as_ref());
            if normalized.as_os_str().is_empty() {
                continue;
            }
            if !prefixes.contains(&normalized) {
                prefixes.push(normalized);
            }
        }
        Self { prefixes }
    }

    /// Collect mount directories of the given filesystem types from a
    /// `/proc/self/mounts`-style table.
    pub fn from_mount_table(contents: &str, fs_types: &[String]) -> Self {
        let dirs = contents.lines().filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let dir = fields.next()?;
            let fs_type = fields.next()?;
            fs_types
                .iter()
                .any(|t| t == fs_type)
                .then(|| unescape_mount_field(dir))
        });
        Self::new(dirs)
    }

    /// The mount `path` lies at or beneath, if any.
    pub fn boundary_for(&self, path: &Path) -> Option<&Path> {
        self.prefixes
            .iter()
            .find(|mount| path.starts_with(mount))
            .map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.prefixes.iter().map(PathBuf::as_path)
    }

    /// Merge another set into this one.
    pub fn extend(&mut self, other: MountPoints) {
        for prefix in other.prefixes {
            if !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }
    }
}

impl<P: AsRef<Path>> FromIterator<P> for MountPoints {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Lexical normalization: `/a//b/./c/` becomes `/a/b/c`.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Decode the octal escapes the kernel uses for whitespace and backslashes
/// in mount table fields (`\040` is a space).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(value) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
