//! Normalized path value type and path helpers.
//!
//! Every directory the resolver stores (import roots, folders, output paths)
//! goes through [`NormalizedPath`], so the rest of the crate can compare paths
//! without worrying about `.`/`..` components or relative spellings.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// An absolute, lexically normalized path.
///
/// Construct with [`NormalizedPath::new`] (path must already be absolute) or
/// [`NormalizedPath::resolve`] (relative paths are joined onto a base).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath(PathBuf);

impl NormalizedPath {
    /// Normalize an absolute path. Returns `None` for relative input.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return None;
        }
        Some(Self(normalize_lexically(path)))
    }

    /// Normalize `path`, joining it onto `base` first when it is relative.
    ///
    /// `base` is expected to be absolute; if it is not, the current directory
    /// is used to anchor it.
    pub fn resolve(base: &Path, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
        let absolute = if joined.is_absolute() {
            joined
        } else {
            std::env::current_dir().map(|cwd| cwd.join(&joined)).unwrap_or(joined)
        };
        Self(normalize_lexically(&absolute))
    }

    /// Borrow as a `Path`.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Take ownership of the inner `PathBuf`.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join a relative component and normalize the result.
    pub fn join(&self, child: impl AsRef<Path>) -> Self {
        Self(normalize_lexically(&self.0.join(child)))
    }

    /// Parent directory, if any.
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| Self(p.to_path_buf()))
    }

    /// Whether `other` lies inside (or equals) this directory, ignoring case.
    pub fn contains(&self, other: &Path) -> bool {
        starts_with_ignore_case(other, &self.0)
    }

    /// Whether the path exists and is a directory.
    pub fn is_dir(&self) -> bool {
        self.0.is_dir()
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Remove `.` components and fold `..` into the preceding component,
/// without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Case-insensitive `Path::starts_with`, component by component.
pub fn starts_with_ignore_case(path: &Path, prefix: &Path) -> bool {
    let mut path_components = path.components();
    for prefix_component in prefix.components() {
        match path_components.next() {
            Some(c) if eq_ignore_case(c.as_os_str(), prefix_component.as_os_str()) => {}
            _ => return false,
        }
    }
    true
}

/// Case-insensitive `Path::strip_prefix`.
pub fn strip_prefix_ignore_case<'a>(path: &'a Path, prefix: &Path) -> Option<&'a Path> {
    if !starts_with_ignore_case(path, prefix) {
        return None;
    }
    let mut components = path.components();
    for _ in prefix.components() {
        components.next();
    }
    Some(components.as_path())
}

fn eq_ignore_case(a: &std::ffi::OsStr, b: &std::ffi::OsStr) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

/// Number of separators in a path's textual form.
pub fn separator_count(path: &Path) -> usize {
    path.to_string_lossy().chars().filter(|c| *c == '/' || *c == '\\').count()
}

/// Drop duplicates while keeping the first occurrence of each path.
pub fn dedup_paths<T>(paths: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Clone + Eq + std::hash::Hash,
{
    let mut seen = HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Whether a file has the given extension, ignoring case.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
