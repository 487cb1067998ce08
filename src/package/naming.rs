//! Output file naming and write checks for archives.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::PyroError;

/// Hands out archive file names, never the same one twice in a run.
///
/// Names are compared case-insensitively. A name already handed out gets an
/// index suffix: `MyMod (1).ba2`.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    extension: &'static str,
    replaced: &'static [&'static str],
    taken: Vec<String>,
}

impl NameAllocator {
    /// Allocator producing `.{extension}` names. Any extension in `replaced`
    /// is stripped from requested names first.
    pub fn new(extension: &'static str, replaced: &'static [&'static str]) -> Self {
        Self { extension, replaced, taken: Vec::new() }
    }

    /// Allocator for game archives.
    pub fn for_packages(extension: &'static str) -> Self {
        Self::new(extension, &["ba2", "bsa"])
    }

    /// Allocator for zip files.
    pub fn for_zips() -> Self {
        Self::new("zip", &["zip"])
    }

    fn stem<'a>(&self, name: &'a str) -> &'a str {
        match name.rsplit_once('.') {
            Some((stem, ext)) if self.replaced.iter().any(|r| r.eq_ignore_ascii_case(ext)) => stem,
            _ => name,
        }
    }

    fn is_taken(&self, stem: &str) -> bool {
        self.taken.iter().any(|t| t.eq_ignore_ascii_case(stem))
    }

    /// File name for the archive at position `index`.
    pub fn allocate(&mut self, name: &str, index: usize) -> String {
        let stem = self.stem(name.trim()).to_string();
        let mut candidate = stem.clone();
        let mut suffix = index;
        while self.is_taken(&candidate) {
            candidate = format!("{} ({})", stem, suffix);
            suffix += 1;
        }
        self.taken.push(candidate.clone());
        format!("{}.{}", candidate, self.extension)
    }
}

/// Fail fast when an existing output file cannot be opened for writing.
pub fn probe_write_permission(path: &Path) -> Result<(), PyroError> {
    if !path.is_file() {
        return Ok(());
    }
    match OpenOptions::new().append(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(PyroError::Permission(path.to_path_buf()))
        }
        Err(e) => Err(PyroError::Io(e)),
    }
}
