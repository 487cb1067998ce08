//! Packaging: include resolution, game archives and zip files.
//!
//! A [`PackageSpec`] or [`ZipSpec`] names one output archive and the rules
//! selecting its files. [`include::IncludeResolver`] expands the rules;
//! [`archive::PackageBuilder`] and [`zip::ZipBuilder`] write the archives.

pub mod archive;
pub mod include;
pub mod matcher;
pub mod naming;
pub mod zip;

use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::schema::ZipCompression;

pub use archive::PackageBuilder;
pub use include::{IncludeEntry, IncludeResolver, IncludeRule, RuleKind};
pub use naming::{probe_write_permission, NameAllocator};
pub use self::zip::ZipBuilder;

/// Errors raised while expanding include rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum IncludeError {
    /// An `<Include>` or `<Match>` has no text
    #[error("Include path is empty")]
    EmptyPath,
    /// A package include starts with `..`
    #[error("Include paths cannot start with \"..\": \"{0}\"")]
    ParentTraversal(String),
    /// `RewriteToPath` on a zip include
    #[error("RewriteToPath attribute is only available on Packages.Package.Include elements")]
    RewriteInZip,
    /// `RewriteToPath` without a `Path`
    #[error("Path attribute must be defined and not be empty when using the RewriteToPath attribute")]
    RewriteWithoutPath,
    /// A package include names an absolute path outside the root
    #[error("Cannot include path outside RootDir: \"{}\"", .0.display())]
    OutsideRoot(PathBuf),
    /// A `<Match>` search directory does not exist
    #[error("Cannot match path that does not exist or is not a directory: \"{}\"", .0.display())]
    MatchRootMissing(PathBuf),
    /// A `<Match>` pattern starts with `.`
    #[error("Match pattern is not a valid wildcard pattern: \"{0}\"")]
    InvalidMatchPattern(String),
    /// A wildcard failed to compile
    #[error("Invalid wildcard pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern text
        pattern: String,
        /// Parser message
        message: String,
    },
    /// Directory traversal failed
    #[error("Cannot read include directory: {0}")]
    Walk(String),
}

/// A game archive to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Requested archive name (extension optional)
    pub name: String,
    /// Directory include rules resolve against
    pub root_dir: PathBuf,
    /// Directory the archive is written to
    pub output_dir: PathBuf,
    /// Inclusion rules in declaration order
    pub rules: Vec<IncludeRule>,
}

/// A zip file to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipSpec {
    /// Requested file name (extension optional)
    pub name: String,
    /// Directory include rules resolve against
    pub root_dir: PathBuf,
    /// Directory the zip is written to
    pub output_dir: PathBuf,
    /// Compression declared on the element
    pub compression: ZipCompression,
    /// Inclusion rules in declaration order
    pub rules: Vec<IncludeRule>,
}
