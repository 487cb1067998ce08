//! Error taxonomy for the build engine.
//!
//! Every module has its own error enum; they all funnel into [`PyroError`],
//! whose variants match the failure classes a build can hit. Only
//! [`PyroError::BinaryFormat`] may be recovered from, and only while deciding
//! whether a script is stale.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::descriptor::DescriptorError;
use crate::header::HeaderError;
use crate::package::IncludeError;
use crate::variables::VariableError;

/// Top-level error for a build invocation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PyroError {
    /// The project descriptor failed structural validation
    #[error("Schema error: {0}")]
    Schema(String),
    /// Bad variable, missing required attribute, unresolvable root directory
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// No imports, no scripts, unknown game type or game path
    #[error("Path resolution error: {0}")]
    PathResolution(String),
    /// Unrecognized or truncated compiled-artifact header
    #[error("Binary format error: {0}")]
    BinaryFormat(#[from] HeaderError),
    /// An external tool (compiler, archiver, event command) failed
    #[error("External tool failure: {0}")]
    ExternalTool(String),
    /// An output file cannot be opened for writing
    #[error("Cannot create file without write permission to: \"{}\"", .0.display())]
    Permission(PathBuf),
    /// Fetching a remote import failed
    #[error("Remote fetch error: {0}")]
    RemoteFetch(String),
    /// Plain filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PyroError {
    /// Whether this error must abort the build.
    ///
    /// Header errors are recoverable at the staleness check only; everywhere
    /// else the caller decides, so they report `false` here.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PyroError::BinaryFormat(_))
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            PyroError::Schema(_) => "schema_error",
            PyroError::Configuration(_) => "configuration_error",
            PyroError::PathResolution(_) => "path_resolution_error",
            PyroError::BinaryFormat(_) => "binary_format_error",
            PyroError::ExternalTool(_) => "external_tool_failure",
            PyroError::Permission(_) => "permission_error",
            PyroError::RemoteFetch(_) => "remote_fetch_error",
            PyroError::Io(_) => "io_error",
        }
    }
}

impl From<VariableError> for PyroError {
    fn from(e: VariableError) -> Self {
        PyroError::Configuration(e.to_string())
    }
}

impl From<DescriptorError> for PyroError {
    fn from(e: DescriptorError) -> Self {
        match e {
            DescriptorError::Schema(msg) => PyroError::Schema(msg),
            DescriptorError::Variable(v) => PyroError::Configuration(v.to_string()),
            e @ DescriptorError::MissingAttribute { .. } => PyroError::Configuration(e.to_string()),
            DescriptorError::Io(path, err) => PyroError::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {}", path.display(), err),
            )),
            other => PyroError::Schema(other.to_string()),
        }
    }
}

impl From<IncludeError> for PyroError {
    fn from(e: IncludeError) -> Self {
        PyroError::Configuration(e.to_string())
    }
}

impl From<ConfigError> for PyroError {
    fn from(e: ConfigError) -> Self {
        PyroError::Configuration(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = PyroError> = std::result::Result<T, E>;
