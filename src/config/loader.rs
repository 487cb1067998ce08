//! Configuration loading and discovery for `pyro.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::PyroConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::descriptor::schema::ZipCompression;
use crate::game::GameType;

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "pyro.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse pyro.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Command-line values that override the config file and the descriptor
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Game type alias
    pub game: Option<GameType>,
    /// Game install directory
    pub game_path: Option<PathBuf>,
    /// Compiler executable
    pub compiler: Option<PathBuf>,
    /// Flags file
    pub flags: Option<String>,
    /// Artifact output directory
    pub output: Option<PathBuf>,
    /// Archiver executable
    pub archiver: Option<PathBuf>,
    /// Staging directory
    pub temp_path: Option<PathBuf>,
    /// Package output directory
    pub package_path: Option<PathBuf>,
    /// Zip output directory
    pub zip_path: Option<PathBuf>,
    /// Remote import cache directory
    pub remote_cache: Option<PathBuf>,
    /// Worker limit
    pub jobs: Option<usize>,
    /// Disable parallel compilation
    pub no_parallel: bool,
    /// Compile every script regardless of staleness
    pub no_incremental: bool,
    /// Skip the anonymize stage
    pub no_anonymize: bool,
    /// Skip packages
    pub no_package: bool,
    /// Skip zip files
    pub no_zip: bool,
    /// Run later stages even when compilation fails
    pub ignore_errors: bool,
    /// Zip compression for every zip file
    pub zip_compression: Option<ZipCompression>,
    /// Skip descriptor schema validation
    pub no_schema: bool,
}

/// Find pyro.toml for a project.
///
/// Search order:
/// 1. Walk up from `start` looking for pyro.toml
/// 2. Check XDG_CONFIG_HOME/pyro/pyro.toml (or ~/.config/pyro/pyro.toml)
pub fn find_config(start: &Path) -> Option<PathBuf> {
    find_config_from(start.to_path_buf()).or_else(find_xdg_config)
}

/// Find pyro.toml in XDG config directory.
///
/// Checks XDG_CONFIG_HOME/pyro/pyro.toml or ~/.config/pyro/pyro.toml
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("pyro").join(CONFIG_FILE_NAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find pyro.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration.
///
/// An explicit `path` must exist. Otherwise the file is discovered from
/// `start` with [`find_config`]; when none is found the defaults apply.
///
/// # Example
/// ```ignore
/// let config = load_config(None, Path::new("C:/Mods/MyMod"))?;
/// ```
pub fn load_config(path: Option<&Path>, start: &Path) -> Result<PyroConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(start),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<PyroConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PyroConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Configuration used when no pyro.toml is found.
pub fn default_config() -> PyroConfig {
    PyroConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values. Overrides with no
/// config counterpart (game, game path, flags, stage switches) are carried by
/// `ProjectOptions` instead.
pub fn merge_cli_overrides(config: &mut PyroConfig, overrides: &CliOverrides) {
    if let Some(ref compiler) = overrides.compiler {
        config.tools.compiler = Some(compiler.clone());
    }
    if let Some(ref archiver) = overrides.archiver {
        config.tools.archiver = Some(archiver.clone());
    }

    if let Some(ref output) = overrides.output {
        config.paths.output = Some(output.clone());
    }
    if let Some(ref temp) = overrides.temp_path {
        config.paths.temp = Some(temp.clone());
    }
    if let Some(ref packages) = overrides.package_path {
        config.paths.packages = Some(packages.clone());
    }
    if let Some(ref zips) = overrides.zip_path {
        config.paths.zips = Some(zips.clone());
    }
    if let Some(ref cache) = overrides.remote_cache {
        config.paths.remote_cache = Some(cache.clone());
    }

    if let Some(jobs) = overrides.jobs {
        config.build.jobs = Some(jobs);
    }
    if overrides.no_parallel {
        config.build.parallel = false;
    }
    if overrides.no_incremental {
        config.build.incremental = false;
    }
    if overrides.ignore_errors {
        config.build.ignore_errors = true;
    }
    if let Some(compression) = overrides.zip_compression {
        config.build.zip_compression = Some(compression);
    }
}

/// Resolve a path relative to the project directory.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project directory.
pub fn resolve_path(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
