//! Configuration schema types for `pyro.toml`
//!
//! Tool-level settings shared by every project on a machine: where the
//! compiler and archiver live, where outputs go, and per-game install paths.
//! Project-specific settings stay in the descriptor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::descriptor::schema::ZipCompression;
use crate::game::GameType;

/// External tool locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Script compiler executable
    #[serde(default)]
    pub compiler: Option<PathBuf>,
    /// Archiver executable
    #[serde(default)]
    pub archiver: Option<PathBuf>,
}

/// Output and working directories. Relative paths resolve against the
/// project directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Compiled artifact directory
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Staging directory for package assembly
    #[serde(default)]
    pub temp: Option<PathBuf>,
    /// Cache directory for remote imports
    #[serde(default)]
    pub remote_cache: Option<PathBuf>,
    /// Package output directory
    #[serde(default)]
    pub packages: Option<PathBuf>,
    /// Zip output directory
    #[serde(default)]
    pub zips: Option<PathBuf>,
}

/// Build behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Worker limit for parallel compilation (default: available processors)
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Compile in parallel
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Only compile stale scripts
    #[serde(default = "default_true")]
    pub incremental: bool,
    /// Continue to later stages when compilation fails
    #[serde(default)]
    pub ignore_errors: bool,
    /// Game used when neither the command line nor the descriptor names one
    #[serde(default)]
    pub default_game: Option<GameType>,
    /// Zip compression overriding every `ZipFile`'s `Compression`
    #[serde(default)]
    pub zip_compression: Option<ZipCompression>,
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            parallel: true,
            incremental: true,
            ignore_errors: false,
            default_game: None,
            zip_compression: None,
        }
    }
}

/// Per-game settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    /// Game install directory
    #[serde(default)]
    pub install_path: Option<PathBuf>,
    /// Flags file to use instead of the game's stock flags file
    #[serde(default)]
    pub flags: Option<String>,
}

/// Complete `pyro.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PyroConfig {
    /// Tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Directory settings
    #[serde(default)]
    pub paths: PathsConfig,
    /// Build behavior
    #[serde(default)]
    pub build: BuildConfig,
    /// Per-game settings keyed by alias
    #[serde(default)]
    pub games: HashMap<GameType, GameConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "games.fo4.install_path")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pyro.toml: '{}' {}", self.field, self.message)
    }
}

impl PyroConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.build.jobs == Some(0) {
            errors.push(ConfigValidationError {
                field: "build.jobs".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        let tools = [("tools.compiler", &self.tools.compiler), ("tools.archiver", &self.tools.archiver)];
        let paths = [
            ("paths.output", &self.paths.output),
            ("paths.temp", &self.paths.temp),
            ("paths.remote_cache", &self.paths.remote_cache),
            ("paths.packages", &self.paths.packages),
            ("paths.zips", &self.paths.zips),
        ];
        for (field, value) in tools.iter().chain(paths.iter()) {
            if value.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        for (game, settings) in &self.games {
            if settings.install_path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                errors.push(ConfigValidationError {
                    field: format!("games.{}.install_path", game),
                    message: "must not be empty".to_string(),
                });
            }
            if settings.flags.as_deref().is_some_and(|f| f.trim().is_empty()) {
                errors.push(ConfigValidationError {
                    field: format!("games.{}.flags", game),
                    message: "must not be empty".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Settings for one game, if configured.
    pub fn game(&self, game: GameType) -> Option<&GameConfig> {
        self.games.get(&game)
    }
}
