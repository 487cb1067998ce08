//! Resolved command-line and configuration options.
//!
//! [`ProjectOptions`] is the merged view of `pyro.toml` and the command line.
//! Directory options are looked up through [`PATH_OPTION_TABLE`], one entry
//! per option, each with its own resolution function.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::loader::resolve_path;
use crate::config::{merge_cli_overrides, CliOverrides, PyroConfig};
use crate::descriptor::schema::ZipCompression;
use crate::game::GameType;

/// Default artifact output directory, relative to the project.
pub const DEFAULT_OUTPUT_DIR: &str = "out";
/// Default staging directory, relative to the project.
pub const DEFAULT_TEMP_DIR: &str = ".pyro/temp";
/// Default remote import cache, relative to the project.
pub const DEFAULT_REMOTE_CACHE_DIR: &str = ".pyro/remote";
/// Default package and zip output directory, relative to the project.
pub const DEFAULT_DIST_DIR: &str = "dist";

/// Options that override or supply defaults for a descriptor.
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Game type forced from the command line
    pub game_type: Option<GameType>,
    /// Game type used when nothing else names one
    pub default_game: Option<GameType>,
    /// Game install directory
    pub game_path: Option<PathBuf>,
    /// Compiler executable
    pub compiler_path: Option<PathBuf>,
    /// Flags file name or path
    pub flags_path: Option<String>,
    /// Per-game flags file names from `pyro.toml`
    pub game_flags: HashMap<GameType, String>,
    /// Artifact output directory
    pub output_path: Option<PathBuf>,
    /// Archiver executable
    pub archiver_path: Option<PathBuf>,
    /// Staging directory
    pub temp_path: Option<PathBuf>,
    /// Package output directory
    pub package_path: Option<PathBuf>,
    /// Zip output directory
    pub zip_path: Option<PathBuf>,
    /// Remote import cache directory
    pub remote_cache_path: Option<PathBuf>,
    /// Worker limit
    pub jobs: Option<usize>,
    /// Compile in parallel
    pub parallel: bool,
    /// Only compile stale scripts
    pub incremental: bool,
    /// Allow the anonymize stage
    pub anonymize: bool,
    /// Allow packages
    pub package: bool,
    /// Allow zip files
    pub zip: bool,
    /// Run later stages even when compilation fails
    pub ignore_errors: bool,
    /// Zip compression overriding every `ZipFile`
    pub zip_compression: Option<ZipCompression>,
    /// Validate the descriptor structure
    pub use_schema: bool,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            game_type: None,
            default_game: None,
            game_path: None,
            compiler_path: None,
            flags_path: None,
            game_flags: HashMap::new(),
            output_path: None,
            archiver_path: None,
            temp_path: None,
            package_path: None,
            zip_path: None,
            remote_cache_path: None,
            jobs: None,
            parallel: true,
            incremental: true,
            anonymize: true,
            package: true,
            zip: true,
            ignore_errors: false,
            zip_compression: None,
            use_schema: true,
        }
    }
}

impl ProjectOptions {
    /// Merge a configuration file with command-line overrides.
    pub fn from_config(config: &PyroConfig, overrides: &CliOverrides) -> Self {
        let mut merged = config.clone();
        merge_cli_overrides(&mut merged, overrides);

        let game_flags = merged
            .games
            .iter()
            .filter_map(|(game, settings)| settings.flags.clone().map(|f| (*game, f)))
            .collect();

        Self {
            game_type: overrides.game,
            default_game: merged.build.default_game,
            game_path: overrides.game_path.clone(),
            compiler_path: merged.tools.compiler,
            flags_path: overrides.flags.clone(),
            game_flags,
            output_path: merged.paths.output,
            archiver_path: merged.tools.archiver,
            temp_path: merged.paths.temp,
            package_path: merged.paths.packages,
            zip_path: merged.paths.zips,
            remote_cache_path: merged.paths.remote_cache,
            jobs: merged.build.jobs,
            parallel: merged.build.parallel,
            incremental: merged.build.incremental,
            anonymize: !overrides.no_anonymize,
            package: !overrides.no_package,
            zip: !overrides.no_zip,
            ignore_errors: merged.build.ignore_errors,
            zip_compression: merged.build.zip_compression,
            use_schema: !overrides.no_schema,
        }
    }

    /// Flags file for `game` when the descriptor does not name one.
    pub fn flags_for(&self, game: GameType) -> String {
        self.flags_path
            .clone()
            .or_else(|| self.game_flags.get(&game).cloned())
            .unwrap_or_else(|| game.default_flags().to_string())
    }

    /// Worker limit, falling back to the processor count (at least 2 when
    /// the count is unknown).
    pub fn worker_limit(&self) -> usize {
        self.jobs
            .filter(|&j| j > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2))
    }
}

/// Directory and executable options with a computed default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathOption {
    /// Artifact output directory
    Output,
    /// Staging directory
    Temp,
    /// Remote import cache
    RemoteCache,
    /// Package output directory
    Packages,
    /// Zip output directory
    Zips,
    /// Compiler executable
    Compiler,
    /// Archiver executable
    Archiver,
}

/// Inputs available to a path resolution function.
#[derive(Debug, Clone, Copy)]
pub struct PathContext<'a> {
    /// Merged options
    pub options: &'a ProjectOptions,
    /// Directory containing the descriptor
    pub project_dir: &'a Path,
    /// Resolved game install directory, once known
    pub game_path: Option<&'a Path>,
}

impl PathContext<'_> {
    fn project_relative(&self, explicit: Option<&PathBuf>, default: &str) -> Option<PathBuf> {
        let path = explicit.map(PathBuf::as_path).unwrap_or(Path::new(default));
        Some(resolve_path(self.project_dir, path))
    }
}

/// A path resolution function.
pub type PathResolver = fn(&PathContext<'_>) -> Option<PathBuf>;

fn output_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    ctx.project_relative(ctx.options.output_path.as_ref(), DEFAULT_OUTPUT_DIR)
}

fn temp_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    ctx.project_relative(ctx.options.temp_path.as_ref(), DEFAULT_TEMP_DIR)
}

fn remote_cache_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    ctx.project_relative(ctx.options.remote_cache_path.as_ref(), DEFAULT_REMOTE_CACHE_DIR)
}

fn package_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    ctx.project_relative(ctx.options.package_path.as_ref(), DEFAULT_DIST_DIR)
}

fn zip_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    ctx.project_relative(ctx.options.zip_path.as_ref(), DEFAULT_DIST_DIR)
}

fn compiler_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    match (&ctx.options.compiler_path, ctx.game_path) {
        (Some(path), _) => Some(resolve_path(ctx.project_dir, path)),
        (None, Some(game)) => Some(game.join("Papyrus Compiler").join("PapyrusCompiler.exe")),
        (None, None) => None,
    }
}

fn archiver_path(ctx: &PathContext<'_>) -> Option<PathBuf> {
    let path = ctx.options.archiver_path.as_ref();
    Some(match path {
        Some(p) => resolve_path(ctx.project_dir, p),
        None => ctx.project_dir.join("tools").join("bsarch.exe"),
    })
}

/// Resolution function for every [`PathOption`].
pub const PATH_OPTION_TABLE: &[(PathOption, PathResolver)] = &[
    (PathOption::Output, output_path),
    (PathOption::Temp, temp_path),
    (PathOption::RemoteCache, remote_cache_path),
    (PathOption::Packages, package_path),
    (PathOption::Zips, zip_path),
    (PathOption::Compiler, compiler_path),
    (PathOption::Archiver, archiver_path),
];

/// Resolve one path option through [`PATH_OPTION_TABLE`].
pub fn resolve_path_option(option: PathOption, ctx: &PathContext<'_>) -> Option<PathBuf> {
    PATH_OPTION_TABLE.iter().find(|(o, _)| *o == option).and_then(|(_, resolve)| resolve(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn ctx<'a>(options: &'a ProjectOptions, game_path: Option<&'a Path>) -> PathContext<'a> {
        PathContext { options, project_dir: Path::new("/mods/MyMod"), game_path }
    }

    #[test]
    fn test_table_covers_every_option() {
        for option in [
            PathOption::Output,
            PathOption::Temp,
            PathOption::RemoteCache,
            PathOption::Packages,
            PathOption::Zips,
            PathOption::Compiler,
            PathOption::Archiver,
        ] {
            assert!(PATH_OPTION_TABLE.iter().any(|(o, _)| *o == option), "{:?}", option);
        }
    }

    #[test]
    fn test_default_paths_are_project_relative() {
        let options = ProjectOptions::default();
        let ctx = ctx(&options, None);
        assert_eq!(
            resolve_path_option(PathOption::Output, &ctx),
            Some(PathBuf::from("/mods/MyMod/out"))
        );
        assert_eq!(
            resolve_path_option(PathOption::Zips, &ctx),
            Some(PathBuf::from("/mods/MyMod/dist"))
        );
        assert_eq!(resolve_path_option(PathOption::Compiler, &ctx), None);
    }

    #[test]
    fn test_compiler_defaults_under_game_path() {
        let options = ProjectOptions::default();
        let game = Path::new("/games/Fallout 4");
        let ctx = ctx(&options, Some(game));
        assert_eq!(
            resolve_path_option(PathOption::Compiler, &ctx),
            Some(PathBuf::from("/games/Fallout 4/Papyrus Compiler/PapyrusCompiler.exe"))
        );
    }

    #[test]
    fn test_explicit_paths_win() {
        let options = ProjectOptions {
            output_path: Some(PathBuf::from("/data/scripts")),
            temp_path: Some(PathBuf::from("build/tmp")),
            ..Default::default()
        };
        let ctx = ctx(&options, None);
        assert_eq!(
            resolve_path_option(PathOption::Output, &ctx),
            Some(PathBuf::from("/data/scripts"))
        );
        assert_eq!(
            resolve_path_option(PathOption::Temp, &ctx),
            Some(PathBuf::from("/mods/MyMod/build/tmp"))
        );
    }

    #[test]
    fn test_from_config_merges_overrides() {
        let mut config = PyroConfig::default();
        config.build.default_game = Some(GameType::Sse);
        config.games.insert(
            GameType::Sse,
            GameConfig { install_path: None, flags: Some("Custom.flg".to_string()) },
        );
        let overrides = CliOverrides {
            no_zip: true,
            no_incremental: true,
            output: Some(PathBuf::from("Scripts")),
            ..Default::default()
        };

        let options = ProjectOptions::from_config(&config, &overrides);
        assert_eq!(options.default_game, Some(GameType::Sse));
        assert!(!options.zip);
        assert!(options.package);
        assert!(!options.incremental);
        assert_eq!(options.output_path, Some(PathBuf::from("Scripts")));
        assert_eq!(options.flags_for(GameType::Sse), "Custom.flg");
        assert_eq!(options.flags_for(GameType::Fo4), "Institute_Papyrus_Flags.flg");
    }

    #[test]
    fn test_worker_limit() {
        let options = ProjectOptions { jobs: Some(3), ..Default::default() };
        assert_eq!(options.worker_limit(), 3);
        assert!(ProjectOptions::default().worker_limit() >= 1);
    }
}
