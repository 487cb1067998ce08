//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::CliOverrides;
use crate::descriptor::schema::{parse_compression, ZipCompression};
use crate::game::GameType;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Pyro - incremental build tool for Papyrus script projects
#[derive(Parser)]
#[command(name = "pyro")]
#[command(about = "Pyro - compile, package and zip Papyrus script projects (.ppj)")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile stale scripts, then build packages and zip files
    Build(BuildArgs),
    /// Resolve the project and list what a build would do, without running tools
    Plan(BuildArgs),
}

fn parse_game(value: &str) -> Result<GameType, String> {
    GameType::from_alias(value)
        .ok_or_else(|| format!("unknown game type '{}' (expected fo4, sse or tes5)", value))
}

fn parse_zip_compression(value: &str) -> Result<ZipCompression, String> {
    parse_compression(value)
        .ok_or_else(|| format!("unknown compression '{}' (expected store or deflate)", value))
}

/// Arguments shared by `build` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Project descriptor (.ppj)
    pub project: PathBuf,

    /// Explicit pyro.toml (default: discovered from the project directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target game: fo4, sse or tes5
    #[arg(short, long, value_parser = parse_game)]
    pub game: Option<GameType>,

    /// Game install directory
    #[arg(long)]
    pub game_path: Option<PathBuf>,

    /// Compiler executable
    #[arg(long)]
    pub compiler: Option<PathBuf>,

    /// Flags file used when the descriptor does not name one
    #[arg(long)]
    pub flags: Option<String>,

    /// Artifact output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Archiver executable
    #[arg(long)]
    pub archiver: Option<PathBuf>,

    /// Package staging directory
    #[arg(long)]
    pub temp_path: Option<PathBuf>,

    /// Package output directory
    #[arg(long)]
    pub package_path: Option<PathBuf>,

    /// Zip output directory
    #[arg(long)]
    pub zip_path: Option<PathBuf>,

    /// Remote import cache directory
    #[arg(long)]
    pub remote_cache: Option<PathBuf>,

    /// Maximum concurrent compiler processes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Compile one script at a time
    #[arg(long)]
    pub no_parallel: bool,

    /// Compile every script, ignoring artifact timestamps
    #[arg(long)]
    pub no_incremental: bool,

    /// Skip the anonymize stage
    #[arg(long)]
    pub no_anonymize: bool,

    /// Skip building packages
    #[arg(long)]
    pub no_package: bool,

    /// Skip building zip files
    #[arg(long)]
    pub no_zip: bool,

    /// Continue to later stages when scripts fail to compile
    #[arg(long)]
    pub ignore_errors: bool,

    /// Compression for every zip file: store or deflate
    #[arg(long, value_parser = parse_zip_compression)]
    pub zip_compression: Option<ZipCompression>,

    /// Skip descriptor schema validation
    #[arg(long)]
    pub no_schema: bool,

    /// Emit JSON lines instead of console output
    #[arg(long)]
    pub json: bool,

    /// Show commands and extra detail
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    /// Overrides for the configuration file and descriptor.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            game: self.game,
            game_path: self.game_path.clone(),
            compiler: self.compiler.clone(),
            flags: self.flags.clone(),
            output: self.output.clone(),
            archiver: self.archiver.clone(),
            temp_path: self.temp_path.clone(),
            package_path: self.package_path.clone(),
            zip_path: self.zip_path.clone(),
            remote_cache: self.remote_cache.clone(),
            jobs: self.jobs,
            no_parallel: self.no_parallel,
            no_incremental: self.no_incremental,
            no_anonymize: self.no_anonymize,
            no_package: self.no_package,
            no_zip: self.no_zip,
            ignore_errors: self.ignore_errors,
            zip_compression: self.zip_compression,
            no_schema: self.no_schema,
        }
    }
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_INVALID_ARGS } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match cli.command {
        Commands::Build(args) => build::run_build(&args),
        Commands::Plan(args) => build::run_plan(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_flags() {
        let cli = Cli::try_parse_from([
            "pyro",
            "build",
            "MyMod.ppj",
            "--game",
            "SSE",
            "--jobs",
            "4",
            "--no-zip",
            "--zip-compression",
            "store",
            "--verbose",
        ])
        .unwrap();

        let Commands::Build(args) = cli.command else { panic!("expected build") };
        let overrides = args.overrides();
        assert_eq!(overrides.game, Some(GameType::Sse));
        assert_eq!(overrides.jobs, Some(4));
        assert!(overrides.no_zip);
        assert_eq!(overrides.zip_compression, Some(ZipCompression::Store));
        assert!(args.verbose);
    }

    #[test]
    fn test_invalid_game_is_usage_error() {
        let err = Cli::try_parse_from(["pyro", "plan", "MyMod.ppj", "--game", "fo3"])
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), i32::from(EXIT_INVALID_ARGS));
    }

    #[test]
    fn test_missing_project_is_usage_error() {
        assert!(Cli::try_parse_from(["pyro", "build"]).is_err());
    }
}
