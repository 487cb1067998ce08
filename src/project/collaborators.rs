//! Collaborator interfaces consumed by the resolver and the pipeline.
//!
//! These cover work that lives outside the build engine: fetching remote
//! imports, locating a game install, scrubbing artifact metadata, and running
//! external programs. Each has a default implementation that needs no network,
//! registry or binary rewriting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::process::{ProcessRunner, ToolRunner};
use crate::config::PyroConfig;
use crate::error::PyroError;
use crate::game::GameType;

/// Prefix marking a fatal remote-fetch message.
pub const FETCH_ERROR_PREFIX: &str = "ERROR:";

/// Fetches a remote import into a local cache directory.
pub trait RemoteFetcher: Send + Sync {
    /// Download `url` into `destination`, yielding progress messages.
    ///
    /// A message starting with [`FETCH_ERROR_PREFIX`] means the fetch failed.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
    ) -> Box<dyn Iterator<Item = String> + 'a>;
}

/// Fetcher used when remote imports are not available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemoteFetcher;

impl RemoteFetcher for NoRemoteFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        _destination: &'a Path,
    ) -> Box<dyn Iterator<Item = String> + 'a> {
        Box::new(std::iter::once(format!(
            "{} cannot fetch \"{}\": no remote fetcher is configured",
            FETCH_ERROR_PREFIX, url
        )))
    }
}

/// Finds the install directory of a game.
pub trait InstallLocator: Send + Sync {
    /// Install directory for `game`, if known.
    fn locate(&self, game: GameType) -> Option<PathBuf>;
}

/// Locator reading `[games.<alias>].install_path` from `pyro.toml`.
#[derive(Debug, Default, Clone)]
pub struct ConfigInstallLocator {
    installs: HashMap<GameType, PathBuf>,
}

impl ConfigInstallLocator {
    /// Build from a loaded configuration.
    pub fn from_config(config: &PyroConfig) -> Self {
        let installs = config
            .games
            .iter()
            .filter_map(|(game, settings)| settings.install_path.clone().map(|p| (*game, p)))
            .collect();
        Self { installs }
    }

    /// Register an install path.
    pub fn with_install(mut self, game: GameType, path: impl Into<PathBuf>) -> Self {
        self.installs.insert(game, path.into());
        self
    }
}

impl InstallLocator for ConfigInstallLocator {
    fn locate(&self, game: GameType) -> Option<PathBuf> {
        self.installs.get(&game).filter(|p| p.is_dir()).cloned()
    }
}

/// Removes identifying metadata from compiled artifacts.
pub trait Anonymizer: Send + Sync {
    /// Scrub one artifact in place.
    fn anonymize(&self, artifact: &Path) -> Result<(), PyroError>;
}

/// Anonymizer that leaves artifacts untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnonymizer;

impl Anonymizer for NoAnonymizer {
    fn anonymize(&self, _artifact: &Path) -> Result<(), PyroError> {
        Ok(())
    }
}

/// The set of collaborators a build uses.
#[derive(Clone)]
pub struct Collaborators {
    /// Runs the compiler, archiver and event commands
    pub runner: Arc<dyn ToolRunner>,
    /// Fetches remote imports
    pub fetcher: Arc<dyn RemoteFetcher>,
    /// Locates game installs
    pub locator: Arc<dyn InstallLocator>,
    /// Scrubs artifacts
    pub anonymizer: Arc<dyn Anonymizer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            runner: Arc::new(ProcessRunner),
            fetcher: Arc::new(NoRemoteFetcher),
            locator: Arc::new(ConfigInstallLocator::default()),
            anonymizer: Arc::new(NoAnonymizer),
        }
    }
}

impl Collaborators {
    /// Defaults with install paths taken from `config`.
    pub fn from_config(config: &PyroConfig) -> Self {
        Self { locator: Arc::new(ConfigInstallLocator::from_config(config)), ..Self::default() }
    }

    /// Use a different tool runner.
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Use a different remote fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Use a different install locator.
    pub fn with_locator(mut self, locator: Arc<dyn InstallLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Use a different anonymizer.
    pub fn with_anonymizer(mut self, anonymizer: Arc<dyn Anonymizer>) -> Self {
        self.anonymizer = anonymizer;
        self
    }
}
