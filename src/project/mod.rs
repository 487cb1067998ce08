//! Project resolution.
//!
//! Turns a parsed descriptor and the merged options into a [`ProjectConfig`]:
//! the game, the import roots, the script inventory with expected artifact
//! paths, the package and zip targets, and the build events.

pub mod collaborators;
pub mod options;
pub mod resolver;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::game::GameType;
use crate::package::{PackageSpec, ZipSpec};
use crate::paths::NormalizedPath;

pub use collaborators::{
    Anonymizer, Collaborators, ConfigInstallLocator, InstallLocator, NoAnonymizer, NoRemoteFetcher,
    RemoteFetcher,
};
pub use options::{PathOption, ProjectOptions};
pub use resolver::{resolve_project, PreparedProject, ProjectResolver};

/// One source script and the artifact it compiles to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptUnit {
    /// Absolute source path
    pub source: PathBuf,
    /// Name passed to the compiler: the path relative to the owning import
    /// root for namespaced games, the file name otherwise
    pub object_name: String,
    /// Expected compiled artifact
    pub artifact: PathBuf,
}

impl ScriptUnit {
    /// Whether the artifact currently exists.
    pub fn has_artifact(&self) -> bool {
        self.artifact.is_file()
    }

    /// Source file name without extension.
    pub fn base_name(&self) -> String {
        self.source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

/// When an event's commands run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Before import paths are resolved
    PreImport,
    /// After import paths are resolved
    PostImport,
    /// Before compilation
    PreBuild,
    /// After the whole build
    PostBuild,
}

impl EventKind {
    /// All kinds, in descriptor element order.
    pub const ALL: [EventKind; 4] =
        [EventKind::PreBuild, EventKind::PostBuild, EventKind::PreImport, EventKind::PostImport];

    /// Descriptor element declaring this event.
    pub fn element_name(self) -> &'static str {
        match self {
            EventKind::PreImport => "PreImportEvent",
            EventKind::PostImport => "PostImportEvent",
            EventKind::PreBuild => "PreBuildEvent",
            EventKind::PostBuild => "PostBuildEvent",
        }
    }
}

/// Shell commands attached to a build stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEvent {
    /// Stage the commands run at
    pub kind: EventKind,
    /// `Description` attribute
    pub description: String,
    /// Command lines in declaration order
    pub commands: Vec<String>,
}

/// Fully resolved build configuration. Immutable once resolved.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Descriptor file
    pub descriptor_path: NormalizedPath,
    /// Directory containing the descriptor
    pub project_dir: NormalizedPath,
    /// Descriptor file stem
    pub project_name: String,
    /// Target game
    pub game: GameType,
    /// Game install directory
    pub game_path: PathBuf,
    /// Compiler executable
    pub compiler_path: PathBuf,
    /// Archiver executable
    pub archiver_path: PathBuf,
    /// Flags file passed to the compiler
    pub flags: String,
    /// Artifact output directory
    pub output_path: PathBuf,
    /// Package staging directory
    pub temp_path: PathBuf,
    /// Pass `-op`
    pub optimize: bool,
    /// Pass `-release` (namespaced games only)
    pub release: bool,
    /// Pass `-final` (namespaced games only)
    pub final_build: bool,
    /// Run the anonymize stage
    pub anonymize: bool,
    /// Build packages
    pub package: bool,
    /// Build zip files
    pub zip: bool,
    /// Ordered unique import roots
    pub imports: Vec<NormalizedPath>,
    /// Script inventory
    pub scripts: Vec<ScriptUnit>,
    /// Scripts whose artifact was absent at resolution time
    pub missing_scripts: Vec<ScriptUnit>,
    /// Game archives to build
    pub packages: Vec<PackageSpec>,
    /// Zip files to build
    pub zips: Vec<ZipSpec>,
    /// Variable name to resolved value
    pub variables: HashMap<String, String>,
    /// Build events with `UseInBuild` set
    pub events: Vec<BuildEvent>,
    /// Options the project was resolved with
    pub options: ProjectOptions,
}

impl ProjectConfig {
    /// Commands of every event of `kind`, in declaration order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &BuildEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// The import root owning `path`: the longest root containing it.
    pub fn owning_import(&self, path: &Path) -> Option<&NormalizedPath> {
        owning_root(&self.imports, path)
    }
}

/// The longest root in `roots` that contains `path`.
pub fn owning_root<'a>(roots: &'a [NormalizedPath], path: &Path) -> Option<&'a NormalizedPath> {
    roots
        .iter()
        .filter(|r| r.contains(path))
        .max_by_key(|r| r.as_path().components().count())
}
