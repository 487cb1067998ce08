//! Descriptor to [`ProjectConfig`] resolution.
//!
//! Resolution runs in two halves so build events can wrap import resolution:
//! [`ProjectResolver::prepare`] validates the descriptor, applies variables,
//! picks the game and fills defaults; [`ProjectResolver::resolve_prepared`]
//! resolves imports, scripts, artifacts and archive targets.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::collaborators::{Collaborators, FETCH_ERROR_PREFIX};
use super::options::{resolve_path_option, PathContext, PathOption, ProjectOptions};
use super::{owning_root, BuildEvent, EventKind, ProjectConfig, ScriptUnit};
use crate::build::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::descriptor::schema::{self, parse_compression, SchemaDefaults};
use crate::descriptor::{Descriptor, Element};
use crate::error::{PyroError, Result};
use crate::game::{GameType, ARTIFACT_EXTENSION, SOURCE_EXTENSION};
use crate::package::{IncludeRule, PackageSpec, ZipSpec};
use crate::paths::{dedup_paths, has_extension, strip_prefix_ignore_case, NormalizedPath};
use crate::variables::VariableTable;

/// Descriptor after validation, substitution and defaulting.
#[derive(Debug, Clone)]
pub struct PreparedProject {
    /// Descriptor with variables applied and defaults filled
    pub descriptor: Descriptor,
    /// Target game
    pub game: GameType,
    /// Resolved variables
    pub variables: VariableTable,
    /// Events with `UseInBuild` set
    pub events: Vec<BuildEvent>,
}

impl PreparedProject {
    /// Events of `kind` in declaration order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &BuildEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Resolves descriptors against a set of options.
pub struct ProjectResolver<'a> {
    options: &'a ProjectOptions,
    collaborators: &'a Collaborators,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> ProjectResolver<'a> {
    /// Create a resolver.
    pub fn new(
        options: &'a ProjectOptions,
        collaborators: &'a Collaborators,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self { options, collaborators, reporter }
    }

    /// Resolve a descriptor completely.
    pub fn resolve(&self, descriptor: &Descriptor) -> Result<ProjectConfig> {
        let prepared = self.prepare(descriptor)?;
        self.resolve_prepared(prepared)
    }

    /// Validate, substitute variables, pick the game and fill defaults.
    pub fn prepare(&self, descriptor: &Descriptor) -> Result<PreparedProject> {
        if self.options.use_schema {
            schema::validate(&descriptor.root)?;
        }

        let variables = descriptor.variable_table()?;
        for var in variables.unresolved() {
            self.warn(Stage::Pyro, format!(
                "Variable \"{}\" still references another variable after substitution: \"{}\"",
                var.name, var.resolved
            ));
        }

        let mut descriptor = descriptor.clone();
        descriptor.apply_variables(&variables);

        let game = self.game_type(&descriptor.root)?;
        let project_dir = descriptor.project_dir();
        let ctx = PathContext { options: self.options, project_dir: project_dir.as_path(), game_path: None };
        let option_path = |option| {
            resolve_path_option(option, &ctx).map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
        };
        let defaults = SchemaDefaults {
            project_name: descriptor.project_name(),
            project_dir: project_dir.to_string(),
            flags: self.options.flags_for(game),
            output: option_path(PathOption::Output),
            package_output: option_path(PathOption::Packages),
            zip_output: option_path(PathOption::Zips),
        };
        schema::fill_defaults(&mut descriptor.root, &defaults);

        let events = collect_events(&descriptor.root);
        Ok(PreparedProject { descriptor, game, variables, events })
    }

    /// Resolve imports, scripts, artifacts and archive targets.
    pub fn resolve_prepared(&self, prepared: PreparedProject) -> Result<ProjectConfig> {
        let PreparedProject { descriptor, game, variables, events } = prepared;
        let root = &descriptor.root;
        let project_dir = descriptor.project_dir();

        let mut imports = self.explicit_imports(root, &project_dir)?;
        let folders = self.folders(root, &project_dir, &imports);
        imports = merge_folder_imports(game, imports, &folders);
        if imports.is_empty() {
            return Err(PyroError::PathResolution(
                "Failed to build list of import paths".to_string(),
            ));
        }

        let sources = self.script_sources(root, &project_dir, &imports, &folders);
        if sources.is_empty() {
            return Err(PyroError::PathResolution("No script paths were found".to_string()));
        }

        for added in merge_script_imports(game, &mut imports, &sources) {
            self.info(Stage::Imports, format!("Added implicit import path: \"{}\"", added));
        }

        let output_path = resolve_attr_path(&project_dir, root.attr("Output").unwrap_or_default());
        let scripts: Vec<ScriptUnit> =
            sources.iter().map(|s| script_unit(game, &imports, &output_path, s)).collect();
        let missing_scripts: Vec<ScriptUnit> =
            scripts.iter().filter(|s| !s.has_artifact()).cloned().collect();

        let game_path = self
            .options
            .game_path
            .as_ref()
            .map(|p| crate::config::loader::resolve_path(project_dir.as_path(), p))
            .or_else(|| self.collaborators.locator.locate(game))
            .ok_or_else(|| {
                PyroError::PathResolution(format!(
                    "Cannot determine game path for {}",
                    game.display_name()
                ))
            })?;

        let ctx = PathContext {
            options: self.options,
            project_dir: project_dir.as_path(),
            game_path: Some(&game_path),
        };
        let path_option = |option| {
            resolve_path_option(option, &ctx).ok_or_else(|| {
                PyroError::PathResolution(format!("Cannot resolve {:?} path", option))
            })
        };
        let compiler_path = path_option(PathOption::Compiler)?;
        let archiver_path = path_option(PathOption::Archiver)?;
        let temp_path = path_option(PathOption::Temp)?;

        let packages = package_specs(root, &project_dir);
        let zips = zip_specs(root, &project_dir);

        Ok(ProjectConfig {
            descriptor_path: descriptor.path.clone(),
            project_name: descriptor.project_name(),
            game,
            game_path,
            compiler_path,
            archiver_path,
            flags: root.attr("Flags").unwrap_or_default().to_string(),
            output_path,
            temp_path,
            optimize: root.bool_attr("Optimize"),
            release: root.bool_attr("Release"),
            final_build: root.bool_attr("Final"),
            anonymize: root.bool_attr("Anonymize") && self.options.anonymize,
            package: root.bool_attr("Package") && self.options.package,
            zip: root.bool_attr("Zip") && self.options.zip,
            imports,
            scripts,
            missing_scripts,
            packages,
            zips,
            variables: variables.to_map(),
            events,
            options: self.options.clone(),
            project_dir,
        })
    }

    fn game_type(&self, root: &Element) -> Result<GameType> {
        if let Some(game) = self.options.game_type {
            return Ok(game);
        }
        match root.attr("Game").map(str::trim).filter(|g| !g.is_empty()) {
            Some(alias) => GameType::from_alias(alias).ok_or_else(|| {
                PyroError::PathResolution(format!("Unknown game type \"{}\"", alias))
            }),
            None => self.options.default_game.ok_or_else(|| {
                PyroError::PathResolution("Cannot determine game type".to_string())
            }),
        }
    }

    fn explicit_imports(&self, root: &Element, project_dir: &NormalizedPath) -> Result<Vec<NormalizedPath>> {
        let mut imports = Vec::new();
        for text in root.child_texts("Imports", "Import") {
            if is_remote(text) {
                imports.push(self.fetch_remote(text, project_dir)?);
                continue;
            }
            if text == ".." {
                self.warn(Stage::Imports, "Import paths cannot be equal to \"..\"");
                continue;
            }
            let path = NormalizedPath::resolve(project_dir.as_path(), text);
            if !path.is_dir() {
                self.warn(Stage::Imports, format!("Import path does not exist: \"{}\"", path));
                continue;
            }
            imports.push(path);
        }
        Ok(dedup_paths(imports))
    }

    fn fetch_remote(&self, url: &str, project_dir: &NormalizedPath) -> Result<NormalizedPath> {
        let ctx = PathContext { options: self.options, project_dir: project_dir.as_path(), game_path: None };
        let cache = resolve_path_option(PathOption::RemoteCache, &ctx)
            .unwrap_or_else(|| project_dir.as_path().join(super::options::DEFAULT_REMOTE_CACHE_DIR));
        let destination = NormalizedPath::resolve(&cache, remote_cache_name(url));

        let cached = std::fs::read_dir(destination.as_path())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if cached {
            self.info(Stage::Remote, format!("Using cached remote import: \"{}\"", destination));
            return Ok(destination);
        }

        for message in self.collaborators.fetcher.fetch(url, destination.as_path()) {
            if let Some(error) = message.strip_prefix(FETCH_ERROR_PREFIX) {
                return Err(PyroError::RemoteFetch(error.trim().to_string()));
            }
            self.info(Stage::Remote, message);
        }
        Ok(destination)
    }

    fn folders(
        &self,
        root: &Element,
        project_dir: &NormalizedPath,
        imports: &[NormalizedPath],
    ) -> Vec<(NormalizedPath, bool)> {
        let mut folders = Vec::new();
        let Some(group) = root.child("Folders") else {
            return folders;
        };
        for folder in group.children_named("Folder").filter(|f| !f.text.is_empty()) {
            match find_folder(&folder.text, project_dir, imports) {
                Some(path) => folders.push((path, folder.bool_attr("NoRecurse"))),
                None => self.warn(Stage::Imports, format!("Folder does not exist: \"{}\"", folder.text)),
            }
        }
        dedup_paths(folders)
    }

    fn script_sources(
        &self,
        root: &Element,
        project_dir: &NormalizedPath,
        imports: &[NormalizedPath],
        folders: &[(NormalizedPath, bool)],
    ) -> Vec<NormalizedPath> {
        let mut sources = Vec::new();

        for (folder, no_recurse) in folders {
            let walker = WalkDir::new(folder.as_path())
                .follow_links(true)
                .sort_by_file_name()
                .max_depth(if *no_recurse { 1 } else { usize::MAX });
            for entry in walker.into_iter().filter_map(std::result::Result::ok) {
                if entry.file_type().is_file() && has_extension(entry.path(), SOURCE_EXTENSION) {
                    sources.push(NormalizedPath::resolve(project_dir.as_path(), entry.path()));
                }
            }
        }

        for text in root.child_texts("Scripts", "Script") {
            match find_script(text, project_dir, imports) {
                Some(path) => sources.push(path),
                None => self.warn(Stage::Pyro, format!("Cannot find script file: \"{}\"", text)),
            }
        }

        dedup_paths(sources)
    }

    fn info(&self, stage: Stage, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::info(stage, message));
    }

    fn warn(&self, stage: Stage, message: impl Into<String>) {
        self.reporter.report(ProgressEvent::warning(stage, message));
    }
}

/// Load and resolve the descriptor at `path`.
pub fn resolve_project(
    path: &Path,
    options: &ProjectOptions,
    collaborators: &Collaborators,
    reporter: &dyn ProgressReporter,
) -> Result<ProjectConfig> {
    let descriptor = Descriptor::load(path)?;
    ProjectResolver::new(options, collaborators, reporter).resolve(&descriptor)
}

fn collect_events(root: &Element) -> Vec<BuildEvent> {
    let mut events = Vec::new();
    for el in &root.children {
        let Some(kind) = EventKind::ALL.into_iter().find(|k| k.element_name() == el.name) else {
            continue;
        };
        if !el.bool_attr("UseInBuild") {
            continue;
        }
        events.push(BuildEvent {
            kind,
            description: el.attr("Description").unwrap_or_default().to_string(),
            commands: el
                .children_named("Command")
                .map(|c| c.text.clone())
                .filter(|c| !c.is_empty())
                .collect(),
        });
    }
    events
}

fn is_remote(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Cache directory name for a remote import URL.
pub fn remote_cache_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

fn resolve_attr_path(project_dir: &NormalizedPath, text: &str) -> PathBuf {
    NormalizedPath::resolve(project_dir.as_path(), text.trim()).into_path_buf()
}

fn find_folder(text: &str, project_dir: &NormalizedPath, imports: &[NormalizedPath]) -> Option<NormalizedPath> {
    let path = Path::new(text);
    if path.is_absolute() || text == "." || text == ".." {
        let folder = NormalizedPath::resolve(project_dir.as_path(), path);
        return folder.is_dir().then_some(folder);
    }
    std::iter::once(project_dir)
        .chain(imports.iter())
        .map(|base| base.join(path))
        .find(NormalizedPath::is_dir)
}

/// Turn a `<Script>` entry into a relative file path: `:` separates
/// namespaces (except in a drive letter) and the source extension is added
/// when missing.
pub fn script_relative_path(text: &str) -> PathBuf {
    let text = text.trim();
    let bytes = text.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic();
    let (drive, rest) = if has_drive { text.split_at(2) } else { ("", text) };
    let mut path = format!("{}{}", drive, rest.replace(':', "/"));
    if !has_extension(Path::new(&path), SOURCE_EXTENSION) {
        path.push('.');
        path.push_str(SOURCE_EXTENSION);
    }
    PathBuf::from(path)
}

fn find_script(text: &str, project_dir: &NormalizedPath, imports: &[NormalizedPath]) -> Option<NormalizedPath> {
    let literal = Path::new(text.trim());
    if literal.is_absolute() && literal.is_file() {
        return NormalizedPath::new(literal);
    }
    let relative = script_relative_path(text);
    if relative.is_absolute() {
        return NormalizedPath::new(&relative).filter(|p| p.as_path().is_file());
    }
    std::iter::once(project_dir)
        .chain(imports.iter())
        .map(|base| base.join(&relative))
        .find(|p| p.as_path().is_file())
}

fn merge_folder_imports(
    game: GameType,
    mut imports: Vec<NormalizedPath>,
    folders: &[(NormalizedPath, bool)],
) -> Vec<NormalizedPath> {
    for (folder, _) in folders {
        let implicit = if game.namespaced() {
            if imports.iter().any(|i| i.contains(folder.as_path())) {
                continue;
            }
            folder.parent().unwrap_or_else(|| folder.clone())
        } else {
            folder.clone()
        };
        imports.push(implicit);
    }
    dedup_paths(imports)
}

fn merge_script_imports(
    game: GameType,
    imports: &mut Vec<NormalizedPath>,
    sources: &[NormalizedPath],
) -> Vec<NormalizedPath> {
    let mut added = Vec::new();
    for source in sources {
        let Some(parent) = source.parent() else { continue };
        let needed = if game.namespaced() {
            !imports.iter().any(|i| i.contains(source.as_path()))
        } else {
            !imports.contains(&parent)
        };
        if needed && !imports.contains(&parent) {
            imports.push(parent.clone());
            added.push(parent);
        }
    }
    added
}

fn script_unit(
    game: GameType,
    imports: &[NormalizedPath],
    output: &Path,
    source: &NormalizedPath,
) -> ScriptUnit {
    let file_name = PathBuf::from(source.as_path().file_name().unwrap_or_default());
    let relative = if game.namespaced() {
        owning_root(imports, source.as_path())
            .and_then(|root| strip_prefix_ignore_case(source.as_path(), root.as_path()))
            .map(Path::to_path_buf)
            .unwrap_or_else(|| file_name.clone())
    } else {
        file_name
    };
    ScriptUnit {
        source: source.as_path().to_path_buf(),
        object_name: relative.to_string_lossy().replace('\\', "/"),
        artifact: output.join(&relative).with_extension(ARTIFACT_EXTENSION),
    }
}

fn package_specs(root: &Element, project_dir: &NormalizedPath) -> Vec<PackageSpec> {
    let Some(group) = root.child("Packages") else {
        return Vec::new();
    };
    let output_dir = resolve_attr_path(project_dir, group.attr("Output").unwrap_or_default());
    group
        .children_named("Package")
        .map(|package| PackageSpec {
            name: package.attr("Name").unwrap_or_default().to_string(),
            root_dir: resolve_attr_path(project_dir, package.attr("RootDir").unwrap_or_default()),
            output_dir: output_dir.clone(),
            rules: package.children.iter().filter_map(IncludeRule::from_element).collect(),
        })
        .collect()
}

fn zip_specs(root: &Element, project_dir: &NormalizedPath) -> Vec<ZipSpec> {
    let Some(group) = root.child("ZipFiles") else {
        return Vec::new();
    };
    group
        .children_named("ZipFile")
        .map(|zip| ZipSpec {
            name: zip.attr("Name").unwrap_or_default().to_string(),
            root_dir: resolve_attr_path(project_dir, zip.attr("RootDir").unwrap_or_default()),
            output_dir: resolve_attr_path(project_dir, zip.attr("Output").unwrap_or_default()),
            compression: zip.attr("Compression").and_then(parse_compression).unwrap_or_default(),
            rules: zip.children.iter().filter_map(IncludeRule::from_element).collect(),
        })
        .collect()
}
