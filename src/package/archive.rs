//! Game archive assembly through the external archiver.
//!
//! Each package is staged into the temp directory in its final layout, packed
//! with one archiver call, and the staging tree is cleared again. Packages are
//! built one at a time; the staging directory is never shared.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::include::IncludeResolver;
use super::naming::{probe_write_permission, NameAllocator};
use super::PackageSpec;
use crate::build::process::{filter_archiver_output, ToolInvocation, ToolRunner};
use crate::build::progress::{ArchiveKind, ProgressEvent, ProgressReporter, Stage};
use crate::error::PyroError;
use crate::game::GameType;
use crate::paths::has_extension;

/// What the staging tree holds, as far as archiver flags care.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagedContent {
    /// Voice, sound or string table files, which must not be compressed
    pub has_uncompressible: bool,
    /// Texture files
    pub has_textures: bool,
    /// Files other than textures
    pub has_non_textures: bool,
}

impl StagedContent {
    /// Scan a staging directory.
    pub fn scan(dir: &Path) -> Self {
        let mut content = Self::default();
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if matches!(extension.as_str(), "fuz" | "wav" | "xwm") || extension.ends_with("strings") {
                content.has_uncompressible = true;
            }
            if has_extension(path, "dds") {
                content.has_textures = true;
            } else {
                content.has_non_textures = true;
            }
        }
        content
    }

    /// Whether the archive may be compressed.
    pub fn compressible(&self) -> bool {
        !self.has_uncompressible
    }
}

/// Archiver arguments for packing `staging` into `output`.
pub fn archiver_arguments(
    game: GameType,
    staging: &Path,
    output: &Path,
    content: StagedContent,
) -> Vec<String> {
    let mut args = vec![
        "pack".to_string(),
        staging.to_string_lossy().into_owned(),
        output.to_string_lossy().into_owned(),
    ];

    match game {
        GameType::Fo4 if !content.has_non_textures => {
            args.push("-fo4dds".to_string());
        }
        GameType::Sse => {
            args.push(game.archiver_switch().to_string());
            // uncompressed SSE archives with embedded names crash on textures
            if !content.compressible() && content.has_textures {
                args.push("-af:0x3".to_string());
            }
        }
        _ => args.push(game.archiver_switch().to_string()),
    }

    args.push("-share".to_string());
    if content.compressible() {
        args.push("-z".to_string());
    }
    args
}

/// Builds every package of a project.
pub struct PackageBuilder<'a> {
    game: GameType,
    archiver: PathBuf,
    temp_dir: PathBuf,
    runner: &'a dyn ToolRunner,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> PackageBuilder<'a> {
    /// Create a builder staging into `temp_dir`.
    pub fn new(
        game: GameType,
        archiver: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        runner: &'a dyn ToolRunner,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self { game, archiver: archiver.into(), temp_dir: temp_dir.into(), runner, reporter }
    }

    /// Build all packages in order, returning the written archive paths.
    pub fn build_all(&self, packages: &[PackageSpec]) -> Result<Vec<PathBuf>, PyroError> {
        let mut names = NameAllocator::for_packages(self.game.package_extension());
        let mut written = Vec::with_capacity(packages.len());

        for (index, spec) in packages.iter().enumerate() {
            let file_name = names.allocate(&spec.name, index);
            let output = spec.output_dir.join(&file_name);
            fs::create_dir_all(&spec.output_dir)?;
            probe_write_permission(&output)?;

            self.clear_staging();
            let result = self.build_one(spec, &output);
            self.clear_staging();
            result?;

            written.push(output);
        }
        Ok(written)
    }

    fn build_one(&self, spec: &PackageSpec, output: &Path) -> Result<(), PyroError> {
        if !spec.root_dir.is_dir() {
            return Err(PyroError::Configuration(format!(
                "Cannot resolve RootDir path to existing folder: \"{}\"",
                spec.root_dir.display()
            )));
        }

        self.reporter.report(ProgressEvent::ArchiveStarted {
            kind: ArchiveKind::Package,
            output: output.to_path_buf(),
        });

        let mut entries = 0;
        for entry in IncludeResolver::new(&spec.root_dir, spec.rules.clone(), false) {
            let entry = entry?;
            let target = self.temp_dir.join(entry.staging_path());
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&entry.source, &target)?;
            self.reporter.report(ProgressEvent::ArchiveEntry {
                kind: ArchiveKind::Package,
                source: entry.source.clone(),
                destination: entry.staging_path().to_string_lossy().to_lowercase(),
            });
            entries += 1;
        }

        if entries == 0 {
            self.reporter.report(ProgressEvent::warning(
                Stage::Package,
                format!("No files matched for \"{}\"", output.display()),
            ));
        }

        let content = StagedContent::scan(&self.temp_dir);
        let invocation = ToolInvocation::new(&self.archiver)
            .args(archiver_arguments(self.game, &self.temp_dir, output, content));
        if self.reporter.is_verbose() {
            self.reporter.report(ProgressEvent::info(Stage::Package, invocation.to_string()));
        }

        let result = self.runner.run(&invocation).map_err(|e| {
            PyroError::ExternalTool(format!("cannot run archiver \"{}\": {}", self.archiver.display(), e))
        })?;
        for line in filter_archiver_output(&result) {
            self.reporter.report(ProgressEvent::info(Stage::Package, line));
        }
        if !result.is_success() {
            return Err(PyroError::ExternalTool(format!(
                "archiver exited with status {} while writing \"{}\"",
                result.status.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                output.display()
            )));
        }

        self.reporter.report(ProgressEvent::ArchiveCompleted {
            kind: ArchiveKind::Package,
            output: output.to_path_buf(),
            entries,
        });
        Ok(())
    }

    fn clear_staging(&self) {
        if self.temp_dir.is_dir() {
            let _ = fs::remove_dir_all(&self.temp_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::process::ToolOutput;
    use crate::build::progress::CollectingProgress;
    use crate::package::IncludeRule;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(ToolInvocation, Vec<PathBuf>)>>,
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
            let staging = PathBuf::from(&invocation.args[1]);
            let mut staged: Vec<PathBuf> = WalkDir::new(&staging)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().strip_prefix(&staging).unwrap().to_path_buf())
                .collect();
            staged.sort();
            self.calls.lock().unwrap().push((invocation.clone(), staged));
            Ok(ToolOutput::success("BSArch v0.9\nPacking done"))
        }
    }

    fn content(uncompressible: bool, textures: bool, other: bool) -> StagedContent {
        StagedContent {
            has_uncompressible: uncompressible,
            has_textures: textures,
            has_non_textures: other,
        }
    }

    #[test]
    fn test_archiver_flags_by_game() {
        let staging = Path::new("/tmp/stage");
        let output = Path::new("/dist/MyMod.ba2");

        let args = archiver_arguments(GameType::Fo4, staging, output, content(false, false, true));
        assert_eq!(&args[3..], ["-fo4", "-share", "-z"]);

        let args = archiver_arguments(GameType::Fo4, staging, output, content(false, true, false));
        assert_eq!(&args[3..], ["-fo4dds", "-share", "-z"]);

        let args = archiver_arguments(GameType::Fo4, staging, output, content(false, false, false));
        assert_eq!(&args[3..], ["-fo4dds", "-share", "-z"]);

        let args = archiver_arguments(GameType::Sse, staging, output, content(true, true, true));
        assert_eq!(&args[3..], ["-sse", "-af:0x3", "-share"]);

        let args = archiver_arguments(GameType::Tes5, staging, output, content(true, false, true));
        assert_eq!(&args[3..], ["-tes5", "-share"]);
    }

    #[test]
    fn test_scan_staging() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Sound/Voice")).unwrap();
        fs::write(temp.path().join("Sound/Voice/line.fuz"), b"").unwrap();
        fs::write(temp.path().join("Strings.DLSTRINGS"), b"").unwrap();

        let scanned = StagedContent::scan(temp.path());
        assert!(!scanned.compressible());
        assert!(!scanned.has_textures);
        assert!(scanned.has_non_textures);
    }

    #[test]
    fn test_build_stages_and_packs() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("MyMod");
        fs::create_dir_all(project.join("out")).unwrap();
        fs::write(project.join("out/Quest.pex"), b"pex").unwrap();
        fs::write(project.join("MyMod.esp"), b"esp").unwrap();

        let spec = PackageSpec {
            name: "MyMod".to_string(),
            root_dir: project.clone(),
            output_dir: temp.path().join("dist"),
            rules: vec![IncludeRule::include("MyMod.esp"), IncludeRule::include("out/*.pex")],
        };
        let runner = RecordingRunner::default();
        let reporter = CollectingProgress::new();
        let staging = temp.path().join("stage");
        let builder =
            PackageBuilder::new(GameType::Sse, "bsarch.exe", &staging, &runner, &reporter);

        let written = builder.build_all(&[spec.clone(), spec]).unwrap();
        assert_eq!(
            written,
            vec![temp.path().join("dist/MyMod.bsa"), temp.path().join("dist/MyMod (1).bsa")]
        );

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].1,
            vec![PathBuf::from("MyMod.esp"), PathBuf::from("Scripts/out/Quest.pex")]
        );
        assert_eq!(calls[0].0.args[0], "pack");
        assert!(!staging.exists());
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            ProgressEvent::ArchiveCompleted { entries: 2, .. }
        )));
    }

    #[test]
    fn test_missing_root_dir_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let spec = PackageSpec {
            name: "MyMod".to_string(),
            root_dir: temp.path().join("missing"),
            output_dir: temp.path().join("dist"),
            rules: Vec::new(),
        };
        let runner = RecordingRunner::default();
        let reporter = CollectingProgress::new();
        let builder =
            PackageBuilder::new(GameType::Fo4, "bsarch.exe", temp.path().join("stage"), &runner, &reporter);
        assert!(matches!(builder.build_all(&[spec]), Err(PyroError::Configuration(_))));
    }
}
