//! Build pipeline integration tests
//!
//! Runs whole projects through `BuildPipeline` with a fake toolchain:
//! the compiler writes real artifact headers, the archiver records what was
//! staged, and shell events are captured instead of executed.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use walkdir::WalkDir;

use pyro::build::progress::{CollectingProgress, ProgressEvent};
use pyro::build::{BuildPipeline, ToolInvocation, ToolOutput, ToolRunner};
use pyro::header::{encode_header, read_header, ArtifactHeader, HeaderFormat, HeaderString};
use pyro::project::{Collaborators, ProjectOptions};

// ============================================================================
// Test Utilities
// ============================================================================

const COMPILER: &str = "PapyrusCompiler.exe";
const ARCHIVER: &str = "bsarch.exe";

/// Toolchain stand-in recording every invocation.
#[derive(Default)]
struct FakeTools {
    calls: Mutex<Vec<ToolInvocation>>,
    staged: Mutex<Vec<Vec<String>>>,
}

impl FakeTools {
    fn compiled(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program.ends_with(COMPILER))
            .map(|c| c.args[0].clone())
            .collect();
        names.sort();
        names
    }

    fn shell_commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == Path::new("sh") || c.program == Path::new("cmd"))
            .filter_map(|c| c.args.last().cloned())
            .collect()
    }

    fn compile(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let object_name = &invocation.args[0];
        let output = invocation.args[1].trim_start_matches("-o=");
        let stem = Path::new(object_name).file_stem().unwrap().to_string_lossy().into_owned();

        if stem.starts_with("Broken") {
            return Ok(ToolOutput::failure(
                1,
                format!("{}(3,5): error: variable x is undefined", object_name),
            ));
        }
        if stem.starts_with("Silent") {
            return Ok(ToolOutput::success("Compilation succeeded."));
        }

        let artifact = Path::new(output).join(object_name).with_extension("pex");
        fs::create_dir_all(artifact.parent().unwrap())?;
        let bytes = encode_header(&header(now_secs() + 60))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&artifact, bytes)?;
        Ok(ToolOutput::success(format!("Compiling \"{}\"...\nBatch compile of 1 files finished.", object_name)))
    }

    fn archive(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let staging = PathBuf::from(&invocation.args[1]);
        let mut staged: Vec<String> = WalkDir::new(&staging)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path().strip_prefix(&staging).unwrap().to_string_lossy().replace('\\', "/")
            })
            .collect();
        staged.sort();
        self.staged.lock().unwrap().push(staged);
        File::create(&invocation.args[2])?;
        Ok(ToolOutput::success("Packing done"))
    }
}

impl ToolRunner for FakeTools {
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        if invocation.program.ends_with(COMPILER) {
            self.compile(invocation)
        } else if invocation.program.ends_with(ARCHIVER) {
            self.archive(invocation)
        } else {
            Ok(ToolOutput::success(""))
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn header(compile_time: u64) -> ArtifactHeader {
    let text = |value: &str| HeaderString { value: value.to_string(), offset: 0 };
    ArtifactHeader {
        format: HeaderFormat::LittleEndian,
        major_version: 3,
        minor_version: 9,
        game_id: 2,
        compile_time,
        script_path: text("Quest.psc"),
        user_name: text("builder"),
        computer_name: text("BUILDBOX"),
    }
}

/// Create a file with content, creating parent directories.
fn create_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn create_project(dir: &Path, body: &str) -> PathBuf {
    create_file(dir, "MyMod.ppj", body)
}

fn options(dir: &Path) -> ProjectOptions {
    ProjectOptions {
        game_path: Some(dir.to_path_buf()),
        compiler_path: Some(PathBuf::from(COMPILER)),
        archiver_path: Some(PathBuf::from(ARCHIVER)),
        ..Default::default()
    }
}

fn collaborators(tools: &Arc<FakeTools>) -> Collaborators {
    Collaborators::default().with_runner(tools.clone())
}

fn zip_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> =
        (0..archive.len()).map(|i| archive.by_index(i).unwrap().name().to_string()).collect();
    names.sort();
    names
}

const FO4_PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PapyrusProject Game="fo4" Output="Data/Scripts" Package="true" Zip="true">
  <Imports><Import>Source</Import></Imports>
  <Folders><Folder>Source/MyMod</Folder></Folders>
  <Packages Output="dist">
    <Package Name="MyMod" RootDir="Data"><Include>Scripts</Include></Package>
  </Packages>
  <ZipFiles>
    <ZipFile Name="MyMod" RootDir="." Output="release">
      <Include>MyMod.esp</Include>
      <Include>dist</Include>
    </ZipFile>
  </ZipFiles>
  <PreBuildEvent Description="Preparing"><Command>echo pre</Command></PreBuildEvent>
  <PostBuildEvent><Command>echo post</Command></PostBuildEvent>
</PapyrusProject>
"#;

fn create_fo4_mod(dir: &Path) -> PathBuf {
    create_file(dir, "Source/MyMod/Quest.psc", "Scriptname MyMod:Quest extends Quest");
    create_file(dir, "Source/MyMod/Sub/Alias.psc", "Scriptname MyMod:Sub:Alias extends ReferenceAlias");
    create_file(dir, "MyMod.esp", "TES4");
    create_project(dir, FO4_PROJECT)
}

// ============================================================================
// Full builds
// ============================================================================

#[test]
fn test_full_build_compiles_packages_and_zips() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let outcome = BuildPipeline::new(options(temp.path()), collaborators(&tools), &reporter)
        .run(&project)
        .unwrap();

    assert!(outcome.is_success(), "errors: {:?}", reporter.errors());
    assert_eq!(outcome.compile.success_count(), 2);
    assert_eq!(tools.compiled(), vec!["MyMod/Quest.psc", "MyMod/Sub/Alias.psc"]);

    let artifact = temp.path().join("Data/Scripts/MyMod/Sub/Alias.pex");
    assert!(read_header(&artifact).unwrap().compile_time > now_secs());

    assert_eq!(outcome.packages, vec![temp.path().join("dist/MyMod.ba2")]);
    assert_eq!(
        tools.staged.lock().unwrap()[0],
        vec!["Scripts/MyMod/Quest.pex", "Scripts/MyMod/Sub/Alias.pex"]
    );

    assert_eq!(outcome.zips, vec![temp.path().join("release/MyMod.zip")]);
    assert_eq!(zip_entries(&outcome.zips[0]), vec!["MyMod.esp", "dist/MyMod.ba2"]);

    assert_eq!(tools.shell_commands(), vec!["echo pre", "echo post"]);
    assert!(outcome.summary().starts_with("2 compiled, 0 failed, 0 up to date"));
}

#[test]
fn test_second_build_is_incremental() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    let mut opts = options(temp.path());
    opts.package = false;
    opts.zip = false;

    let first = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();
    BuildPipeline::new(opts.clone(), collaborators(&first), &reporter).run(&project).unwrap();
    assert_eq!(first.compiled().len(), 2);

    let second = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();
    let outcome =
        BuildPipeline::new(opts.clone(), collaborators(&second), &reporter).run(&project).unwrap();
    assert!(second.compiled().is_empty());
    assert_eq!(outcome.skipped, 2);
    assert!(outcome.is_success());

    opts.incremental = false;
    let third = Arc::new(FakeTools::default());
    BuildPipeline::new(opts, collaborators(&third), &reporter).run(&project).unwrap();
    assert_eq!(third.compiled().len(), 2);
}

#[test]
fn test_sequential_build_matches_parallel() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    let opts = ProjectOptions { parallel: false, package: false, zip: false, ..options(temp.path()) };
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let outcome = BuildPipeline::new(opts, collaborators(&tools), &reporter).run(&project).unwrap();
    assert_eq!(outcome.compile.success_count(), 2);
    let names: Vec<_> = outcome.compile.units.iter().map(|u| u.object_name.as_str()).collect();
    assert_eq!(names, vec!["MyMod/Sub/Alias.psc", "MyMod/Quest.psc"]);
}

// ============================================================================
// Gating
// ============================================================================

#[test]
fn test_compile_failure_blocks_later_stages() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    create_file(temp.path(), "Source/MyMod/BrokenQuest.psc", "Scriptname MyMod:BrokenQuest");
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let outcome = BuildPipeline::new(options(temp.path()), collaborators(&tools), &reporter)
        .run(&project)
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.compile.failed_count(), 1);
    assert_eq!(outcome.compile.success_count(), 2);
    assert!(outcome.packages.is_empty());
    assert!(outcome.zips.is_empty());
    assert_eq!(tools.shell_commands(), vec!["echo pre"]);
    assert!(reporter.errors().iter().any(|e| e.contains("Failed to compile 1 script")));
    assert!(reporter
        .events()
        .iter()
        .any(|e| matches!(e, ProgressEvent::CompilerOutput { line, .. } if line.contains("undefined"))));
}

#[test]
fn test_ignore_errors_continues_to_packaging() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    create_file(temp.path(), "Source/MyMod/BrokenQuest.psc", "Scriptname MyMod:BrokenQuest");
    let opts = ProjectOptions { ignore_errors: true, ..options(temp.path()) };
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let outcome = BuildPipeline::new(opts, collaborators(&tools), &reporter).run(&project).unwrap();

    assert_eq!(outcome.compile.failed_count(), 1);
    assert_eq!(outcome.packages.len(), 1);
    assert_eq!(outcome.zips.len(), 1);
    assert_eq!(tools.shell_commands(), vec!["echo pre", "echo post"]);
}

#[test]
fn test_missing_artifact_blocks_packaging() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    create_file(temp.path(), "Source/MyMod/SilentQuest.psc", "Scriptname MyMod:SilentQuest");
    let opts = ProjectOptions { ignore_errors: true, ..options(temp.path()) };
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let outcome = BuildPipeline::new(opts, collaborators(&tools), &reporter).run(&project).unwrap();

    assert!(outcome.compile.is_success());
    assert_eq!(
        outcome.missing_artifacts,
        vec![temp.path().join("Data/Scripts/MyMod/SilentQuest.pex")]
    );
    assert!(!outcome.is_success());
    assert!(outcome.packages.is_empty());
    assert!(reporter.errors().iter().any(|e| e.contains("missing scripts")));
}

#[test]
fn test_failing_prebuild_event_aborts() {
    let temp = TempDir::new().unwrap();
    create_file(temp.path(), "Source/Quest.psc", "Scriptname Quest");
    let project = create_project(
        temp.path(),
        r#"<PapyrusProject Game="sse">
             <Imports><Import>Source</Import></Imports>
             <Scripts><Script>Quest</Script></Scripts>
             <PreBuildEvent><Command>exit 4</Command></PreBuildEvent>
           </PapyrusProject>"#,
    );

    struct FailingShell;
    impl ToolRunner for FailingShell {
        fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
            assert!(!invocation.program.ends_with(COMPILER), "compiler must not run");
            Ok(ToolOutput::failure(4, ""))
        }
    }

    let reporter = CollectingProgress::new();
    let collaborators = Collaborators::default().with_runner(Arc::new(FailingShell));
    let err = BuildPipeline::new(options(temp.path()), collaborators, &reporter)
        .run(&project)
        .unwrap_err();
    assert_eq!(err.kind(), "external_tool_failure");
}

// ============================================================================
// Planning
// ============================================================================

#[test]
fn test_plan_runs_no_tools() {
    let temp = TempDir::new().unwrap();
    let project = create_fo4_mod(temp.path());
    let tools = Arc::new(FakeTools::default());
    let reporter = CollectingProgress::new();

    let plan = BuildPipeline::new(options(temp.path()), collaborators(&tools), &reporter)
        .plan(&project)
        .unwrap();

    assert!(tools.calls.lock().unwrap().is_empty());
    assert_eq!(plan.compile.len(), 2);
    assert_eq!(plan.skipped(), 0);

    let commands = plan.commands();
    let args = &commands[0].invocation.args;
    assert_eq!(args[0], "MyMod/Sub/Alias.psc");
    assert!(args.contains(&format!("-o={}", temp.path().join("Data/Scripts").display())));
    assert!(args.contains(&"-f=Institute_Papyrus_Flags.flg".to_string()));
}

#[test]
fn test_plan_prunes_shadowing_imports() {
    let temp = TempDir::new().unwrap();
    create_file(temp.path(), "Base/Quest.psc", "Scriptname Quest");
    create_file(temp.path(), "Mine/Quest.psc", "Scriptname Quest");
    create_file(temp.path(), "Mine/Other.psc", "Scriptname Other");
    let project = create_project(
        temp.path(),
        r#"<PapyrusProject Game="sse">
             <Imports><Import>Base</Import><Import>Mine</Import></Imports>
             <Folders><Folder>Mine</Folder></Folders>
           </PapyrusProject>"#,
    );
    let reporter = CollectingProgress::new();

    let plan = BuildPipeline::new(options(temp.path()), Collaborators::default(), &reporter)
        .plan(&project)
        .unwrap();

    let commands = plan.commands();
    let import_arg = |name: &str| {
        commands
            .iter()
            .find(|c| c.object_name() == name)
            .and_then(|c| c.invocation.args.iter().find(|a| a.starts_with("-i=")).cloned())
            .unwrap()
    };
    let base = temp.path().join("Base").display().to_string();
    let mine = temp.path().join("Mine").display().to_string();
    assert_eq!(import_arg("Quest.psc"), format!("-i={}", mine));
    assert_eq!(import_arg("Other.psc"), format!("-i={};{}", base, mine));
}
