//! Build command implementations (build, plan)

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{BuildArgs, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{
    tool_exists, BuildPipeline, BuildPlan, ConsoleProgress, JsonProgress, ProgressEvent,
    ProgressReporter, Stage,
};
use crate::config::load_config;
use crate::project::{Collaborators, ProjectOptions};

fn reporter(args: &BuildArgs) -> Box<dyn ProgressReporter> {
    if args.json {
        Box::new(JsonProgress::new())
    } else {
        Box::new(ConsoleProgress::new().with_verbose(args.verbose))
    }
}

/// Load `pyro.toml` and build the pipeline inputs for `args`.
fn prepare(args: &BuildArgs) -> Result<(ProjectOptions, Collaborators), String> {
    let project_dir = args
        .project
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = load_config(args.config.as_deref(), &project_dir)
        .map_err(|e| format!("Error loading config: {}", e))?;
    let options = ProjectOptions::from_config(&config, &args.overrides());
    Ok((options, Collaborators::from_config(&config)))
}

/// Run the build command
pub fn run_build(args: &BuildArgs) -> ExitCode {
    let reporter = reporter(args);
    let (options, collaborators) = match prepare(args) {
        Ok(inputs) => inputs,
        Err(e) => {
            reporter.report(ProgressEvent::error(Stage::Pyro, e));
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let pipeline = BuildPipeline::new(options, collaborators, reporter.as_ref());
    match pipeline.run(&args.project) {
        Ok(outcome) => {
            let summary = outcome.summary();
            if outcome.is_success() {
                reporter.report(ProgressEvent::info(Stage::Pyro, summary));
                ExitCode::from(EXIT_SUCCESS)
            } else {
                reporter.report(ProgressEvent::error(Stage::Pyro, summary));
                ExitCode::from(EXIT_ERROR)
            }
        }
        Err(e) => {
            reporter.report(ProgressEvent::error(Stage::Pyro, e.to_string()));
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Resolved project as printed by `pyro plan --json`.
#[derive(Debug, Serialize)]
struct PlanReport {
    project: String,
    game: String,
    compiler: String,
    compiler_found: bool,
    output: String,
    imports: Vec<String>,
    scripts: usize,
    compile: Vec<String>,
    skipped: usize,
    packages: Vec<String>,
    zips: Vec<String>,
}

impl PlanReport {
    fn from_plan(plan: &BuildPlan) -> Self {
        let config = &plan.config;
        let display = |p: &Path| p.display().to_string();
        Self {
            project: config.project_name.clone(),
            game: config.game.display_name().to_string(),
            compiler: display(&config.compiler_path),
            compiler_found: tool_exists(&config.compiler_path),
            output: display(&config.output_path),
            imports: config.imports.iter().map(|i| i.to_string()).collect(),
            scripts: config.scripts.len(),
            compile: plan.compile.iter().map(|s| s.object_name.clone()).collect(),
            skipped: plan.skipped(),
            packages: if config.package {
                config.packages.iter().map(|p| p.name.clone()).collect()
            } else {
                Vec::new()
            },
            zips: if config.zip {
                config.zips.iter().map(|z| z.name.clone()).collect()
            } else {
                Vec::new()
            },
        }
    }

    fn print_text(&self) {
        println!("Project: {} ({})", self.project, self.game);
        println!(
            "Compiler: {}{}",
            self.compiler,
            if self.compiler_found { "" } else { " (not found)" }
        );
        println!("Output: {}", self.output);
        println!("Imports:");
        for import in &self.imports {
            println!("  {}", import);
        }
        println!(
            "Scripts: {} total, {} to compile, {} up to date",
            self.scripts,
            self.compile.len(),
            self.skipped
        );
        for name in &self.compile {
            println!("  {}", name);
        }
        if !self.packages.is_empty() {
            println!("Packages: {}", self.packages.join(", "));
        }
        if !self.zips.is_empty() {
            println!("Zip files: {}", self.zips.join(", "));
        }
    }
}

/// Run the plan command
pub fn run_plan(args: &BuildArgs) -> ExitCode {
    let reporter = reporter(args);
    let (options, collaborators) = match prepare(args) {
        Ok(inputs) => inputs,
        Err(e) => {
            reporter.report(ProgressEvent::error(Stage::Pyro, e));
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let pipeline = BuildPipeline::new(options, collaborators, reporter.as_ref());
    match pipeline.plan(&args.project) {
        Ok(plan) => {
            let report = PlanReport::from_plan(&plan);
            if args.json {
                match serde_json::to_string(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        reporter.report(ProgressEvent::error(Stage::Pyro, e.to_string()));
                        return ExitCode::from(EXIT_ERROR);
                    }
                }
            } else {
                report.print_text();
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            reporter.report(ProgressEvent::error(Stage::Pyro, e.to_string()));
            ExitCode::from(EXIT_ERROR)
        }
    }
}
