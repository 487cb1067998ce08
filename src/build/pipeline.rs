//! Build pipeline orchestration.
//!
//! Stages run in a fixed order:
//!
//! 1. Load the descriptor and prepare it (schema, variables, game, defaults)
//! 2. Pre-import events, import and script resolution, post-import events
//! 3. Pre-build events
//! 4. Incremental planning and compilation on the worker pool
//! 5. Artifact verification
//! 6. Anonymize, packages and zips, gated on a clean compile
//! 7. Post-build events
//!
//! Fatal errors abort the run with a [`PyroError`]. Compile failures do not:
//! they are recorded in the [`BuildOutcome`] and gate the later stages unless
//! errors are ignored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::build::command::CompileCommand;
use crate::build::events::EventRunner;
use crate::build::incremental::{collect_artifacts, modified_secs, plan_compilation};
use crate::build::parallel::WorkerPool;
use crate::build::progress::{ProgressEvent, ProgressReporter, ProgressTracker, Stage};
use crate::build::result::{BuildOutcome, CompileSummary};
use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::package::{PackageBuilder, ZipBuilder};
use crate::project::{
    Collaborators, EventKind, ProjectConfig, ProjectOptions, ProjectResolver, ScriptUnit,
};

/// A resolved project and the scripts a build would compile.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Resolved configuration
    pub config: ProjectConfig,
    /// Scripts to compile, in dispatch order
    pub compile: Vec<ScriptUnit>,
}

impl BuildPlan {
    /// Scripts left out as up to date.
    pub fn skipped(&self) -> usize {
        self.config.scripts.len().saturating_sub(self.compile.len())
    }

    /// Compiler commands for the planned scripts.
    pub fn commands(&self) -> Vec<CompileCommand> {
        self.compile.iter().map(|s| CompileCommand::for_script(&self.config, s)).collect()
    }
}

/// Runs a project build from descriptor to archives.
pub struct BuildPipeline<'a> {
    options: ProjectOptions,
    collaborators: Collaborators,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> BuildPipeline<'a> {
    /// Create a pipeline.
    pub fn new(
        options: ProjectOptions,
        collaborators: Collaborators,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self { options, collaborators, reporter }
    }

    /// Options the pipeline resolves with.
    pub fn options(&self) -> &ProjectOptions {
        &self.options
    }

    fn resolver(&self) -> ProjectResolver<'_> {
        ProjectResolver::new(&self.options, &self.collaborators, self.reporter)
    }

    fn events<'r>(&'r self, working_dir: &'r Path) -> EventRunner<'r> {
        EventRunner::new(self.collaborators.runner.as_ref(), self.reporter, working_dir)
            .with_ignore_errors(self.options.ignore_errors)
    }

    /// Resolve the project and select the stale scripts without running any
    /// external tool or event.
    pub fn plan(&self, descriptor_path: &Path) -> Result<BuildPlan> {
        let descriptor = Descriptor::load(descriptor_path)?;
        let config = self.resolver().resolve(&descriptor)?;
        Ok(self.plan_config(config))
    }

    fn plan_config(&self, config: ProjectConfig) -> BuildPlan {
        let artifacts = collect_artifacts(&config.output_path);
        let compile = plan_compilation(
            &config.scripts,
            &artifacts,
            &config.missing_scripts,
            self.options.incremental,
            self.reporter,
        );
        BuildPlan { config, compile }
    }

    /// Run every stage.
    pub fn run(&self, descriptor_path: &Path) -> Result<BuildOutcome> {
        let start = Instant::now();
        let descriptor = Descriptor::load(descriptor_path)?;
        let resolver = self.resolver();

        let prepared = resolver.prepare(&descriptor)?;
        let project_dir = prepared.descriptor.project_dir();
        let events = self.events(project_dir.as_path());

        events.run_all(prepared.events_of(EventKind::PreImport))?;
        let config = resolver.resolve_prepared(prepared)?;
        events.run_all(config.events_of(EventKind::PostImport))?;
        events.run_all(config.events_of(EventKind::PreBuild))?;

        let plan = self.plan_config(config);
        let mut outcome = BuildOutcome {
            project_name: plan.config.project_name.clone(),
            skipped: plan.skipped(),
            ..Default::default()
        };

        let compile_start = SystemTime::now();
        outcome.compile = self.compile(&plan)?;
        outcome.missing_artifacts = self.verify_artifacts(&outcome.compile, compile_start);

        let config = &plan.config;
        if !outcome.compile.is_success() && !self.options.ignore_errors {
            self.reporter.report(ProgressEvent::error(
                Stage::Pyro,
                format!(
                    "Failed to compile {} script(s); skipping later stages",
                    outcome.compile.failed_count()
                ),
            ));
        } else if !outcome.missing_artifacts.is_empty() {
            self.reporter.report(ProgressEvent::error(
                Stage::Pyro,
                format!(
                    "Cannot package with missing scripts: {}",
                    outcome
                        .missing_artifacts
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        } else {
            if config.anonymize {
                outcome.anonymized = self.anonymize(&outcome.compile)?;
            }
            if config.package && !config.packages.is_empty() {
                outcome.packages = PackageBuilder::new(
                    config.game,
                    &config.archiver_path,
                    &config.temp_path,
                    self.collaborators.runner.as_ref(),
                    self.reporter,
                )
                .build_all(&config.packages)?;
            }
            if config.zip && !config.zips.is_empty() {
                outcome.zips = ZipBuilder::new(self.options.zip_compression, self.reporter)
                    .build_all(&config.zips)?;
            }
            events.run_all(config.events_of(EventKind::PostBuild))?;
        }

        outcome.total_duration = start.elapsed();
        Ok(outcome)
    }

    fn compile(&self, plan: &BuildPlan) -> Result<CompileSummary> {
        let mut tracker = ProgressTracker::new();
        tracker.start(plan.compile.len(), plan.skipped());
        self.reporter.report(ProgressEvent::BuildStarted { total_scripts: plan.compile.len() });

        if plan.compile.is_empty() {
            self.reporter.report(ProgressEvent::info(Stage::Compile, "All scripts are up to date"));
            self.reporter.report(tracker.build_completed_event());
            return Ok(CompileSummary::new());
        }

        fs::create_dir_all(&plan.config.output_path)?;
        let commands = plan.commands();
        if self.reporter.is_verbose() {
            for command in &commands {
                self.reporter.report(ProgressEvent::info(Stage::Compile, command.invocation.to_string()));
            }
        }

        let pool = if self.options.parallel {
            WorkerPool::new(self.options.worker_limit())
        } else {
            WorkerPool::sequential()
        };
        let summary = pool.execute(&commands, self.collaborators.runner.as_ref(), self.reporter);

        for unit in &summary.units {
            tracker.unit_completed(&unit.object_name, &unit.status);
        }
        self.reporter.report(tracker.build_completed_event());
        Ok(summary)
    }

    /// Artifacts of successfully compiled scripts that do not exist after
    /// compiling. Artifacts that exist but were not rewritten during this
    /// compile are reported and kept.
    fn verify_artifacts(&self, summary: &CompileSummary, compile_start: SystemTime) -> Vec<PathBuf> {
        let window_start = compile_start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut missing = Vec::new();
        for unit in summary.units.iter().filter(|u| u.is_success()) {
            match modified_secs(&unit.artifact) {
                None => missing.push(unit.artifact.clone()),
                Some(mtime) if mtime < window_start => {
                    self.reporter.report(ProgressEvent::warning(
                        Stage::Compile,
                        format!(
                            "Compiler skipped writing \"{}\"; artifact predates this build",
                            unit.artifact.display()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        missing
    }

    fn anonymize(&self, summary: &CompileSummary) -> Result<Vec<PathBuf>> {
        let mut done = Vec::new();
        for unit in summary.units.iter().filter(|u| u.is_success()) {
            if !unit.artifact.is_file() {
                continue;
            }
            self.collaborators.anonymizer.anonymize(&unit.artifact)?;
            self.reporter.report(ProgressEvent::info(
                Stage::Anonymize,
                format!("Anonymized \"{}\"", unit.artifact.display()),
            ));
            done.push(unit.artifact.clone());
        }
        Ok(done)
    }
}
