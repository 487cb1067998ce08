//! Build result types.
//!
//! Contains types for representing the outcome of compile units and of a
//! whole pipeline run.

use std::path::PathBuf;
use std::time::Duration;

use crate::build::progress::CompileStatus;

/// Result of compiling a single script.
#[derive(Debug, Clone)]
pub struct UnitResult {
    /// Object name passed to the compiler
    pub object_name: String,
    /// Source file
    pub source: PathBuf,
    /// Expected artifact
    pub artifact: PathBuf,
    /// Outcome
    pub status: CompileStatus,
    /// Filtered compiler output
    pub output: Vec<String>,
    /// Wall time of the invocation
    pub duration: Duration,
}

impl UnitResult {
    /// Check if this unit compiled.
    pub fn is_success(&self) -> bool {
        self.status == CompileStatus::Success
    }
}

/// Aggregated results of a compile stage.
#[derive(Debug, Clone, Default)]
pub struct CompileSummary {
    /// Per-unit results in dispatch order
    pub units: Vec<UnitResult>,
    /// Total duration of the stage
    pub total_duration: Duration,
}

impl CompileSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units that compiled.
    pub fn success_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_success()).count()
    }

    /// Number of units that failed.
    pub fn failed_count(&self) -> usize {
        self.units.len() - self.success_count()
    }

    /// Check if no unit failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Results of the units that failed.
    pub fn failures(&self) -> impl Iterator<Item = &UnitResult> {
        self.units.iter().filter(|u| !u.is_success())
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Project name
    pub project_name: String,
    /// Compile stage results
    pub compile: CompileSummary,
    /// Scripts left out as up to date
    pub skipped: usize,
    /// Artifacts expected but not written by the compiler
    pub missing_artifacts: Vec<PathBuf>,
    /// Artifacts handed to the anonymizer
    pub anonymized: Vec<PathBuf>,
    /// Game archives written
    pub packages: Vec<PathBuf>,
    /// Zip files written
    pub zips: Vec<PathBuf>,
    /// Total duration
    pub total_duration: Duration,
}

impl BuildOutcome {
    /// Check if the run succeeded: every unit compiled and every artifact
    /// exists.
    pub fn is_success(&self) -> bool {
        self.compile.is_success() && self.missing_artifacts.is_empty()
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} compiled", self.compile.success_count()),
            format!("{} failed", self.compile.failed_count()),
            format!("{} up to date", self.skipped),
        ];
        if !self.packages.is_empty() {
            parts.push(format!("{} package(s)", self.packages.len()));
        }
        if !self.zips.is_empty() {
            parts.push(format!("{} zip(s)", self.zips.len()));
        }
        parts.join(", ")
    }
}
