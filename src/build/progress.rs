//! Build progress reporting.
//!
//! Every component logs through an injected [`ProgressReporter`]; there is no
//! global logger. Console output is tagged per stage (`[pyro]`, `[compile]`,
//! `[package]`, `[zip]`, ...), JSON output is one object per line.
//!
//! # Example
//!
//! ```ignore
//! use pyro::build::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::BuildStarted { total_scripts: 2 });
//! reporter.report(ProgressEvent::CompileStarted { object_name: "MyMod:Quest".to_string() });
//! ```

use serde::Serialize;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of one compile unit in progress events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CompileStatus {
    /// Compiled successfully
    Success,
    /// Compiler reported failure
    Failed(String),
}

impl std::fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileStatus::Success => write!(f, "success"),
            CompileStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Which stage a message belongs to. Selects the console tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolution and general messages
    Pyro,
    /// Import path resolution
    Imports,
    /// Script compilation
    Compile,
    /// Build and import events
    Event,
    /// Remote import fetching
    Remote,
    /// Artifact anonymization
    Anonymize,
    /// Game archive assembly
    Package,
    /// Zip assembly
    Zip,
}

impl Stage {
    fn tag(self) -> &'static str {
        match self {
            Stage::Pyro => "[pyro]",
            Stage::Imports => "[imports]",
            Stage::Compile => "[compile]",
            Stage::Event => "[event]",
            Stage::Remote => "[remote]",
            Stage::Anonymize => "[anonymize]",
            Stage::Package => "[package]",
            Stage::Zip => "[zip]",
        }
    }
}

/// Kind of archive being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Game archive built by the external archiver
    Package,
    /// Zip file
    Zip,
}

impl ArchiveKind {
    fn stage(self) -> Stage {
        match self {
            ArchiveKind::Package => Stage::Package,
            ArchiveKind::Zip => Stage::Zip,
        }
    }
}

/// Events that can be reported during a build.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Compilation stage started
    BuildStarted {
        /// Number of scripts to compile
        total_scripts: usize,
    },
    /// A compiler invocation started
    CompileStarted {
        /// Object name passed to the compiler
        object_name: String,
    },
    /// A compiler invocation completed
    CompileCompleted {
        /// Object name passed to the compiler
        object_name: String,
        /// Outcome
        #[serde(flatten)]
        status: CompileStatus,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// A line of (filtered) compiler output
    CompilerOutput {
        /// Unit that produced the line
        object_name: String,
        /// Output line
        line: String,
    },
    /// Compilation stage completed
    BuildCompleted {
        /// Whether every unit compiled
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Number of units compiled
        succeeded: usize,
        /// Number of units that failed
        failed: usize,
        /// Number of scripts skipped as up to date
        skipped: usize,
    },
    /// Archive assembly started
    ArchiveStarted {
        /// Package or zip
        kind: ArchiveKind,
        /// Output file
        output: PathBuf,
    },
    /// A file was added to an archive
    ArchiveEntry {
        /// Package or zip
        kind: ArchiveKind,
        /// Source file
        source: PathBuf,
        /// Path inside the archive
        destination: String,
    },
    /// Archive assembly completed
    ArchiveCompleted {
        /// Package or zip
        kind: ArchiveKind,
        /// Output file
        output: PathBuf,
        /// Number of files written
        entries: usize,
    },
    /// Informational message
    Info {
        /// Originating stage
        stage: Stage,
        /// Message text
        message: String,
    },
    /// A warning was generated
    Warning {
        /// Originating stage
        stage: Stage,
        /// Warning message
        message: String,
    },
    /// An error occurred
    Error {
        /// Originating stage
        stage: Stage,
        /// Error message
        message: String,
    },
}

impl ProgressEvent {
    /// Shorthand for an [`ProgressEvent::Info`] event.
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        ProgressEvent::Info { stage, message: message.into() }
    }

    /// Shorthand for a [`ProgressEvent::Warning`] event.
    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        ProgressEvent::Warning { stage, message: message.into() }
    }

    /// Shorthand for an [`ProgressEvent::Error`] event.
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        ProgressEvent::Error { stage, message: message.into() }
    }
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Completed compile units
    current: AtomicUsize,
    /// Total compile units
    total: AtomicUsize,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a console reporter on stderr. Colors are on when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: std::io::stderr().is_terminal(),
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        let compile = Stage::Compile.tag();
        match event {
            ProgressEvent::BuildStarted { total_scripts } => {
                self.total.store(total_scripts, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                if total_scripts > 0 {
                    self.writeln(&format!(
                        "{} Compiling {} script{}...",
                        self.cyan(compile),
                        total_scripts,
                        if total_scripts == 1 { "" } else { "s" }
                    ));
                }
            }
            ProgressEvent::CompileStarted { object_name } => {
                if self.verbose {
                    let current = self.current.load(Ordering::SeqCst) + 1;
                    let total = self.total.load(Ordering::SeqCst);
                    self.writeln(&format!(
                        "{} [{}/{}] Compiling {}...",
                        self.cyan(compile),
                        current,
                        total,
                        object_name
                    ));
                }
            }
            ProgressEvent::CompileCompleted { object_name, status, duration_ms } => {
                let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst);

                let status_str = match &status {
                    CompileStatus::Success => self.green("ok"),
                    CompileStatus::Failed(_) => self.red("FAILED"),
                };

                self.writeln(&format!(
                    "{} [{}/{}] {} {} ({})",
                    self.cyan(compile),
                    current,
                    total,
                    status_str,
                    object_name,
                    format_duration(duration_ms)
                ));

                if let CompileStatus::Failed(err) = status {
                    self.writeln(&format!("        {}", self.red(&err)));
                }
            }
            ProgressEvent::CompilerOutput { object_name, line } => {
                if self.verbose {
                    self.writeln(&format!("{} {}: {}", self.cyan(compile), object_name, line));
                } else {
                    self.writeln(&format!("{} {}", self.cyan(compile), line));
                }
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, failed, skipped } => {
                let duration_str = format_duration(duration_ms);
                if success {
                    self.writeln(&format!(
                        "{} {} {} compiled, {} up to date in {}",
                        self.green("[done]"),
                        self.bold(&succeeded.to_string()),
                        if succeeded == 1 { "script" } else { "scripts" },
                        skipped,
                        duration_str
                    ));
                } else {
                    self.writeln(&format!(
                        "{} Compilation failed: {} succeeded, {} {} in {}",
                        self.red("[error]"),
                        succeeded,
                        failed,
                        if failed == 1 { "failure" } else { "failures" },
                        duration_str
                    ));
                }
            }
            ProgressEvent::ArchiveStarted { kind, output } => {
                self.writeln(&format!(
                    "{} Creating \"{}\"...",
                    self.cyan(kind.stage().tag()),
                    output.display()
                ));
            }
            ProgressEvent::ArchiveEntry { kind, source, destination } => {
                if self.verbose {
                    self.writeln(&format!(
                        "{} + \"{}\" <- \"{}\"",
                        self.cyan(kind.stage().tag()),
                        destination,
                        source.display()
                    ));
                }
            }
            ProgressEvent::ArchiveCompleted { kind, output, entries } => {
                self.writeln(&format!(
                    "{} Wrote {} ({} file{})",
                    self.green(kind.stage().tag()),
                    output.display(),
                    entries,
                    if entries == 1 { "" } else { "s" }
                ));
            }
            ProgressEvent::Info { stage, message } => {
                self.writeln(&format!("{} {}", self.cyan(stage.tag()), message));
            }
            ProgressEvent::Warning { stage, message } => {
                let prefix = match stage {
                    Stage::Pyro => String::new(),
                    other => format!("{} ", other.tag()),
                };
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { stage, message } => {
                let prefix = match stage {
                    Stage::Pyro => String::new(),
                    other => format!("{} ", other.tag()),
                };
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON progress reporter for machine-readable output.
pub struct JsonProgress {
    /// Output writer
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }

    fn write_json(&self, json: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", json);
        }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(json) = serde_json::to_string(&event) {
            self.write_json(&json);
        }
    }
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
    verbose: bool,
}

impl CollectingProgress {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Snapshot of every event reported so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages of every warning reported so far.
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Warning { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Messages of every error reported so far.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Progress tracker for aggregating compile statistics.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    start_time: Option<Instant>,
    total: usize,
    completed: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    in_progress: Vec<String>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a compile stage. `skipped` counts up-to-date scripts.
    pub fn start(&mut self, total_scripts: usize, skipped: usize) {
        self.start_time = Some(Instant::now());
        self.total = total_scripts;
        self.completed = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.skipped = skipped;
        self.in_progress.clear();
    }

    /// Mark a unit as started.
    pub fn unit_started(&mut self, object_name: &str) {
        self.in_progress.push(object_name.to_string());
    }

    /// Mark a unit as completed.
    pub fn unit_completed(&mut self, object_name: &str, status: &CompileStatus) {
        self.in_progress.retain(|id| id != object_name);
        self.completed += 1;
        match status {
            CompileStatus::Success => self.succeeded += 1,
            CompileStatus::Failed(_) => self.failed += 1,
        }
    }

    /// Get the elapsed time since the stage started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Get the elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Check if every unit has completed.
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Check if no unit failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Number of compiled units.
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Number of failed units.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Units currently running.
    pub fn in_progress(&self) -> &[String] {
        &self.in_progress
    }

    /// Generate a BuildCompleted event from current state.
    pub fn build_completed_event(&self) -> ProgressEvent {
        ProgressEvent::BuildCompleted {
            success: self.is_success(),
            duration_ms: self.elapsed_ms(),
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
