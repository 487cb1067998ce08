//! External tool invocation.
//!
//! The compiler, the archiver and event commands all run through a
//! [`ToolRunner`], so tests can substitute a fake that never spawns a process.

use regex::Regex;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments, unquoted
    pub args: Vec<String>,
    /// Working directory, if not the current one
    pub working_dir: Option<PathBuf>,
}

impl ToolInvocation {
    /// Invocation of `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), working_dir: None }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run a command line through the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(command)
        } else {
            Self::new("sh").arg("-c").arg(command)
        }
    }
}

impl fmt::Display for ToolInvocation {
    /// Render as a command line, quoting arguments that contain spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(text: &str) -> String {
    if text.contains(' ') && !text.starts_with('"') {
        format!("\"{}\"", text)
    } else {
        text.to_string()
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given stdout text.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { status: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// Failed output with the given exit code and stdout text.
    pub fn failure(code: i32, stdout: impl Into<String>) -> Self {
        Self { status: Some(code), stdout: stdout.into(), stderr: String::new() }
    }

    /// Whether the process exited with status zero.
    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Trimmed, non-empty lines of stdout followed by stderr.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Runs external commands.
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput>;
}

/// [`ToolRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }
        let output = command.output()?;
        Ok(ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Compiler banner prefixes hidden from the log.
const COMPILER_BANNERS: [&str; 8] = [
    "Starting",
    "Assembly",
    "Compilation",
    "Batch",
    "Copyright",
    "Papyrus",
    "Failed",
    "No output",
];

/// Archiver banner prefixes hidden from the log.
const ARCHIVER_BANNERS: [&str; 3] = ["BSArch", "Copyright", "Packer"];

fn source_location() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(\d+,\d+\)").expect("literal pattern"))
}

/// Compiler output after banner suppression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredOutput {
    /// Lines worth showing
    pub lines: Vec<String>,
    /// A line carried a `(line,column)` source location
    pub has_errors: bool,
}

/// Drop compiler banners and `error(s)` summaries; detect source locations.
pub fn filter_compiler_output(output: &ToolOutput) -> FilteredOutput {
    let mut filtered = FilteredOutput::default();
    for line in output.lines() {
        if source_location().is_match(line) {
            filtered.has_errors = true;
        }
        if COMPILER_BANNERS.iter().any(|b| line.starts_with(b)) || line.contains("error(s)") {
            continue;
        }
        filtered.lines.push(line.to_string());
    }
    filtered
}

/// Drop archiver banners.
pub fn filter_archiver_output(output: &ToolOutput) -> Vec<String> {
    output
        .lines()
        .filter(|l| !ARCHIVER_BANNERS.iter().any(|b| l.starts_with(b)))
        .map(str::to_string)
        .collect()
}

/// Whether `program` names an existing file.
pub fn tool_exists(program: &Path) -> bool {
    program.is_file()
}
