//! Build and import event commands.

use std::path::Path;

use crate::build::process::{ToolInvocation, ToolRunner};
use crate::build::progress::{ProgressEvent, ProgressReporter, Stage};
use crate::error::{PyroError, Result};
use crate::project::BuildEvent;

/// Runs event commands through the shell.
pub struct EventRunner<'a> {
    runner: &'a dyn ToolRunner,
    reporter: &'a dyn ProgressReporter,
    working_dir: &'a Path,
    ignore_errors: bool,
}

impl<'a> EventRunner<'a> {
    /// Create a runner executing commands in `working_dir`.
    pub fn new(
        runner: &'a dyn ToolRunner,
        reporter: &'a dyn ProgressReporter,
        working_dir: &'a Path,
    ) -> Self {
        Self { runner, reporter, working_dir, ignore_errors: false }
    }

    /// Report failing commands as warnings instead of failing.
    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    /// Run every event in order.
    pub fn run_all<'e>(&self, events: impl IntoIterator<Item = &'e BuildEvent>) -> Result<()> {
        for event in events {
            self.run(event)?;
        }
        Ok(())
    }

    /// Run one event's commands in declaration order, stopping at the first
    /// failure.
    pub fn run(&self, event: &BuildEvent) -> Result<()> {
        if !event.description.is_empty() {
            self.reporter.report(ProgressEvent::info(Stage::Event, event.description.as_str()));
        }

        for command in &event.commands {
            let invocation = ToolInvocation::shell(command).with_working_dir(self.working_dir);
            if self.reporter.is_verbose() {
                self.reporter.report(ProgressEvent::info(Stage::Event, format!("> {}", command)));
            }

            let failure = match self.runner.run(&invocation) {
                Ok(output) => {
                    for line in output.lines() {
                        self.reporter.report(ProgressEvent::info(Stage::Event, line));
                    }
                    (!output.is_success()).then(|| {
                        format!(
                            "event command exited with status {}: {}",
                            output.status.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                            command
                        )
                    })
                }
                Err(e) => Some(format!("cannot run event command \"{}\": {}", command, e)),
            };

            if let Some(message) = failure {
                if self.ignore_errors {
                    self.reporter.report(ProgressEvent::warning(Stage::Event, message));
                } else {
                    return Err(PyroError::ExternalTool(message));
                }
            }
        }
        Ok(())
    }
}
