//! Parallel compile execution.
//!
//! Compile commands are independent: no unit observes another's output. A
//! fixed number of scoped worker threads pull commands from a bounded
//! channel and send results back to a single collector, which is the only
//! place counts are aggregated. Completion order is unordered; results are
//! re-sorted into dispatch order before returning.
//!
//! # Example
//!
//! ```ignore
//! use pyro::build::{CompileCommand, WorkerPool};
//!
//! let pool = WorkerPool::new(4);
//! let summary = pool.execute(&commands, &runner, &reporter);
//! println!("{} compiled, {} failed", summary.success_count(), summary.failed_count());
//! ```

use crossbeam_channel::{bounded, unbounded};
use std::time::Instant;

use crate::build::command::CompileCommand;
use crate::build::process::{filter_compiler_output, ToolRunner};
use crate::build::progress::{CompileStatus, ProgressEvent, ProgressReporter};
use crate::build::result::{CompileSummary, UnitResult};

/// Bounded pool of compile workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    /// Upper bound on concurrent compiler processes
    limit: usize,
    /// Run sequentially on the calling thread
    sequential: bool,
}

impl WorkerPool {
    /// Create a pool running at most `limit` commands at once.
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1), sequential: false }
    }

    /// A pool that runs every command on the calling thread.
    pub fn sequential() -> Self {
        Self { limit: 1, sequential: true }
    }

    /// Number of worker threads used for `count` commands.
    pub fn workers_for(&self, count: usize) -> usize {
        if self.sequential {
            1
        } else {
            self.limit.min(count).max(1)
        }
    }

    /// Run every command and collect the results.
    ///
    /// A failing command never stops its siblings. Progress events are
    /// reported as units start and finish.
    pub fn execute(
        &self,
        commands: &[CompileCommand],
        runner: &dyn ToolRunner,
        reporter: &dyn ProgressReporter,
    ) -> CompileSummary {
        let start = Instant::now();

        let mut units: Vec<(usize, UnitResult)> = Vec::with_capacity(commands.len());

        if self.sequential || self.workers_for(commands.len()) == 1 {
            for (index, command) in commands.iter().enumerate() {
                reporter.report(ProgressEvent::CompileStarted {
                    object_name: command.object_name().to_string(),
                });
                let unit = run_unit(command, runner, reporter);
                report_completed(reporter, &unit);
                units.push((index, unit));
            }
        } else {
            let workers = self.workers_for(commands.len());
            let (task_tx, task_rx) = bounded::<(usize, &CompileCommand)>(workers);
            let (result_tx, result_rx) = unbounded::<(usize, UnitResult)>();

            std::thread::scope(|s| {
                for _ in 0..workers {
                    let task_rx = task_rx.clone();
                    let result_tx = result_tx.clone();
                    s.spawn(move || {
                        for (index, command) in task_rx.iter() {
                            reporter.report(ProgressEvent::CompileStarted {
                                object_name: command.object_name().to_string(),
                            });
                            let unit = run_unit(command, runner, reporter);
                            if result_tx.send((index, unit)).is_err() {
                                break;
                            }
                        }
                    });
                }
                drop(task_rx);
                drop(result_tx);

                s.spawn(move || {
                    for task in commands.iter().enumerate() {
                        if task_tx.send(task).is_err() {
                            break;
                        }
                    }
                });

                for (index, unit) in result_rx.iter() {
                    report_completed(reporter, &unit);
                    units.push((index, unit));
                }
            });
        }

        units.sort_by_key(|(index, _)| *index);
        CompileSummary {
            units: units.into_iter().map(|(_, unit)| unit).collect(),
            total_duration: start.elapsed(),
        }
    }
}

fn report_completed(reporter: &dyn ProgressReporter, unit: &UnitResult) {
    reporter.report(ProgressEvent::CompileCompleted {
        object_name: unit.object_name.clone(),
        status: unit.status.clone(),
        duration_ms: unit.duration.as_millis() as u64,
    });
}

/// Run one compiler invocation. Exit status and output both decide the
/// outcome: a source location in the output fails the unit even on a zero
/// exit code.
fn run_unit(command: &CompileCommand, runner: &dyn ToolRunner, reporter: &dyn ProgressReporter) -> UnitResult {
    let start = Instant::now();
    let object_name = command.object_name().to_string();

    let (status, output) = match runner.run(&command.invocation) {
        Ok(output) => {
            let filtered = filter_compiler_output(&output);
            for line in &filtered.lines {
                reporter.report(ProgressEvent::CompilerOutput {
                    object_name: object_name.clone(),
                    line: line.clone(),
                });
            }
            let status = if !output.is_success() {
                CompileStatus::Failed(format!(
                    "compiler exited with status {}",
                    output.status.map_or_else(|| "unknown".to_string(), |c| c.to_string())
                ))
            } else if filtered.has_errors {
                CompileStatus::Failed("compiler reported errors".to_string())
            } else {
                CompileStatus::Success
            };
            (status, filtered.lines)
        }
        Err(e) => (
            CompileStatus::Failed(format!(
                "cannot run compiler \"{}\": {}",
                command.invocation.program.display(),
                e
            )),
            Vec::new(),
        ),
    };

    UnitResult {
        object_name,
        source: command.script.source.clone(),
        artifact: command.script.artifact.clone(),
        status,
        output,
        duration: start.elapsed(),
    }
}
