//! Pyro - command-line tool for building Papyrus script projects

use std::process::ExitCode;

use pyro::cli;

fn main() -> ExitCode {
    cli::run()
}
