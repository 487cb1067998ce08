//! Build pipeline module for pyro
//!
//! Turns a resolved project into compiled artifacts and archives.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Planning**: select stale scripts from artifact headers
//! - **Compilation**: one compiler process per script on a bounded worker pool
//! - **Packaging**: game archives and zip files from include rules
//!
//! # Example
//!
//! ```ignore
//! use pyro::build::{BuildPipeline, ConsoleProgress};
//! use pyro::project::{Collaborators, ProjectOptions};
//!
//! let reporter = ConsoleProgress::new();
//! let pipeline = BuildPipeline::new(ProjectOptions::default(), Collaborators::default(), &reporter);
//! let outcome = pipeline.run(Path::new("MyMod.ppj"))?;
//! println!("{}", outcome.summary());
//! ```

pub mod command;
pub mod events;
pub mod incremental;
pub mod parallel;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod result;

pub use command::*;
pub use events::*;
pub use incremental::*;
pub use parallel::*;
pub use pipeline::*;
pub use process::*;
pub use progress::*;
pub use result::*;
