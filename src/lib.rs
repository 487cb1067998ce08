//! Pyro - incremental build engine for Papyrus script projects
//!
//! This library provides functionality to:
//! - Resolve a `.ppj` project descriptor into a complete build configuration
//! - Decide which scripts are stale from compiled-artifact headers
//! - Run the compiler for stale scripts on a bounded worker pool
//! - Expand include rules and assemble game archives and zip files

pub mod build;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod game;
pub mod header;
pub mod package;
pub mod paths;
pub mod project;
pub mod variables;

pub use error::{PyroError, Result};
