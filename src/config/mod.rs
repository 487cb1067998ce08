//! Configuration module for pyro
//!
//! Provides types and parsing for `pyro.toml` tool configuration.

pub mod loader;
pub mod schema;

pub use loader::{load_config, merge_cli_overrides, CliOverrides, ConfigError};
pub use schema::*;
