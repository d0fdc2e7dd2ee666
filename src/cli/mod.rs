//! Command-line interface module.

mod args;
pub mod build;
pub mod graph;

pub use args::{BuildArgs, Cli, Commands, DEFAULT_CONFIG, GraphArgs};
