//! Command-line interface for question-forge.
//!
//! Provides the pipeline `run` command, a sample-file generator and a
//! read-only viewer over the stored questions and solutions.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
