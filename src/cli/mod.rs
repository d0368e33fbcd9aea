//! Command-line interface for petforge.
//!
//! Provides commands for dataset generation, corpus prefiltering,
//! evaluation, repair, cleansing and reporting.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
