//! Command line interface module
//!
//! Parses arguments into explicit configuration values and runs the
//! selected subcommand.

pub mod args;
pub mod runner;

pub use args::{Cli, Command, ExportArgs, SyncArgs};
pub use runner::Runner;
