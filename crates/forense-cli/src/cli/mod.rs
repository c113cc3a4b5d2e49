//! CLI argument parsing and command execution.

mod args;
mod commands;
mod output;

pub use args::Cli;
pub use commands::execute;
