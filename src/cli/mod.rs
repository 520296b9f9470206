//! CLI module for bb-runner - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
