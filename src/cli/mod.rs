//! CLI module for agentflow - command-line interface and subcommands.
//!
//! One subcommand per workflow: route, evaluate, orchestrate, parallel.

pub mod commands;

pub use commands::Cli;
