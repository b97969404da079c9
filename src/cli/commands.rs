//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - route: classify a request and answer it with the matching agent
//! - evaluate: evaluate and optimize a code snippet
//! - orchestrate: split a task across worker agents
//! - parallel: answer a prompt from several perspectives

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Agentflow - routing, evaluator-optimizer, orchestrator and parallel LLM workflows
#[derive(Parser, Debug)]
#[command(name = "agentflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a request to the right agent and print its answer
    Route {
        /// The request to answer
        request: String,
    },

    /// Evaluate a code snippet and optimize it until it passes
    Evaluate {
        /// File holding the code, or "-" for stdin
        file: PathBuf,

        /// Override the configured iteration cap
        #[arg(short, long)]
        max_iterations: Option<u32>,
    },

    /// Break a task into subtasks and solve them with worker agents
    Orchestrate {
        /// Task description
        task: String,
    },

    /// Answer a prompt from several perspectives and synthesize them
    Parallel {
        /// The prompt to answer
        prompt: String,
    },
}
