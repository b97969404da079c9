//! Agentflow - agentic workflow patterns over a chat-completion API
//!
//! The core is an intent router: a constrained completion call picks one
//! label from a closed route set, and the handler registered for that label
//! answers, optionally through a two-round tool-calling exchange. Alongside
//! it sit evaluator-optimizer, orchestrator-workers and parallelization
//! workflows sharing the same completion client.

pub mod config;
pub mod error;
pub mod llm;
pub mod routing;
pub mod tools;
pub mod workflows;

pub use error::{AgentflowError, Result};
