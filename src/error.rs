//! Error types for agentflow
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflows::WorkflowError;

/// All error types that can occur in agentflow
#[derive(Debug, Error)]
pub enum AgentflowError {
    /// Invalid or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Completion client fault
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Workflow could not proceed
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for agentflow operations
pub type Result<T> = std::result::Result<T, AgentflowError>;
