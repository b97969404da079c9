//! Completion client layer
//!
//! This module provides:
//! - Message types for chat-completion conversations
//! - CompletionClient trait for API abstraction
//! - OpenAiClient implementation
//! - ScriptedClient for tests

pub mod client;
pub mod openai;
pub mod types;

pub use client::{Completion, CompletionClient, LlmError, ScriptedClient};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{
    CompletionRequest, CompletionResult, Message, Role, ToolCallRequest, ToolDeclaration, ToolResult, Usage,
};
