//! Multi-call agent workflows
//!
//! - [`evaluator`]: evaluate code, optimize it against the feedback, repeat
//! - [`orchestrator`]: plan subtasks, fan them out to workers, synthesize
//! - [`parallel`]: answer one prompt from several perspectives, synthesize
//!
//! Every workflow talks to the model through an injected
//! [`CompletionClient`]; fan-out steps run concurrently and join in input
//! order.

pub mod evaluator;
pub mod orchestrator;
pub mod parallel;

pub use evaluator::{Evaluation, EvaluatorOptimizer, IterationRecord, OptimizationOutcome, Verdict};
pub use orchestrator::{OrchestrationOutcome, Orchestrator, Subtask};
pub use parallel::{ParallelOutcome, ParallelWorkflow};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{CompletionClient, CompletionRequest, LlmError};

/// Errors that stop a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("orchestrator plan contained no subtasks")]
    NoSubtasks,

    #[error("no workers configured")]
    NoWorkers,

    #[error("no perspectives configured")]
    NoPerspectives,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A named role played by one completion call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// One `[system, user]` completion, returned as text
pub(crate) async fn complete(
    client: &dyn CompletionClient,
    system_prompt: &str,
    prompt: &str,
    model: Option<String>,
) -> Result<String, LlmError> {
    let completion = client
        .send(CompletionRequest::prompt(system_prompt, prompt).with_model(model))
        .await?;
    debug!(
        "completion used {} input / {} output tokens",
        completion.usage.input_tokens, completion.usage.output_tokens
    );
    Ok(completion.result.into_text())
}

/// Labelled sections for a synthesis prompt, in the given order
pub(crate) fn labelled_sections<'a>(sections: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    sections
        .into_iter()
        .map(|(label, text)| format!("{}:\n{}\n", label, text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
