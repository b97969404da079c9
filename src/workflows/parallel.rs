//! Parallelization: several perspectives on one prompt, then a synthesis

use std::sync::Arc;

use futures::future::try_join_all;
use log::info;

use super::{Persona, WorkflowError, complete, labelled_sections};
use crate::llm::CompletionClient;

const SYNTHESIS_PROMPT: &str = "You are a synthesis agent. Your role is to combine and harmonize different perspectives into a coherent, balanced response.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelOutcome {
    /// `(name, answer)` in configured order
    pub perspectives: Vec<(String, String)>,
    pub synthesis: String,
}

/// Perspectives used when none are configured
pub fn default_perspectives() -> Vec<Persona> {
    vec![
        Persona::new(
            "analytical",
            "You are an analytical agent. Focus on providing factual, detailed analysis of the topic. Be thorough and precise.",
        )
        .with_model("gpt-4o-mini"),
        Persona::new(
            "practical",
            "You are a practical agent. Focus on real-world applications, examples, and practical implications of the topic.",
        ),
    ]
}

pub struct ParallelWorkflow {
    client: Arc<dyn CompletionClient>,
    perspectives: Vec<Persona>,
    model: Option<String>,
}

impl ParallelWorkflow {
    pub fn new(client: Arc<dyn CompletionClient>, perspectives: Vec<Persona>) -> Result<Self, WorkflowError> {
        if perspectives.is_empty() {
            return Err(WorkflowError::NoPerspectives);
        }
        Ok(Self {
            client,
            perspectives,
            model: None,
        })
    }

    /// Model for the synthesis call
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub async fn run(&self, prompt: &str) -> Result<ParallelOutcome, WorkflowError> {
        info!("asking {} perspectives", self.perspectives.len());

        let answers = try_join_all(
            self.perspectives
                .iter()
                .map(|p| complete(self.client.as_ref(), &p.system_prompt, prompt, p.model.clone())),
        )
        .await?;

        let labels: Vec<String> = self
            .perspectives
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Perspective {} ({})", i + 1, p.name))
            .collect();
        let sections = labelled_sections(
            labels
                .iter()
                .zip(&answers)
                .map(|(label, answer)| (label.as_str(), answer.as_str())),
        );
        let synthesis_prompt = format!(
            "Original Question: {}\n\n{}\nPlease synthesize these perspectives into a comprehensive, well-balanced response.",
            prompt, sections
        );
        let synthesis = complete(
            self.client.as_ref(),
            SYNTHESIS_PROMPT,
            &synthesis_prompt,
            self.model.clone(),
        )
        .await?;

        Ok(ParallelOutcome {
            perspectives: self
                .perspectives
                .iter()
                .map(|p| p.name.clone())
                .zip(answers)
                .collect(),
            synthesis,
        })
    }
}
