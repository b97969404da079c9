//! Orchestrator-workers: plan, fan out, synthesize

use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, info, warn};

use super::{Persona, WorkflowError, complete, labelled_sections};
use crate::llm::CompletionClient;

const SYNTHESIS_PROMPT: &str =
    "You are a Synthesis Agent. Combine the workers' results into a coherent, comprehensive response.";

/// One unit of work from the orchestrator's plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    /// 1-based position in the plan
    pub number: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    pub worker: String,
    pub subtask: Subtask,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationOutcome {
    pub subtasks: Vec<Subtask>,
    /// In subtask order
    pub results: Vec<WorkerResult>,
    pub synthesis: String,
}

/// Workers used when none are configured
pub fn default_workers() -> Vec<Persona> {
    vec![
        Persona::new(
            "analysis",
            "You are Worker Agent 1. You specialize in detailed analysis and technical aspects of tasks.",
        ),
        Persona::new(
            "implementation",
            "You are Worker Agent 2. You specialize in practical implementation and real-world applications.",
        ),
    ]
}

pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    workers: Vec<Persona>,
    model: Option<String>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn CompletionClient>, workers: Vec<Persona>) -> Result<Self, WorkflowError> {
        if workers.is_empty() {
            return Err(WorkflowError::NoWorkers);
        }
        Ok(Self {
            client,
            workers,
            model: None,
        })
    }

    /// Model for the planning and synthesis calls
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    fn planner_prompt(&self) -> String {
        let count = self.workers.len();
        let mut prompt = format!(
            "You are an Orchestrator Agent. Your job is to:\n\
             1. Analyze the given task\n\
             2. Break it down into exactly {} subtasks\n\
             3. Return the subtasks in a clear, structured way\n\n\
             Each subtask should be independent and able to be worked on in parallel.\n\
             Format your response as:\n",
            count
        );
        for n in 1..=count {
            prompt.push_str(&format!("Subtask {}: [description]\n", n));
        }
        prompt
    }

    /// Ask the orchestrator for a plan and parse it
    pub async fn plan(&self, task: &str) -> Result<Vec<Subtask>, WorkflowError> {
        let raw = complete(
            self.client.as_ref(),
            &self.planner_prompt(),
            &format!("Break down this task: {}", task),
            self.model.clone(),
        )
        .await?;
        debug!("orchestrator plan:\n{}", raw);

        let subtasks = parse_subtasks(&raw);
        if subtasks.is_empty() {
            warn!("orchestrator plan contained no subtask lines");
            return Err(WorkflowError::NoSubtasks);
        }
        if subtasks.len() != self.workers.len() {
            warn!(
                "orchestrator returned {} subtasks for {} workers",
                subtasks.len(),
                self.workers.len()
            );
        }
        Ok(subtasks)
    }

    /// Plan, run every subtask concurrently, then synthesize
    pub async fn run(&self, task: &str) -> Result<OrchestrationOutcome, WorkflowError> {
        let subtasks = self.plan(task).await?;
        info!("dispatching {} subtasks to {} workers", subtasks.len(), self.workers.len());

        let outputs = try_join_all(subtasks.iter().enumerate().map(|(i, subtask)| {
            let worker = &self.workers[i % self.workers.len()];
            complete(
                self.client.as_ref(),
                &worker.system_prompt,
                &subtask.description,
                worker.model.clone(),
            )
        }))
        .await?;

        let results: Vec<WorkerResult> = subtasks
            .iter()
            .zip(outputs)
            .enumerate()
            .map(|(i, (subtask, output))| WorkerResult {
                worker: self.workers[i % self.workers.len()].name.clone(),
                subtask: subtask.clone(),
                output,
            })
            .collect();

        let labels: Vec<String> = results
            .iter()
            .map(|r| format!("Subtask {} ({}) Results", r.subtask.number, r.worker))
            .collect();
        let sections = labelled_sections(
            labels
                .iter()
                .zip(&results)
                .map(|(label, r)| (label.as_str(), r.output.as_str())),
        );
        let prompt = format!(
            "Original Task: {}\n\n{}\nPlease synthesize these results into a comprehensive final response.",
            task, sections
        );
        let synthesis = complete(self.client.as_ref(), SYNTHESIS_PROMPT, &prompt, self.model.clone()).await?;

        Ok(OrchestrationOutcome {
            subtasks,
            results,
            synthesis,
        })
    }
}

/// Extract `Subtask N: description` lines, tolerating list markers and emphasis
pub fn parse_subtasks(text: &str) -> Vec<Subtask> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(['-', '*', '#', '>', ' ']);
            if !line.get(..7)?.eq_ignore_ascii_case("subtask") {
                return None;
            }
            let (_, description) = line.split_once(':')?;
            let description = description.trim().trim_matches(|c: char| c == '*' || c.is_whitespace());
            (!description.is_empty()).then(|| description.to_string())
        })
        .enumerate()
        .map(|(i, description)| Subtask {
            number: i + 1,
            description,
        })
        .collect()
}
