//! Evaluator-optimizer loop
//!
//! The evaluator judges a code snippet and answers with a verdict
//! (`passed` + `feedback`); while it fails, the optimizer rewrites the code
//! against that feedback. The loop stops on the first pass or after
//! `max_iterations` evaluations.
//!
//! ## Verdict parsing
//!
//! Models are asked for JSON but answer loosely, so parsing tries in order:
//!
//! 1. A JSON object `{"passed": bool, "feedback": "..."}`, bare or fenced
//! 2. `passed:` / `feedback:` lines, ignoring case, quotes and `**` emphasis
//! 3. Nothing usable: not passed, the raw text becomes the feedback

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;

use super::complete;
use crate::llm::{CompletionClient, LlmError};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const NO_CODE_FEEDBACK: &str = "No code to evaluate";
pub const EXHAUSTED_FEEDBACK: &str = "Max iterations reached without passing evaluation";

/// How a verdict was read from the evaluator's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Json,
    KeyValue,
    /// No verdict found; counted as not passed
    Unparsed,
    /// Empty snippet, never sent to the model
    NoCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub feedback: String,
    pub verdict: Verdict,
}

impl Evaluation {
    /// Read a verdict out of free-form evaluator output
    pub fn parse(raw: &str) -> Self {
        if let Some(evaluation) = parse_json_verdict(raw) {
            return evaluation;
        }
        if let Some(evaluation) = parse_key_value_verdict(raw) {
            return evaluation;
        }
        Self {
            passed: false,
            feedback: raw.trim().to_string(),
            verdict: Verdict::Unparsed,
        }
    }

    fn no_code() -> Self {
        Self {
            passed: false,
            feedback: NO_CODE_FEEDBACK.to_string(),
            verdict: Verdict::NoCode,
        }
    }
}

/// One evaluation round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    /// 1-based
    pub iteration: u32,
    pub code: String,
    pub evaluation: Evaluation,
    /// Rewrite produced from this iteration's feedback, if one was requested
    pub optimized: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationOutcome {
    pub passed: bool,
    pub code: String,
    pub feedback: String,
    pub iterations: Vec<IterationRecord>,
}

pub struct EvaluatorOptimizer {
    client: Arc<dyn CompletionClient>,
    language: String,
    max_iterations: u32,
    model: Option<String>,
}

impl EvaluatorOptimizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            language: "Python".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    fn fence_tag(&self) -> String {
        self.language.to_lowercase()
    }

    fn evaluator_prompt(&self) -> String {
        format!(
            "You are a {} Code Evaluator. Evaluate the code for:\n\
             1. Code style\n\
             2. Best practices\n\
             3. Potential bugs\n\
             4. Performance issues\n\
             5. Security concerns\n\n\
             Return a JSON object with two fields:\n\
             - passed: true/false\n\
             - feedback: detailed explanation of issues or confirmation of quality\n\n\
             Be strict but fair in your evaluation.",
            self.language
        )
    }

    fn optimizer_prompt(&self) -> String {
        format!(
            "You are a {} Code Optimizer.\n\
             Improve the code based on the provided feedback while maintaining its core functionality.\n\
             Return ONLY the improved code without any explanations.",
            self.language
        )
    }

    /// Judge one snippet
    pub async fn evaluate(&self, code: &str) -> Result<Evaluation, LlmError> {
        if code.trim().is_empty() {
            return Ok(Evaluation::no_code());
        }

        let prompt = format!(
            "Evaluate this {} code:\n```{}\n{}\n```",
            self.language,
            self.fence_tag(),
            code
        );
        let raw = complete(self.client.as_ref(), &self.evaluator_prompt(), &prompt, self.model.clone()).await?;

        let evaluation = Evaluation::parse(&raw);
        if evaluation.verdict == Verdict::Unparsed {
            warn!("evaluator answer had no verdict, treating as not passed");
        }
        Ok(evaluation)
    }

    /// Rewrite `code` to address `feedback`, returning bare code
    pub async fn optimize(&self, code: &str, feedback: &str) -> Result<String, LlmError> {
        let prompt = format!(
            "Original code:\n```{}\n{}\n```\n\nFeedback to address:\n{}\n\nPlease provide the optimized code:",
            self.fence_tag(),
            code,
            feedback
        );
        let raw = complete(self.client.as_ref(), &self.optimizer_prompt(), &prompt, self.model.clone()).await?;
        Ok(strip_code_fence(&raw))
    }

    /// Evaluate and optimize until the code passes or the cap is hit
    pub async fn run(&self, initial_code: &str) -> Result<OptimizationOutcome, LlmError> {
        let mut code = initial_code.to_string();
        let mut iterations = Vec::new();

        for iteration in 1..=self.max_iterations {
            info!("evaluation iteration {}/{}", iteration, self.max_iterations);
            let evaluation = self.evaluate(&code).await?;
            debug!("evaluation feedback: {}", evaluation.feedback);

            let passed = evaluation.passed;
            let no_code = evaluation.verdict == Verdict::NoCode;
            let feedback = evaluation.feedback.clone();
            iterations.push(IterationRecord {
                iteration,
                code: code.clone(),
                evaluation,
                optimized: None,
            });

            if passed {
                info!("code passed evaluation on iteration {}", iteration);
                return Ok(OptimizationOutcome {
                    passed: true,
                    code,
                    feedback,
                    iterations,
                });
            }
            if no_code {
                return Ok(OptimizationOutcome {
                    passed: false,
                    code,
                    feedback,
                    iterations,
                });
            }

            code = self.optimize(&code, &feedback).await?;
            if let Some(record) = iterations.last_mut() {
                record.optimized = Some(code.clone());
            }
        }

        warn!("{}", EXHAUSTED_FEEDBACK);
        Ok(OptimizationOutcome {
            passed: false,
            code,
            feedback: EXHAUSTED_FEEDBACK.to_string(),
            iterations,
        })
    }
}

/// Body of the first fenced block, or the trimmed text if there is none
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after = &trimmed[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim_start_matches('\n').trim_end().to_string()
}

fn parse_json_verdict(raw: &str) -> Option<Evaluation> {
    let candidate = strip_code_fence(raw);
    let value: Value = serde_json::from_str(&candidate).ok().or_else(|| {
        let start = candidate.find('{')?;
        let end = candidate.rfind('}')?;
        (start < end)
            .then(|| serde_json::from_str(&candidate[start..=end]).ok())
            .flatten()
    })?;

    let object = value.as_object()?;
    let passed = match object.get("passed")? {
        Value::Bool(b) => *b,
        Value::String(s) => parse_flag(s)?,
        _ => return None,
    };
    let feedback = match object.get("feedback") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Some(Evaluation {
        passed,
        feedback,
        verdict: Verdict::Json,
    })
}

fn parse_key_value_verdict(raw: &str) -> Option<Evaluation> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut passed = None;
    let mut feedback = None;

    for (index, line) in lines.iter().enumerate() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match clean_key(key).as_str() {
            "passed" if passed.is_none() => passed = parse_flag(value),
            "feedback" if feedback.is_none() => {
                let mut text = value.to_string();
                for rest in &lines[index + 1..] {
                    text.push('\n');
                    text.push_str(rest);
                }
                feedback = Some(clean_feedback(&text));
            }
            _ => {}
        }
    }

    Some(Evaluation {
        passed: passed?,
        feedback: feedback.unwrap_or_else(|| raw.trim().to_string()),
        verdict: Verdict::KeyValue,
    })
}

fn clean_key(key: &str) -> String {
    key.trim()
        .trim_start_matches(['-', '*', '#', ' '])
        .chars()
        .filter(|c| !matches!(c, '*' | '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_ascii_lowercase()
}

fn parse_flag(value: &str) -> Option<bool> {
    let value = value
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | '`' | ',' | '.') || c.is_whitespace())
        .to_ascii_lowercase();
    match value.as_str() {
        "true" | "yes" | "pass" | "passed" => Some(true),
        "false" | "no" | "fail" | "failed" => Some(false),
        _ => None,
    }
}

fn clean_feedback(text: &str) -> String {
    text.trim()
        .trim_start_matches(|c: char| c == '*' || c.is_whitespace())
        .trim_matches(|c: char| matches!(c, '"' | '\'' | ',') || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedClient;

    const CODE: &str = "def calc(x,y):\n    z=x+y\n    return z";

    #[test]
    fn test_parse_json_verdict() {
        let eval = Evaluation::parse(r#"{"passed": true, "feedback": "Clean and correct."}"#);
        assert_eq!(
            eval,
            Evaluation {
                passed: true,
                feedback: "Clean and correct.".to_string(),
                verdict: Verdict::Json,
            }
        );
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = "Here is my evaluation:\n```json\n{\"passed\": false, \"feedback\": \"Missing spaces around operators.\"}\n```";
        let eval = Evaluation::parse(raw);
        assert!(!eval.passed);
        assert_eq!(eval.feedback, "Missing spaces around operators.");
        assert_eq!(eval.verdict, Verdict::Json);
    }

    #[test]
    fn test_parse_json_string_flag() {
        let eval = Evaluation::parse(r#"{"passed": "False", "feedback": "No docstring."}"#);
        assert!(!eval.passed);
        assert_eq!(eval.verdict, Verdict::Json);
    }

    #[test]
    fn test_parse_key_value_lines() {
        let raw = "passed: false\nfeedback: Use descriptive names.\nAdd type hints.";
        let eval = Evaluation::parse(raw);
        assert!(!eval.passed);
        assert_eq!(eval.feedback, "Use descriptive names.\nAdd type hints.");
        assert_eq!(eval.verdict, Verdict::KeyValue);
    }

    #[test]
    fn test_parse_markdown_emphasis() {
        let raw = "- **Passed:** True\n- **Feedback:** The function is concise and correct.";
        let eval = Evaluation::parse(raw);
        assert!(eval.passed);
        assert_eq!(eval.feedback, "The function is concise and correct.");
    }

    #[test]
    fn test_parse_loose_json_like_lines() {
        let raw = "{\n  passed: true,\n  feedback: \"Looks good\"\n}";
        let eval = Evaluation::parse(raw);
        assert!(eval.passed);
        assert_eq!(eval.verdict, Verdict::KeyValue);
        assert!(eval.feedback.starts_with("Looks good"));
    }

    #[test]
    fn test_parse_passed_without_feedback_uses_raw() {
        let eval = Evaluation::parse("Passed: yes");
        assert!(eval.passed);
        assert_eq!(eval.feedback, "Passed: yes");
    }

    #[test]
    fn test_parse_unparsed_is_not_passed() {
        let eval = Evaluation::parse("  The code is mostly fine but could be better.  ");
        assert!(!eval.passed);
        assert_eq!(eval.feedback, "The code is mostly fine but could be better.");
        assert_eq!(eval.verdict, Verdict::Unparsed);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```python\ndef f():\n    return 1\n```"), "def f():\n    return 1");
        assert_eq!(strip_code_fence("def f(): pass"), "def f(): pass");
        assert_eq!(strip_code_fence("Here you go:\n```\nx = 1\n```\nDone."), "x = 1");
        assert_eq!(strip_code_fence("```\nunterminated"), "unterminated");
    }

    #[tokio::test]
    async fn test_empty_code_rejected_without_calls() {
        let client = Arc::new(ScriptedClient::default());
        let workflow = EvaluatorOptimizer::new(client.clone());

        let outcome = workflow.run("   \n").await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, NO_CODE_FEEDBACK);
        assert_eq!(outcome.iterations.len(), 1);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_passes_after_one_optimization() {
        let client = Arc::new(ScriptedClient::texts([
            r#"{"passed": false, "feedback": "Add spaces around operators."}"#,
            "```python\ndef calc(x, y):\n    return x + y\n```",
            r#"{"passed": true, "feedback": "PEP 8 compliant."}"#,
        ]));
        let workflow = EvaluatorOptimizer::new(client.clone());

        let outcome = workflow.run(CODE).await.unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.code, "def calc(x, y):\n    return x + y");
        assert_eq!(outcome.feedback, "PEP 8 compliant.");
        assert_eq!(outcome.iterations.len(), 2);
        assert_eq!(outcome.iterations[0].code, CODE);
        assert_eq!(
            outcome.iterations[0].optimized.as_deref(),
            Some("def calc(x, y):\n    return x + y")
        );
        assert_eq!(outcome.iterations[1].optimized, None);
        assert_eq!(client.calls(), 3);

        let optimize_request = &client.requests()[1];
        let prompt = optimize_request.messages[1].content_str();
        assert!(prompt.contains("Add spaces around operators."));
        assert!(prompt.contains(CODE));
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let client = Arc::new(ScriptedClient::texts([
            "passed: false\nfeedback: still bad",
            "x = 1",
            "passed: false\nfeedback: still bad",
            "x = 2",
        ]));
        let workflow = EvaluatorOptimizer::new(client.clone()).with_max_iterations(2);

        let outcome = workflow.run(CODE).await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, EXHAUSTED_FEEDBACK);
        assert_eq!(outcome.code, "x = 2");
        assert_eq!(outcome.iterations.len(), 2);
        assert_eq!(outcome.iterations[0].optimized.as_deref(), Some("x = 1"));
        assert_eq!(outcome.iterations[1].optimized.as_deref(), Some("x = 2"));
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_evaluator_prompt_mentions_language() {
        let client = Arc::new(ScriptedClient::texts([r#"{"passed": true, "feedback": "ok"}"#]));
        let workflow = EvaluatorOptimizer::new(client.clone())
            .with_language("Rust")
            .with_model(Some("gpt-4".to_string()));

        workflow.evaluate("fn main() {}").await.unwrap();

        let sent = &client.requests()[0];
        assert!(sent.messages[0].content_str().starts_with("You are a Rust Code Evaluator."));
        assert!(sent.messages[1].content_str().contains("```rust\nfn main() {}\n```"));
        assert_eq!(sent.model.as_deref(), Some("gpt-4"));
    }

    #[tokio::test]
    async fn test_client_fault_propagates() {
        let client = Arc::new(ScriptedClient::default());
        client.push_error(LlmError::InvalidResponse("no choices".to_string()));
        let workflow = EvaluatorOptimizer::new(client);

        assert!(workflow.run(CODE).await.is_err());
    }
}
