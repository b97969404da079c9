//! Tool-invocation sub-protocol
//!
//! Two rounds at most:
//!
//! 1. Send `[system, user]` with the tool declarations attached. A plain text
//!    answer ends the protocol.
//! 2. Otherwise validate every requested call, execute them in the order the
//!    model returned them, then send `[system, user, assistant tool calls,
//!    tool results...]` without declarations and return that answer.
//!
//! Validation happens for all calls before any executes, so a rejected payload
//! never leaves a tool half-run. Executor failures are not protocol failures:
//! they travel to the model as error results and it explains them.

use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::llm::{
    CompletionClient, CompletionRequest, CompletionResult, LlmError, Message, ToolCallRequest, ToolDeclaration,
};
use crate::tools::{ToolRegistry, schema};

/// Why a sub-protocol run ended without an answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationFailure {
    /// Arguments failed to parse or validate; the tool never ran
    #[error("invalid arguments for tool '{tool}': {reason}")]
    ArgumentValidation {
        call_id: String,
        tool: String,
        reason: String,
    },

    /// The tool could not be run at all
    #[error("tool '{tool}' could not be executed: {reason}")]
    ToolExecution {
        call_id: String,
        tool: String,
        reason: String,
    },
}

impl InvocationFailure {
    pub fn tool(&self) -> &str {
        match self {
            InvocationFailure::ArgumentValidation { tool, .. } | InvocationFailure::ToolExecution { tool, .. } => tool,
        }
    }

    /// Apology suitable for showing to the person who asked
    pub fn user_message(&self) -> String {
        match self {
            InvocationFailure::ArgumentValidation { tool, .. } => format!(
                "Sorry, I couldn't complete that request: the {} tool was asked to run with arguments I couldn't accept.",
                tool
            ),
            InvocationFailure::ToolExecution { tool, .. } => format!(
                "Sorry, I couldn't complete that request: the {} tool is not available right now.",
                tool
            ),
        }
    }
}

/// Terminal state of a sub-protocol run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Done(String),
    Failed(InvocationFailure),
}

/// Per-run settings
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOptions {
    /// Upper bound on each tool execution
    pub tool_timeout: Duration,
    pub temperature: Option<f32>,
    pub model: Option<String>,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
            temperature: None,
            model: None,
        }
    }
}

/// Run one request through the tool-invocation exchange
///
/// Client faults from either round propagate as [`LlmError`]; argument and
/// availability problems end in [`InvocationOutcome::Failed`].
pub async fn invoke_with_tools(
    client: &dyn CompletionClient,
    registry: &ToolRegistry,
    system_prompt: &str,
    request: &str,
    declarations: &[ToolDeclaration],
    options: &InvocationOptions,
) -> Result<InvocationOutcome, LlmError> {
    let mut conversation = vec![Message::system(system_prompt), Message::user(request)];

    let first = client
        .send(
            build_request(conversation.clone(), options)
                .with_tools(declarations.to_vec()),
        )
        .await?;

    let calls = match first.result {
        CompletionResult::Text(text) => {
            debug!("no tool calls requested, answering directly");
            return Ok(InvocationOutcome::Done(text));
        }
        CompletionResult::ToolCalls(calls) if calls.is_empty() => {
            return Ok(InvocationOutcome::Done(String::new()));
        }
        CompletionResult::ToolCalls(calls) => calls,
    };

    info!("model requested {} tool call(s)", calls.len());

    let arguments = match validate_calls(&calls, declarations) {
        Ok(arguments) => arguments,
        Err(failure) => {
            warn!("{}", failure);
            return Ok(InvocationOutcome::Failed(failure));
        }
    };

    let mut results = Vec::with_capacity(calls.len());
    for (call, args) in calls.iter().zip(arguments) {
        match registry
            .execute(&call.id, &call.name, args, options.tool_timeout)
            .await
        {
            Some(result) => results.push(result),
            None => {
                let failure = InvocationFailure::ToolExecution {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    reason: "tool is declared but not registered".to_string(),
                };
                warn!("{}", failure);
                return Ok(InvocationOutcome::Failed(failure));
            }
        }
    }

    conversation.push(Message::assistant_tool_calls(calls));
    conversation.extend(results.iter().map(Message::tool_result));

    let follow_up = client.send(build_request(conversation, options)).await?;
    Ok(InvocationOutcome::Done(follow_up.result.into_text()))
}

fn build_request(conversation: Vec<Message>, options: &InvocationOptions) -> CompletionRequest {
    let mut request = CompletionRequest::new(conversation).with_model(options.model.clone());
    if let Some(temperature) = options.temperature {
        request = request.with_temperature(temperature);
    }
    request
}

/// Parse and check every call against its declaration, in call order
fn validate_calls(calls: &[ToolCallRequest], declarations: &[ToolDeclaration]) -> Result<Vec<Value>, InvocationFailure> {
    calls
        .iter()
        .map(|call| {
            let declaration = declarations.iter().find(|d| d.name == call.name).ok_or_else(|| {
                InvocationFailure::ArgumentValidation {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    reason: "tool was not declared for this request".to_string(),
                }
            })?;

            schema::parse_arguments(&call.arguments, &declaration.parameters).map_err(|e| {
                InvocationFailure::ArgumentValidation {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use eyre::eyre;

    use crate::llm::{Role, ScriptedClient};
    use crate::tools::Tool;

    /// Counts executions; fails when asked about "Atlantis"
    struct CountingWeather {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingWeather {
        fn name(&self) -> &'static str {
            "get_weather"
        }
        fn description(&self) -> &'static str {
            "Get the current weather for a specific city"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "location": { "type": "string" } },
                "required": ["location"],
                "additionalProperties": false
            })
        }
        async fn execute(&self, input: Value) -> Result<String, eyre::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let location = input["location"].as_str().unwrap_or_default();
            if location == "Atlantis" {
                return Err(eyre!("no weather station in {}", location));
            }
            Ok(format!("{}: sunny, 21C", location))
        }
    }

    fn setup() -> (ToolRegistry, Arc<AtomicUsize>, Vec<ToolDeclaration>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new()
            .with_tool(CountingWeather { calls: calls.clone() })
            .unwrap();
        let declarations = registry.declarations();
        (registry, calls, declarations)
    }

    fn tool_calls(calls: Vec<ToolCallRequest>) -> CompletionResult {
        CompletionResult::ToolCalls(calls)
    }

    async fn run(client: &ScriptedClient, registry: &ToolRegistry, decls: &[ToolDeclaration]) -> InvocationOutcome {
        invoke_with_tools(
            client,
            registry,
            "You are a helpful weather assistant.",
            "What's the weather in Paris?",
            decls,
            &InvocationOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_tool_calls_returns_text_unchanged() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::texts(["It is probably nice out."]);

        let outcome = run(&client, &registry, &decls).await;

        assert_eq!(outcome, InvocationOutcome::Done("It is probably nice out.".to_string()));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert_eq!(client.calls(), 1);
        assert_eq!(client.requests()[0].tools, decls);
    }

    #[tokio::test]
    async fn test_empty_text_is_done() {
        let (registry, _, decls) = setup();
        let client = ScriptedClient::texts([""]);

        assert_eq!(run(&client, &registry, &decls).await, InvocationOutcome::Done(String::new()));
    }

    #[tokio::test]
    async fn test_single_valid_call_follow_up_order() {
        let (registry, executions, decls) = setup();
        let call = ToolCallRequest::new("call_1", "get_weather", r#"{"location": "Paris"}"#);
        let client = ScriptedClient::new(vec![
            tool_calls(vec![call.clone()]),
            CompletionResult::Text("It's sunny in Paris at 21C.".to_string()),
        ]);

        let outcome = run(&client, &registry, &decls).await;

        assert_eq!(outcome, InvocationOutcome::Done("It's sunny in Paris at 21C.".to_string()));
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);

        let follow_up = &requests[1];
        assert!(follow_up.tools.is_empty());
        let roles: Vec<Role> = follow_up.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(follow_up.messages[2].tool_calls, vec![call]);
        assert_eq!(follow_up.messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(follow_up.messages[3].content_str(), "Paris: sunny, 21C");
    }

    #[tokio::test]
    async fn test_multiple_calls_processed_in_order() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::new(vec![
            tool_calls(vec![
                ToolCallRequest::new("a", "get_weather", r#"{"location": "Rome"}"#),
                ToolCallRequest::new("b", "get_weather", r#"{"location": "Oslo"}"#),
            ]),
            CompletionResult::Text("Rome is warm, Oslo is cold.".to_string()),
        ]);

        run(&client, &registry, &decls).await;

        assert_eq!(executions.load(Ordering::SeqCst), 2);
        let follow_up = &client.requests()[1];
        assert_eq!(follow_up.messages.len(), 5);
        assert_eq!(follow_up.messages[3].tool_call_id.as_deref(), Some("a"));
        assert_eq!(follow_up.messages[4].tool_call_id.as_deref(), Some("b"));
        assert_eq!(follow_up.messages[4].content_str(), "Oslo: sunny, 21C");
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_without_execution() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::new(vec![tool_calls(vec![ToolCallRequest::new(
            "call_1",
            "get_weather",
            r#"{"city": "Paris"}"#,
        )])]);

        let outcome = run(&client, &registry, &decls).await;

        match outcome {
            InvocationOutcome::Failed(InvocationFailure::ArgumentValidation { call_id, tool, reason }) => {
                assert_eq!(call_id, "call_1");
                assert_eq!(tool, "get_weather");
                assert!(reason.contains("location"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_one_bad_call_blocks_all_execution() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::new(vec![tool_calls(vec![
            ToolCallRequest::new("a", "get_weather", r#"{"location": "Rome"}"#),
            ToolCallRequest::new("b", "get_weather", "location=Oslo"),
        ])]);

        let outcome = run(&client, &registry, &decls).await;

        assert!(matches!(
            outcome,
            InvocationOutcome::Failed(InvocationFailure::ArgumentValidation { ref call_id, .. }) if call_id == "b"
        ));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undeclared_tool_fails_validation() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::new(vec![tool_calls(vec![ToolCallRequest::new("c", "delete_files", "{}")])]);

        let outcome = run(&client, &registry, &decls).await;

        assert!(matches!(
            outcome,
            InvocationOutcome::Failed(InvocationFailure::ArgumentValidation { ref tool, .. }) if tool == "delete_files"
        ));
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_declared_but_unregistered_tool() {
        let registry = ToolRegistry::new();
        let decls = vec![ToolDeclaration::new("get_time", "Current time", serde_json::json!({"type": "object"}))];
        let client = ScriptedClient::new(vec![tool_calls(vec![ToolCallRequest::new("c", "get_time", "{}")])]);

        let outcome = run(&client, &registry, &decls).await;

        assert!(matches!(
            outcome,
            InvocationOutcome::Failed(InvocationFailure::ToolExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_executor_failure_is_narrated() {
        let (registry, executions, decls) = setup();
        let client = ScriptedClient::new(vec![
            tool_calls(vec![ToolCallRequest::new("c", "get_weather", r#"{"location": "Atlantis"}"#)]),
            CompletionResult::Text("I couldn't find weather data for Atlantis.".to_string()),
        ]);

        let outcome = run(&client, &registry, &decls).await;

        assert_eq!(
            outcome,
            InvocationOutcome::Done("I couldn't find weather data for Atlantis.".to_string())
        );
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        let tool_message = &client.requests()[1].messages[3];
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.content_str().contains("no weather station in Atlantis"));
    }

    #[tokio::test]
    async fn test_follow_up_fault_propagates() {
        let (registry, _, decls) = setup();
        let client = ScriptedClient::new(vec![tool_calls(vec![ToolCallRequest::new(
            "c",
            "get_weather",
            r#"{"location": "Paris"}"#,
        )])]);
        client.push_error(LlmError::ApiError {
            status: 500,
            message: "down".to_string(),
        });

        let result = invoke_with_tools(
            &client,
            &registry,
            "sys",
            "weather?",
            &decls,
            &InvocationOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(LlmError::ApiError { status: 500, .. })));
    }

    #[test]
    fn test_failure_user_message() {
        let failure = InvocationFailure::ArgumentValidation {
            call_id: "c".to_string(),
            tool: "get_weather".to_string(),
            reason: "missing required field: location".to_string(),
        };
        assert!(failure.user_message().starts_with("Sorry"));
        assert!(!failure.user_message().contains("missing required field"));
        assert_eq!(failure.tool(), "get_weather");
    }
}
