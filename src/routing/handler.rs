//! Route handlers and the dispatcher that maps routes onto them

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::invoke::{InvocationFailure, InvocationOptions, InvocationOutcome, invoke_with_tools};
use super::route::{Route, RouteSet};
use crate::error::{AgentflowError, Result};
use crate::llm::{CompletionClient, CompletionRequest, LlmError, ToolDeclaration};
use crate::tools::ToolRegistry;

/// Text returned when a request could not be routed
pub const UNROUTED_MESSAGE: &str = "Error: Unable to determine appropriate agent for your request.";

/// What kind of reply a handler produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    /// A model-generated answer
    Answer,
    /// The classifier picked no configured route
    Unrouted,
    /// The tool exchange could not complete
    ToolFailure(InvocationFailure),
}

/// Handler output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Answer,
            text: text.into(),
        }
    }

    pub fn unrouted() -> Self {
        Self {
            kind: ReplyKind::Unrouted,
            text: UNROUTED_MESSAGE.to_string(),
        }
    }

    pub fn tool_failure(failure: InvocationFailure) -> Self {
        Self {
            text: failure.user_message(),
            kind: ReplyKind::ToolFailure(failure),
        }
    }

    pub fn is_answer(&self) -> bool {
        self.kind == ReplyKind::Answer
    }
}

/// Produces a reply for a routed request
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &str) -> std::result::Result<Reply, LlmError>;
}

/// One completion under a role-specific system prompt
pub struct PlainHandler {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    model: Option<String>,
    temperature: Option<f32>,
}

impl PlainHandler {
    pub fn new(client: Arc<dyn CompletionClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl Handler for PlainHandler {
    async fn handle(&self, request: &str) -> std::result::Result<Reply, LlmError> {
        let mut completion_request =
            CompletionRequest::prompt(&self.system_prompt, request).with_model(self.model.clone());
        if let Some(temperature) = self.temperature {
            completion_request = completion_request.with_temperature(temperature);
        }

        let completion = self.client.send(completion_request).await?;
        debug!("plain handler used {} tokens", completion.usage.total());
        Ok(Reply::answer(completion.result.into_text()))
    }
}

/// Runs the request through the tool-invocation exchange
pub struct ToolHandler {
    client: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    declarations: Vec<ToolDeclaration>,
    options: InvocationOptions,
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandler")
            .field("system_prompt", &self.system_prompt)
            .field("declarations", &self.declarations)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ToolHandler {
    /// Fails if `tools` is empty or any name is unknown or repeated
    pub fn new(
        client: Arc<dyn CompletionClient>,
        registry: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        tools: &[String],
    ) -> Result<Self> {
        if tools.is_empty() {
            return Err(AgentflowError::Config("tool handler declares no tools".to_string()));
        }
        let declarations = registry.declarations_for(tools)?;

        Ok(Self {
            client,
            registry,
            system_prompt: system_prompt.into(),
            declarations,
            options: InvocationOptions::default(),
        })
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }
}

#[async_trait]
impl Handler for ToolHandler {
    async fn handle(&self, request: &str) -> std::result::Result<Reply, LlmError> {
        let outcome = invoke_with_tools(
            self.client.as_ref(),
            &self.registry,
            &self.system_prompt,
            request,
            &self.declarations,
            &self.options,
        )
        .await?;

        Ok(match outcome {
            InvocationOutcome::Done(text) => Reply::answer(text),
            InvocationOutcome::Failed(failure) => Reply::tool_failure(failure),
        })
    }
}

/// Fixed reply for requests the classifier could not place
#[derive(Debug, Clone, Copy, Default)]
pub struct UnroutedHandler;

#[async_trait]
impl Handler for UnroutedHandler {
    async fn handle(&self, _request: &str) -> std::result::Result<Reply, LlmError> {
        Ok(Reply::unrouted())
    }
}

/// Route label to handler table
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
    unrouted: UnroutedHandler,
}

impl Dispatcher {
    /// Every route in `routes` needs exactly one handler, and every handler
    /// must belong to a route
    pub fn new(routes: &RouteSet, handlers: Vec<(String, Arc<dyn Handler>)>) -> Result<Self> {
        let mut table: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        for (label, handler) in handlers {
            let label = label.trim().to_lowercase();
            if !routes.contains(&label) {
                return Err(AgentflowError::Config(format!("handler for unknown route '{}'", label)));
            }
            if table.insert(label.clone(), handler).is_some() {
                return Err(AgentflowError::Config(format!("route '{}' has more than one handler", label)));
            }
        }

        if let Some(missing) = routes.labels().into_iter().find(|label| !table.contains_key(*label)) {
            return Err(AgentflowError::Config(format!("route '{}' has no handler", missing)));
        }

        Ok(Self {
            handlers: table,
            unrouted: UnroutedHandler,
        })
    }

    pub async fn dispatch(&self, route: &Route, request: &str) -> std::result::Result<Reply, LlmError> {
        match route {
            Route::Matched(label) => match self.handlers.get(label) {
                Some(handler) => {
                    info!("dispatching to {} handler", label);
                    handler.handle(request).await
                }
                None => {
                    warn!("no handler for route {}", label);
                    self.unrouted.handle(request).await
                }
            },
            Route::Unknown => self.unrouted.handle(request).await,
        }
    }
}
