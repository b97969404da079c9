//! Intent classification over a constrained-vocabulary completion

use std::sync::Arc;

use log::{debug, info, warn};

use super::route::{Route, RouteSet};
use crate::llm::{CompletionClient, CompletionRequest, CompletionResult, LlmError};

/// Route picked for a request, with the classifier text it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub route: Route,
    pub raw: String,
}

/// Classification always runs at the most deterministic setting
pub const CLASSIFIER_TEMPERATURE: f32 = 0.0;

/// Generation settings for the classification call
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOptions {
    pub max_tokens: u32,
    pub model: Option<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            max_tokens: 50,
            model: None,
        }
    }
}

/// Classifies requests into one route of a [`RouteSet`]
pub struct Router {
    client: Arc<dyn CompletionClient>,
    routes: RouteSet,
    system_prompt: String,
    options: RouterOptions,
}

impl Router {
    pub fn new(client: Arc<dyn CompletionClient>, routes: RouteSet) -> Self {
        let system_prompt = routes.system_prompt();
        Self {
            client,
            routes,
            system_prompt,
            options: RouterOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    /// Ask the model for a label and parse it
    pub async fn classify(&self, request: &str) -> Result<RoutingDecision, LlmError> {
        let completion = self
            .client
            .send(
                CompletionRequest::prompt(&self.system_prompt, request)
                    .with_temperature(CLASSIFIER_TEMPERATURE)
                    .with_max_tokens(self.options.max_tokens)
                    .with_model(self.options.model.clone()),
            )
            .await?;

        let raw = match completion.result {
            CompletionResult::Text(text) => text,
            CompletionResult::ToolCalls(calls) => {
                warn!("classifier answered with {} tool call(s) instead of a label", calls.len());
                String::new()
            }
        };

        let route = self.routes.parse(&raw);
        if route.is_unknown() {
            warn!("classifier output {:?} matched no route", raw);
        } else {
            info!("routed to {}", route);
        }
        debug!("classifier raw output: {:?}", raw);

        Ok(RoutingDecision { route, raw })
    }
}
