//! Entry point tying the router and dispatcher together

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use super::handler::{Dispatcher, Handler, PlainHandler, ReplyKind, ToolHandler};
use super::route::Route;
use super::router::{Router, RoutingDecision};
use crate::config::{HandlerConfig, RouterConfig, ToolsConfig};
use crate::error::Result;
use crate::llm::{CompletionClient, LlmError};
use crate::tools::ToolRegistry;

/// Final answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub route: Route,
    pub kind: ReplyKind,
    pub text: String,
}

impl Response {
    /// Whether a handler produced a model answer
    pub fn is_answer(&self) -> bool {
        self.kind == ReplyKind::Answer
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct RoutingAgent {
    router: Router,
    dispatcher: Dispatcher,
}

impl RoutingAgent {
    pub fn new(router: Router, dispatcher: Dispatcher) -> Self {
        Self { router, dispatcher }
    }

    /// Build the router and one handler per configured route
    pub fn from_config(
        client: Arc<dyn CompletionClient>,
        registry: Arc<ToolRegistry>,
        router_config: &RouterConfig,
        tools_config: &ToolsConfig,
    ) -> Result<Self> {
        let routes = router_config.route_set()?;

        let mut handlers: Vec<(String, Arc<dyn Handler>)> = Vec::with_capacity(router_config.routes.len());
        for route in &router_config.routes {
            let handler: Arc<dyn Handler> = match &route.handler {
                HandlerConfig::Plain {
                    system_prompt,
                    model,
                    temperature,
                } => {
                    let mut handler = PlainHandler::new(client.clone(), system_prompt.clone()).with_model(model.clone());
                    if let Some(temperature) = temperature {
                        handler = handler.with_temperature(*temperature);
                    }
                    Arc::new(handler)
                }
                HandlerConfig::Tools {
                    system_prompt,
                    model,
                    tools,
                } => Arc::new(
                    ToolHandler::new(client.clone(), registry.clone(), system_prompt.clone(), tools)?
                        .with_options(tools_config.invocation_options(model.clone())),
                ),
            };
            handlers.push((route.label.clone(), handler));
        }

        let dispatcher = Dispatcher::new(&routes, handlers)?;
        let router = Router::new(client, routes).with_options(router_config.options());
        info!("routing agent ready with routes {:?}", router.routes().labels());

        Ok(Self::new(router, dispatcher))
    }

    /// Classify only, without producing a reply
    pub async fn classify(&self, request: &str) -> std::result::Result<RoutingDecision, LlmError> {
        self.router.classify(request).await
    }

    /// Classify a request and answer it with the matching handler
    ///
    /// An unknown route yields the fixed unrouted reply without touching any
    /// handler or tool.
    pub async fn route_and_respond(&self, request: &str) -> std::result::Result<Response, LlmError> {
        debug!("request: {}", request);
        let decision = self.router.classify(request).await?;
        let reply = self.dispatcher.dispatch(&decision.route, request).await?;

        Ok(Response {
            route: decision.route,
            kind: reply.kind,
            text: reply.text,
        })
    }
}
