//! Tool registry - name lookup and bounded execution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use super::Tool;
use crate::error::{AgentflowError, Result};
use crate::llm::{ToolDeclaration, ToolResult};

/// Read-only table of the tools available to handlers
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool; names must be unique
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        let name = tool.name();
        if self.tools.contains_key(name) {
            return Err(AgentflowError::Config(format!("tool '{}' registered twice", name)));
        }
        self.tools.insert(name.to_string(), Arc::new(tool));
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Declarations of every registered tool, sorted by name
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.declaration())
            .collect()
    }

    /// Declarations for specific tool names, in the given order
    ///
    /// Names must be registered and may appear only once.
    pub fn declarations_for(&self, names: &[String]) -> Result<Vec<ToolDeclaration>> {
        let mut seen = HashSet::with_capacity(names.len());
        names
            .iter()
            .map(|name| {
                if !seen.insert(name.as_str()) {
                    return Err(AgentflowError::Config(format!("tool '{}' listed twice", name)));
                }
                self.tools
                    .get(name)
                    .map(|t| t.declaration())
                    .ok_or_else(|| AgentflowError::Config(format!("unknown tool: {}", name)))
            })
            .collect()
    }

    /// Run a tool on validated arguments, bounded by `timeout`
    ///
    /// Executor errors and timeouts become error results the model can
    /// narrate. Returns `None` only when no tool by that name is registered.
    pub async fn execute(&self, call_id: &str, name: &str, arguments: Value, timeout: Duration) -> Option<ToolResult> {
        let tool = self.tools.get(name)?;
        debug!("executing tool {} ({})", name, call_id);

        let result = match tokio::time::timeout(timeout, tool.execute(arguments)).await {
            Ok(Ok(output)) => ToolResult::success(call_id, output),
            Ok(Err(e)) => {
                warn!("tool {} failed: {:#}", name, e);
                ToolResult::error(call_id, format!("Tool error: {:#}", e))
            }
            Err(_) => {
                warn!("tool {} timed out after {:?}", name, timeout);
                ToolResult::error(call_id, format!("Tool error: {} timed out after {:?}", name, timeout))
            }
        };

        Some(result)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.tool_names()).finish()
    }
}
